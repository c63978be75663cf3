use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

use crate::providers::ProviderError;
use crate::store::StoreError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// Payment provider operation error
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Credential store lookup error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Error::BadRequest { message: message.into() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Provider(err) => match err {
                ProviderError::Rejected(_) | ProviderError::Request(_) | ProviderError::Unsupported(_) | ProviderError::Payload(_) => {
                    StatusCode::BAD_REQUEST
                }
                ProviderError::Transport(_) => StatusCode::BAD_GATEWAY,
                ProviderError::Contract(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Store(err) => match err {
                StoreError::Transport(_) => StatusCode::BAD_GATEWAY,
                StoreError::Invalid(_) => StatusCode::BAD_REQUEST,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource } => format!("{resource} not found"),
            Error::Provider(err) => match err {
                ProviderError::Rejected(message) => message.clone(),
                ProviderError::Request(message) => message.clone(),
                ProviderError::Unsupported(operation) => format!("{operation} is not supported by this provider"),
                ProviderError::Payload(_) => "Invalid payload".to_string(),
                ProviderError::Transport(_) => "Payment provider unreachable".to_string(),
                ProviderError::Contract(_) => "Internal server error".to_string(),
            },
            Error::Store(err) => match err {
                StoreError::Transport(_) => "Credential store unreachable".to_string(),
                StoreError::Invalid(message) => message.clone(),
            },
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Provider(ProviderError::Contract(_)) | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Provider(ProviderError::Transport(_)) | Error::Store(StoreError::Transport(_)) => {
                tracing::warn!("Upstream transport error: {}", self);
            }
            Error::BadRequest { .. } | Error::NotFound { .. } | Error::Provider(_) | Error::Store(_) => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let body = json!({ "status": false, "msg": self.user_message() });

        (status, Json(body)).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

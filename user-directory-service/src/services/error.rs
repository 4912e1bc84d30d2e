use axum::http::StatusCode;
use service_core::error::AppError;
use thiserror::Error;

use super::idp::IdpError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    IdentityProvider(#[from] IdpError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    Business { message: String, status: StatusCode },

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn business(message: impl Into<String>) -> Self {
        ServiceError::Business {
            message: message.into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::IdentityProvider(e) => match e {
                IdpError::Upstream { status, body } => AppError::Upstream { status, body },
                IdpError::NotFound(msg) => AppError::NotFound(anyhow::anyhow!(msg)),
                IdpError::Configuration(msg) => AppError::ConfigError(anyhow::anyhow!(msg)),
                IdpError::Transport(_) | IdpError::Decode(_) | IdpError::Token(_) => {
                    AppError::BadGateway(e.to_string())
                }
            },
            ServiceError::Database(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::NotFound(msg) => AppError::NotFound(anyhow::anyhow!(msg)),
            ServiceError::Business { message, status } => AppError::BusinessError(message, status),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}

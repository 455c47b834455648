use thiserror::Error;
use uuid::Uuid;

use crate::models::ContractStatus;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: ContractStatus,
        to: ContractStatus,
        reason: String,
    },

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("payment proof {0} has already been reviewed")]
    AlreadyReviewed(Uuid),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Authorization(message.into())
    }

    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    /// Stable machine-readable code used in response envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "VALIDATION_ERROR",
            ServiceError::NotFound { .. } => "NOT_FOUND",
            ServiceError::InvalidTransition { .. } => "INVALID_TRANSITION",
            ServiceError::Authorization(_) => "AUTHORIZATION_ERROR",
            ServiceError::AlreadyReviewed(_) => "ALREADY_REVIEWED",
            ServiceError::Storage(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

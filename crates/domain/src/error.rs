//! Domain error taxonomy.

use thiserror::Error;

/// Errors reported by a store implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or a connection could not be acquired.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A serializable transaction lost a race with a concurrent transaction.
    #[error("Serialization failure: {0}")]
    SerializationFailure(String),

    /// A uniqueness or referential constraint rejected the write.
    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Errors returned by the engines.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Concurrent succession contention; the operation is safe to retry once.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(StoreError),
}

impl DomainError {
    /// Whether the store itself failed, as opposed to a typed domain outcome.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DomainError::Store(_))
    }

    /// Stable machine-readable code for callers that translate errors to a wire format.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::NotFound(_) => "not_found",
            DomainError::Forbidden(_) => "forbidden",
            DomainError::InvalidState(_) => "invalid_state",
            DomainError::Conflict(_) => "conflict",
            DomainError::Validation(_) => "validation_error",
            DomainError::Store(_) => "store_error",
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SerializationFailure(msg) => DomainError::Conflict(msg),
            other => DomainError::Store(other),
        }
    }
}

impl From<validator::ValidationErrors> for DomainError {
    fn from(errors: validator::ValidationErrors) -> Self {
        DomainError::Validation(shared::validation::describe_errors(&errors))
    }
}

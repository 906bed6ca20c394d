use thiserror::Error;

use crate::sync::records::RecordStoreError;

/// Failure reported by an external collaborator (registry, repository, site directory).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("temporarily unavailable: {0}")]
    Unavailable(String),
    #[error("backend failure: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("malformed identifier: {0}")]
    MalformedIdentifier(String),
    #[error("invalid item: {0}")]
    InvalidItem(&'static str),
    #[error("item not found: {0}")]
    NotFound(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("temporarily unavailable: {0}")]
    TemporarilyUnavailable(String),
    #[error("materialization of {identifier} failed: {reason}")]
    MaterializationFailed { identifier: String, reason: String },
    #[error("materialization of {0} was cancelled")]
    Cancelled(String),
    #[error("backend failure: {0}")]
    Backend(String),
    #[error("sync record store error: {0}")]
    Store(String),
}

impl ProviderError {
    /// Whether the host should retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::TemporarilyUnavailable(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }

    pub(crate) fn materialization(identifier: &str, reason: impl ToString) -> Self {
        ProviderError::MaterializationFailed {
            identifier: identifier.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<BackendError> for ProviderError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotFound(what) => ProviderError::NotFound(what),
            BackendError::AccessDenied(what) => ProviderError::AccessDenied(what),
            BackendError::Unavailable(what) => ProviderError::TemporarilyUnavailable(what),
            BackendError::Failed(what) => ProviderError::Backend(what),
        }
    }
}

impl From<RecordStoreError> for ProviderError {
    fn from(err: RecordStoreError) -> Self {
        ProviderError::Store(err.to_string())
    }
}

use crate::scope::{BindingAction, ScopeKind};
use thiserror::Error;

pub type AgencySyncResult<T> = Result<T, AgencySyncError>;

#[derive(Debug, Error)]
pub enum AgencySyncError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IAM API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Rate limited: retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("the role({0}) does not exist")]
    RoleNotFound(String),

    #[error("the project({0}) does not exist")]
    ProjectNotFound(String),

    #[error("the enterprise project({0}) does not exist")]
    EnterpriseProjectNotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("error listing {what}: {source}")]
    Listing {
        what: String,
        #[source]
        source: Box<AgencySyncError>
    },

    #[error("error {action} role({role}) by {scope_kind}({scope}) for agency({agency}): {source}")]
    Binding {
        action: BindingAction,
        scope_kind: ScopeKind,
        scope: String,
        role: String,
        agency: String,
        #[source]
        source: Box<AgencySyncError>
    }
}

impl AgencySyncError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpError(_) | Self::RateLimited { .. } => true,
            Self::ApiError { status, .. } => *status >= 500,
            Self::Binding { source, .. } | Self::Listing { source, .. } => source.is_retryable(),
            _ => false
        }
    }

    /// True when the remote reported the addressed entity as absent.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Binding { source, .. } | Self::Listing { source, .. } => source.is_not_found(),
            _ => false
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimited {
                retry_after_seconds
            } => Some(*retry_after_seconds),
            Self::Binding { source, .. } | Self::Listing { source, .. } => source.retry_after(),
            _ => None
        }
    }

    pub(crate) fn listing(what: impl Into<String>) -> impl FnOnce(AgencySyncError) -> Self {
        let what = what.into();
        move |source| Self::Listing {
            what,
            source: Box::new(source)
        }
    }
}

/// Error type for `cartbrawl-core`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Rejected input. Nothing has been written when this is returned.
    #[error("validation: {0}")]
    Validation(String),
    /// The named entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),
    /// A state-machine or uniqueness invariant would be violated.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Failure reported by an external service. Retryable.
    #[error("{service}: {message}")]
    External {
        /// Service name.
        service: &'static str,
        /// Failure detail.
        message: String,
    },
    /// Transport-level HTTP failure. Retryable.
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    /// Credential encryption or decryption failure.
    #[error("crypto: {0}")]
    Crypto(&'static str),
    /// Invalid configuration.
    #[error("config: {0}")]
    Config(String),
    /// Storage engine failure.
    #[error(transparent)]
    Store(#[from] sled::Error),
    /// Record codec failure.
    #[error("codec: {0}")]
    Codec(#[from] serde_json::Error),
    /// Custom error.
    #[error("custom: {0}")]
    Custom(String),
}

impl Error {
    /// Create a custom error.
    pub fn custom(msg: impl ToString) -> Self {
        Self::Custom(msg.to_string())
    }

    /// Create a validation error.
    pub fn validation(msg: impl ToString) -> Self {
        Self::Validation(msg.to_string())
    }

    /// Create a conflict error.
    pub fn conflict(msg: impl ToString) -> Self {
        Self::Conflict(msg.to_string())
    }

    /// Create an external-service error.
    pub fn external(service: &'static str, message: impl ToString) -> Self {
        Self::External {
            service,
            message: message.to_string(),
        }
    }

    /// Whether retrying the operation later may succeed without any state repair.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::External { .. } | Self::Http(_))
    }

    /// Whether this is a validation rejection.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Whether this is a conflict rejection.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

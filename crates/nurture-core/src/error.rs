//! Error types for the outreach engine

use thiserror::Error;

/// Main error type for all outreach operations
#[derive(Error, Debug)]
pub enum OutreachError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Provider rejected request (status {status}): {message}")]
    Provider { status: u16, message: String },

    #[error("Encryption failure: {0}")]
    Encryption(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not supported: {0}")]
    NotSupported(String),
}

impl OutreachError {
    /// Transient failures that may be retried with backoff within a pass.
    /// Auth and Provider rejections are never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OutreachError::Http(_) | OutreachError::Transport(_))
    }
}

impl From<nurture_types::TransitionError> for OutreachError {
    fn from(err: nurture_types::TransitionError) -> Self {
        OutreachError::Validation(err.to_string())
    }
}

/// Result type for outreach operations
pub type Result<T> = std::result::Result<T, OutreachError>;

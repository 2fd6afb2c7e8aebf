//! Error types for the serdes codecs.

use thiserror::Error;

use crate::path::PathError;

/// Every failure aborts the whole serialize/deserialize call. Nothing here is
/// downgraded to a plaintext result; retrying is the step executor's decision.
#[derive(Debug, Error)]
pub enum SerdesError {
    #[error("{0} environment variable is not set")]
    MissingConfiguration(&'static str),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error(
        "Encryption context mismatch for key {key}: expected {}, got {}",
        context_value(.expected),
        context_value(.actual)
    )]
    ContextMismatch {
        key: String,
        expected: Option<String>,
        actual: Option<String>,
    },

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Path error: {0}")]
    Path(#[from] PathError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SerdesError {
    /// True for failures that mean the ciphertext does not belong to the
    /// calling execution. These must never be retried into success.
    pub fn is_context_mismatch(&self) -> bool {
        matches!(self, SerdesError::ContextMismatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, SerdesError>;

/// A context value as shown in error messages.
pub(crate) fn context_value(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("<missing>")
}

//! Key management service seam.
//!
//! The codecs never talk to a concrete KMS; they hold an
//! `Arc<dyn KeyManagementService>` built once at startup and shared by every
//! call. [`LocalKms`] keeps master keys in process memory; `AwsKms` (feature
//! `aws`) forwards to AWS KMS.

use async_trait::async_trait;
use thiserror::Error;

use pii_crypto::{CryptoError, EncryptionContext};

use crate::error::context_value;

pub mod local;
#[cfg(feature = "aws")]
pub mod aws;

pub use local::LocalKms;
#[cfg(feature = "aws")]
pub use aws::AwsKms;

#[derive(Debug, Error)]
pub enum KmsError {
    #[error("Key not found or not accessible: {0}")]
    KeyNotFound(String),

    #[error("Invalid ciphertext: {0}")]
    InvalidCiphertext(String),

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

    #[error("No ciphertext in response")]
    NoCiphertext,

    #[error("No plaintext in response")]
    NoPlaintext,

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("KMS request failed: {0}")]
    Service(String),
}

/// Symmetric encrypt/decrypt under a managed master key.
///
/// `decrypt` must fail unless `context` matches the context the ciphertext was
/// produced under, and when the key that produced it is not accessible.
#[async_trait]
pub trait KeyManagementService: Send + Sync {
    async fn encrypt(
        &self,
        key_id: &str,
        plaintext: &[u8],
        context: &EncryptionContext,
    ) -> Result<Vec<u8>, KmsError>;

    async fn decrypt(
        &self,
        ciphertext: &[u8],
        context: &EncryptionContext,
    ) -> Result<Vec<u8>, KmsError>;
}

//! Envelope encryption seam.
//!
//! An [`EnvelopeCipher`] encrypts under a fresh data key and carries the
//! encryption context inside the message header. Decrypting hands back that
//! header context; checking it against what the caller expects is left to
//! the caller.

use async_trait::async_trait;

use pii_crypto::EncryptionContext;

use crate::kms::KmsError;

pub mod keyring;

pub use keyring::KmsKeyring;

/// Plaintext recovered from an envelope message plus the context from its header.
#[derive(Debug)]
pub struct DecryptedMessage {
    pub plaintext: Vec<u8>,
    pub encryption_context: EncryptionContext,
}

#[async_trait]
pub trait EnvelopeCipher: Send + Sync {
    async fn encrypt(
        &self,
        plaintext: &[u8],
        context: &EncryptionContext,
    ) -> Result<Vec<u8>, KmsError>;

    async fn decrypt(&self, message: &[u8]) -> Result<DecryptedMessage, KmsError>;
}

//! The encrypt/decrypt step the serdes codecs are generic over.
//!
//! [`DirectKms`] sends the payload straight to KMS and relies on KMS to refuse
//! a foreign context. [`EnvelopeScheme`] encrypts under a data key and checks
//! the context recovered from the message header itself.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use pii_crypto::EncryptionContext;

use crate::config::SerdesConfig;
use crate::context::verify;
use crate::envelope::{EnvelopeCipher, KmsKeyring};
use crate::error::{Result, SerdesError};
use crate::kms::{KeyManagementService, KmsError};

#[async_trait]
pub trait ContextCipher: Send + Sync {
    /// Whether field-level envelopes also record the debug copy of the context.
    const RECORDS_DEBUG_CONTEXT: bool;

    /// Fail before any extraction or provider call if required configuration
    /// is absent.
    fn ensure_configured(&self) -> Result<()>;

    async fn seal(&self, plaintext: &[u8], context: &EncryptionContext) -> Result<Vec<u8>>;

    /// Decrypt, failing with [`SerdesError::ContextMismatch`] when the
    /// ciphertext was bound to a different context than `expected`.
    async fn open(&self, ciphertext: &[u8], expected: &EncryptionContext) -> Result<Vec<u8>>;
}

fn decrypt_error(err: KmsError) -> SerdesError {
    match err {
        KmsError::ContextMismatch {
            key,
            expected,
            actual,
        } => SerdesError::ContextMismatch {
            key,
            expected,
            actual,
        },
        other => SerdesError::DecryptionFailed(other.to_string()),
    }
}

// ============================================================================
// DirectKms
// ============================================================================

/// Payload encrypted by KMS under a single key id.
pub struct DirectKms {
    kms: Arc<dyn KeyManagementService>,
    key_id: Option<String>,
}

impl DirectKms {
    pub fn new(kms: Arc<dyn KeyManagementService>, key_id: Option<String>) -> Self {
        Self { kms, key_id }
    }

    pub fn from_config(kms: Arc<dyn KeyManagementService>, config: &SerdesConfig) -> Self {
        Self::new(kms, config.kms_key_id.clone())
    }

    fn key_id(&self) -> Result<&str> {
        self.key_id
            .as_deref()
            .ok_or(SerdesError::MissingConfiguration(SerdesConfig::KMS_KEY_ID_VAR))
    }
}

#[async_trait]
impl ContextCipher for DirectKms {
    const RECORDS_DEBUG_CONTEXT: bool = true;

    fn ensure_configured(&self) -> Result<()> {
        self.key_id().map(|_| ())
    }

    async fn seal(&self, plaintext: &[u8], context: &EncryptionContext) -> Result<Vec<u8>> {
        let key_id = self.key_id()?;
        self.kms
            .encrypt(key_id, plaintext, context)
            .await
            .map_err(|e| SerdesError::EncryptionFailed(e.to_string()))
    }

    async fn open(&self, ciphertext: &[u8], expected: &EncryptionContext) -> Result<Vec<u8>> {
        self.kms
            .decrypt(ciphertext, expected)
            .await
            .map_err(decrypt_error)
    }
}

// ============================================================================
// EnvelopeScheme
// ============================================================================

/// Envelope encryption through a [`KmsKeyring`] built on first use.
pub struct EnvelopeScheme {
    kms: Arc<dyn KeyManagementService>,
    key_arn: Option<String>,
    keyring: OnceCell<KmsKeyring>,
}

impl EnvelopeScheme {
    pub fn new(kms: Arc<dyn KeyManagementService>, key_arn: Option<String>) -> Self {
        Self {
            kms,
            key_arn,
            keyring: OnceCell::new(),
        }
    }

    pub fn from_config(kms: Arc<dyn KeyManagementService>, config: &SerdesConfig) -> Self {
        Self::new(kms, config.kms_key_arn.clone())
    }

    async fn keyring(&self) -> Result<&KmsKeyring> {
        self.keyring
            .get_or_try_init(|| async {
                match self.key_arn.as_deref() {
                    Some(key_arn) => {
                        debug!(key_arn = %key_arn, "Initializing envelope keyring");
                        Ok(KmsKeyring::new(self.kms.clone(), key_arn))
                    }
                    None => Err(SerdesError::MissingConfiguration(
                        SerdesConfig::KMS_KEY_ARN_VAR,
                    )),
                }
            })
            .await
    }
}

#[async_trait]
impl ContextCipher for EnvelopeScheme {
    const RECORDS_DEBUG_CONTEXT: bool = false;

    fn ensure_configured(&self) -> Result<()> {
        // Resolved lazily when the keyring is first needed.
        Ok(())
    }

    async fn seal(&self, plaintext: &[u8], context: &EncryptionContext) -> Result<Vec<u8>> {
        self.keyring()
            .await?
            .encrypt(plaintext, context)
            .await
            .map_err(|e| SerdesError::EncryptionFailed(e.to_string()))
    }

    async fn open(&self, ciphertext: &[u8], expected: &EncryptionContext) -> Result<Vec<u8>> {
        let decrypted = self
            .keyring()
            .await?
            .decrypt(ciphertext)
            .await
            .map_err(decrypt_error)?;

        if let Err(err) = verify(expected, &decrypted.encryption_context) {
            warn!(error = %err, "Envelope header context does not match caller");
            return Err(err);
        }
        Ok(decrypted.plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kms::LocalKms;

    fn ctx(entity: &str) -> EncryptionContext {
        [("entityId", entity)].into_iter().collect()
    }

    #[tokio::test]
    async fn direct_kms_requires_key_id() {
        let cipher = DirectKms::new(Arc::new(LocalKms::new()), None);
        assert!(matches!(
            cipher.ensure_configured(),
            Err(SerdesError::MissingConfiguration("KMS_KEY_ID"))
        ));
        assert!(matches!(
            cipher.seal(b"x", &ctx("e-1")).await,
            Err(SerdesError::MissingConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn direct_kms_maps_context_mismatch() {
        let kms = Arc::new(LocalKms::new());
        let key_id = kms.create_key().unwrap();
        let cipher = DirectKms::new(kms, Some(key_id));
        let ct = cipher.seal(b"x", &ctx("e-1")).await.unwrap();
        let err = cipher.open(&ct, &ctx("e-2")).await.unwrap_err();
        assert!(err.is_context_mismatch());
    }

    #[tokio::test]
    async fn envelope_defers_missing_arn_until_use() {
        let cipher = EnvelopeScheme::new(Arc::new(LocalKms::new()), None);
        assert!(cipher.ensure_configured().is_ok());
        assert!(matches!(
            cipher.seal(b"x", &ctx("e-1")).await,
            Err(SerdesError::MissingConfiguration("KMS_KEY_ARN"))
        ));
    }

    #[tokio::test]
    async fn envelope_verifies_header_context() {
        let kms = Arc::new(LocalKms::new());
        let key_id = kms.create_key().unwrap();
        let cipher = EnvelopeScheme::new(kms, Some(key_id));
        let ct = cipher.seal(b"x", &ctx("e-1")).await.unwrap();
        assert_eq!(cipher.open(&ct, &ctx("e-1")).await.unwrap(), b"x");
        match cipher.open(&ct, &ctx("e-2")).await.unwrap_err() {
            SerdesError::ContextMismatch {
                key,
                expected,
                actual,
            } => {
                assert_eq!(key, "entityId");
                assert_eq!(expected.as_deref(), Some("e-2"));
                assert_eq!(actual.as_deref(), Some("e-1"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn provider_failure_is_decryption_failure() {
        let kms = Arc::new(LocalKms::new());
        let key_id = kms.create_key().unwrap();
        let cipher = DirectKms::new(kms, Some(key_id));
        assert!(matches!(
            cipher.open(b"garbage-bytes", &ctx("e-1")).await,
            Err(SerdesError::DecryptionFailed(_))
        ));
    }
}

//! Envelope encryption with the data key wrapped by a KMS master key.
//!
//! Encrypt: generate DEK → KMS encrypt(DEK, context) → seal(DEK, header{ctx, edk}, plaintext)
//! Decrypt: parse header → KMS decrypt(edk, header ctx) → open(DEK)

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use zeroize::Zeroize;

use pii_crypto::{generate_key, parse_frame, seal_frame, EncryptionContext, FrameHeader};

use super::{DecryptedMessage, EnvelopeCipher};
use crate::kms::{KeyManagementService, KmsError};

/// Keyring whose generator key lives in a [`KeyManagementService`].
pub struct KmsKeyring {
    kms: Arc<dyn KeyManagementService>,
    generator_key_id: String,
}

impl KmsKeyring {
    pub fn new(kms: Arc<dyn KeyManagementService>, generator_key_id: impl Into<String>) -> Self {
        Self {
            kms,
            generator_key_id: generator_key_id.into(),
        }
    }

    pub fn generator_key_id(&self) -> &str {
        &self.generator_key_id
    }
}

#[async_trait]
impl EnvelopeCipher for KmsKeyring {
    async fn encrypt(
        &self,
        plaintext: &[u8],
        context: &EncryptionContext,
    ) -> Result<Vec<u8>, KmsError> {
        let dek = generate_key()?;
        let edk = self
            .kms
            .encrypt(&self.generator_key_id, &dek[..], context)
            .await?;

        let header = FrameHeader::new(self.generator_key_id.as_str(), context.clone())
            .with_encrypted_data_key(edk);
        let message = seal_frame(&header, &dek[..], plaintext)?;

        debug!(
            key_id = %self.generator_key_id,
            edk_len = header.edk.len(),
            message_len = message.len(),
            "Envelope encrypt"
        );
        Ok(message)
    }

    async fn decrypt(&self, message: &[u8]) -> Result<DecryptedMessage, KmsError> {
        let frame = parse_frame(message).map_err(|e| KmsError::InvalidCiphertext(e.to_string()))?;
        if frame.header.edk.is_empty() {
            return Err(KmsError::InvalidCiphertext(
                "message header carries no encrypted data key".to_string(),
            ));
        }

        let mut dek = self.kms.decrypt(&frame.header.edk, &frame.header.ctx).await?;
        let opened = frame.open(&dek);
        dek.zeroize();
        let plaintext = opened.map_err(|e| KmsError::InvalidCiphertext(e.to_string()))?;

        debug!(
            key_id = %frame.header.key,
            plaintext_len = plaintext.len(),
            "Envelope decrypt"
        );
        Ok(DecryptedMessage {
            plaintext,
            encryption_context: frame.header.ctx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kms::LocalKms;

    fn ctx(entity: &str) -> EncryptionContext {
        [("entityId", entity), ("service", "orders")]
            .into_iter()
            .collect()
    }

    fn keyring() -> (Arc<LocalKms>, KmsKeyring) {
        let kms = Arc::new(LocalKms::new());
        let key_id = kms.create_key().unwrap();
        let keyring = KmsKeyring::new(kms.clone(), key_id);
        (kms, keyring)
    }

    #[tokio::test]
    async fn round_trip_returns_header_context() {
        let (_kms, keyring) = keyring();
        let message = keyring.encrypt(b"bundle", &ctx("e-1")).await.unwrap();
        let decrypted = keyring.decrypt(&message).await.unwrap();
        assert_eq!(decrypted.plaintext, b"bundle");
        assert_eq!(decrypted.encryption_context, ctx("e-1"));
    }

    #[tokio::test]
    async fn data_key_differs_per_message() {
        let (_kms, keyring) = keyring();
        let a = keyring.encrypt(b"same", &ctx("e-1")).await.unwrap();
        let b = keyring.encrypt(b"same", &ctx("e-1")).await.unwrap();
        let ha = parse_frame(&a).unwrap().header.edk;
        let hb = parse_frame(&b).unwrap().header.edk;
        assert_ne!(ha, hb);
    }

    #[tokio::test]
    async fn removed_master_key_blocks_decrypt() {
        let (kms, keyring) = keyring();
        let message = keyring.encrypt(b"bundle", &ctx("e-1")).await.unwrap();
        kms.remove_key(keyring.generator_key_id());
        assert!(matches!(
            keyring.decrypt(&message).await,
            Err(KmsError::KeyNotFound(_))
        ));
    }

    #[tokio::test]
    async fn direct_frame_without_data_key_is_rejected() {
        let (kms, keyring) = keyring();
        let direct = kms
            .encrypt(keyring.generator_key_id(), b"x", &ctx("e-1"))
            .await
            .unwrap();
        assert!(matches!(
            keyring.decrypt(&direct).await,
            Err(KmsError::InvalidCiphertext(_))
        ));
    }
}

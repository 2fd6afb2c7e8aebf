//! In-process key management service.
//!
//! Master keys live in memory. Ciphertext is a sealed frame whose header names
//! the key and records the encryption context; the header is authenticated,
//! and decryption demands the caller's context match it exactly, the way AWS
//! KMS treats `EncryptionContext`.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroize;

use pii_crypto::{
    generate_key, key_from_slice, parse_frame, seal_frame, EncryptionContext, FrameHeader,
    KeyMaterial,
};

use super::{KeyManagementService, KmsError};
use crate::context::find_difference;

/// Prefix of key ids minted by [`LocalKms::create_key`].
pub const LOCAL_KEY_PREFIX: &str = "local/";

#[derive(Default)]
pub struct LocalKms {
    keys: RwLock<HashMap<String, KeyMaterial>>,
}

impl LocalKms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh random master key and return its id.
    pub fn create_key(&self) -> Result<String, KmsError> {
        let key_id = format!("{}{}", LOCAL_KEY_PREFIX, Uuid::new_v4());
        let material = generate_key()?;
        self.keys.write().insert(key_id.clone(), material);
        info!(key_id = %key_id, "Created local master key");
        Ok(key_id)
    }

    /// Register existing 32-byte key material under `key_id`.
    pub fn import_key(&self, key_id: impl Into<String>, material: &[u8]) -> Result<(), KmsError> {
        let key_id = key_id.into();
        let material = key_from_slice(material)?;
        self.keys.write().insert(key_id.clone(), material);
        info!(key_id = %key_id, "Imported local master key");
        Ok(())
    }

    /// Drop a key. Ciphertext produced under it can no longer be decrypted.
    pub fn remove_key(&self, key_id: &str) -> bool {
        let removed = self.keys.write().remove(key_id).is_some();
        if removed {
            info!(key_id = %key_id, "Removed local master key");
        }
        removed
    }

    pub fn contains_key(&self, key_id: &str) -> bool {
        self.keys.read().contains_key(key_id)
    }

    fn key(&self, key_id: &str) -> Result<KeyMaterial, KmsError> {
        self.keys
            .read()
            .get(key_id)
            .cloned()
            .ok_or_else(|| KmsError::KeyNotFound(key_id.to_string()))
    }
}

#[async_trait]
impl KeyManagementService for LocalKms {
    async fn encrypt(
        &self,
        key_id: &str,
        plaintext: &[u8],
        context: &EncryptionContext,
    ) -> Result<Vec<u8>, KmsError> {
        let key = self.key(key_id)?;
        let header = FrameHeader::new(key_id, context.clone());
        let ciphertext = seal_frame(&header, &key[..], plaintext)?;

        debug!(
            key_id = %key_id,
            plaintext_len = plaintext.len(),
            ciphertext_len = ciphertext.len(),
            "Local KMS encrypt"
        );
        Ok(ciphertext)
    }

    async fn decrypt(
        &self,
        ciphertext: &[u8],
        context: &EncryptionContext,
    ) -> Result<Vec<u8>, KmsError> {
        let frame =
            parse_frame(ciphertext).map_err(|e| KmsError::InvalidCiphertext(e.to_string()))?;
        let key = self.key(&frame.header.key)?;

        let mut plaintext = frame
            .open(&key[..])
            .map_err(|e| KmsError::InvalidCiphertext(e.to_string()))?;

        if let Some(mismatch) = find_difference(context, &frame.header.ctx) {
            plaintext.zeroize();
            warn!(
                key_id = %frame.header.key,
                context_key = %mismatch.key,
                "Local KMS decrypt rejected: encryption context mismatch"
            );
            return Err(KmsError::ContextMismatch {
                key: mismatch.key,
                expected: mismatch.expected,
                actual: mismatch.actual,
            });
        }

        debug!(key_id = %frame.header.key, plaintext_len = plaintext.len(), "Local KMS decrypt");
        Ok(plaintext)
    }
}

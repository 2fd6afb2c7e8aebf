//! Whole-object codec: the entire JSON payload becomes one base64 string.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use zeroize::Zeroizing;

use pii_crypto::EncryptionContext;

use super::{decode_ciphertext, encode_ciphertext, Serdes};
use crate::cipher::{ContextCipher, DirectKms};
use crate::config::SerdesConfig;
use crate::context::{ContextBinder, SerdesContext};
use crate::error::Result;
use crate::kms::KeyManagementService;

pub struct WholeObjectSerdes<T, C> {
    cipher: C,
    binder: ContextBinder,
    _payload: PhantomData<fn() -> T>,
}

impl<T, C: ContextCipher> WholeObjectSerdes<T, C> {
    pub fn new(cipher: C) -> Self {
        Self {
            cipher,
            binder: ContextBinder::default(),
            _payload: PhantomData,
        }
    }

    /// Tags merged over the caller identity in every encryption context.
    pub fn with_static_context(mut self, tags: EncryptionContext) -> Self {
        self.binder = ContextBinder::new(tags);
        self
    }

    pub fn binder(&self) -> &ContextBinder {
        &self.binder
    }
}

impl<T> WholeObjectSerdes<T, DirectKms> {
    /// Whole-object codec encrypting under `config.kms_key_id`.
    pub fn kms(kms: Arc<dyn KeyManagementService>, config: &SerdesConfig) -> Self {
        Self::new(DirectKms::from_config(kms, config))
    }
}

#[async_trait]
impl<T, C> Serdes<T> for WholeObjectSerdes<T, C>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
    C: ContextCipher,
{
    async fn serialize(
        &self,
        value: Option<&T>,
        context: &SerdesContext,
    ) -> Result<Option<String>> {
        let Some(value) = value else {
            return Ok(None);
        };
        self.cipher.ensure_configured()?;

        let plaintext = Zeroizing::new(serde_json::to_vec(value)?);
        let bound = self.binder.build(context);
        let ciphertext = self.cipher.seal(&plaintext, &bound).await?;

        debug!(
            entity_id = %context.entity_id,
            ciphertext_len = ciphertext.len(),
            "Encrypted step result"
        );
        Ok(Some(encode_ciphertext(&ciphertext)))
    }

    async fn deserialize(
        &self,
        data: Option<&str>,
        context: &SerdesContext,
    ) -> Result<Option<T>> {
        let Some(data) = data else {
            return Ok(None);
        };
        let ciphertext = decode_ciphertext(data, "serialized step result")?;

        let expected = self.binder.build(context);
        let plaintext = Zeroizing::new(self.cipher.open(&ciphertext, &expected).await?);

        debug!(entity_id = %context.entity_id, "Decrypted step result");
        Ok(Some(serde_json::from_slice(&plaintext)?))
    }
}

//! AWS KMS adapter.
//!
//! `Encrypt` and `Decrypt` are called with the encryption context attached;
//! KMS itself refuses a decrypt whose context differs from the one used at
//! encrypt time, reporting it as `InvalidCiphertextException`.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_kms::primitives::Blob;
use aws_sdk_kms::Client as KmsClient;
use tracing::{debug, info};

use pii_crypto::EncryptionContext;

use super::{KeyManagementService, KmsError};

pub struct AwsKms {
    client: KmsClient,
}

impl AwsKms {
    pub fn new(client: KmsClient) -> Self {
        Self { client }
    }

    /// Build a client from the default credential and region chain.
    pub async fn from_env() -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        info!(region = ?sdk_config.region(), "Initialized AWS KMS client");
        Self::new(KmsClient::new(&sdk_config))
    }
}

fn to_request_context(context: &EncryptionContext) -> HashMap<String, String> {
    context
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[async_trait]
impl KeyManagementService for AwsKms {
    async fn encrypt(
        &self,
        key_id: &str,
        plaintext: &[u8],
        context: &EncryptionContext,
    ) -> Result<Vec<u8>, KmsError> {
        info!(key_id = %key_id, plaintext_len = plaintext.len(), "Encrypting data");

        let response = self
            .client
            .encrypt()
            .key_id(key_id)
            .plaintext(Blob::new(plaintext))
            .set_encryption_context(Some(to_request_context(context)))
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(err) if err.is_not_found_exception() || err.is_disabled_exception() => {
                    KmsError::KeyNotFound(format!("{}: {}", key_id, err))
                }
                _ => KmsError::Service(format!("Encrypt failed: {}", e)),
            })?;

        let ciphertext = response.ciphertext_blob().ok_or(KmsError::NoCiphertext)?;

        debug!(ciphertext_len = ciphertext.as_ref().len(), "Encryption successful");
        Ok(ciphertext.as_ref().to_vec())
    }

    async fn decrypt(
        &self,
        ciphertext: &[u8],
        context: &EncryptionContext,
    ) -> Result<Vec<u8>, KmsError> {
        info!(ciphertext_len = ciphertext.len(), "Decrypting data");

        let response = self
            .client
            .decrypt()
            .ciphertext_blob(Blob::new(ciphertext))
            .set_encryption_context(Some(to_request_context(context)))
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(err) if err.is_invalid_ciphertext_exception() => {
                    KmsError::InvalidCiphertext(err.to_string())
                }
                Some(err) if err.is_not_found_exception() || err.is_disabled_exception() => {
                    KmsError::KeyNotFound(err.to_string())
                }
                _ => KmsError::Service(format!("Decrypt failed: {}", e)),
            })?;

        let plaintext = response.plaintext().ok_or(KmsError::NoPlaintext)?;

        debug!(plaintext_len = plaintext.as_ref().len(), "Decryption successful");
        Ok(plaintext.as_ref().to_vec())
    }
}

//! AES-256-GCM encryption for sealed payloads.
//!
//! Wire format v1:
//! [1 byte: version=1][12 bytes: IV][N bytes: ciphertext + tag]
//! The caller supplies the AAD; a blob only opens under the same AAD.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};

use crate::error::CryptoError;
use crate::types::{
    AES_GCM_IV_LENGTH, AES_GCM_TAG_LENGTH, AES_KEY_LENGTH, CURRENT_VERSION, SUPPORTED_VERSIONS,
};

/// Generate a random 12-byte IV for AES-GCM.
pub fn generate_iv() -> Result<[u8; AES_GCM_IV_LENGTH], CryptoError> {
    let mut iv = [0u8; AES_GCM_IV_LENGTH];
    getrandom::getrandom(&mut iv).map_err(|e| CryptoError::RngFailed(e.to_string()))?;
    Ok(iv)
}

fn cipher_for(key: &[u8]) -> Result<Aes256Gcm, CryptoError> {
    if key.len() != AES_KEY_LENGTH {
        return Err(CryptoError::InvalidKeyLength {
            expected: AES_KEY_LENGTH,
            got: key.len(),
        });
    }
    Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
}

/// Encrypt data with AES-256-GCM in the v1 wire format.
///
/// Returns: [version=1:1B][IV:12B][ciphertext+tag]
pub fn encrypt_blob(data: &[u8], key: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = cipher_for(key)?;
    let iv = generate_iv()?;
    let nonce = Nonce::from_slice(&iv);

    let ciphertext = cipher
        .encrypt(nonce, Payload { msg: data, aad })
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut result = Vec::with_capacity(1 + iv.len() + ciphertext.len());
    result.push(CURRENT_VERSION);
    result.extend_from_slice(&iv);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt a v1 blob. Fails on a wrong key, wrong AAD, or any tampering.
pub fn decrypt_blob(blob: &[u8], key: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = cipher_for(key)?;
    let min_length = 1 + AES_GCM_IV_LENGTH + AES_GCM_TAG_LENGTH;
    if blob.len() < min_length {
        return Err(CryptoError::DataTooShort);
    }

    let version = blob[0];
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(CryptoError::UnsupportedVersion(version));
    }

    let iv = &blob[1..1 + AES_GCM_IV_LENGTH];
    let ciphertext = &blob[1 + AES_GCM_IV_LENGTH..];
    let nonce = Nonce::from_slice(iv);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

//! Random 256-bit key material.
//!
//! Used both for master keys held by an in-process key service and for the
//! per-message data keys of envelope encryption.

use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::types::AES_KEY_LENGTH;

/// Key bytes wiped from memory on drop.
pub type KeyMaterial = Zeroizing<[u8; AES_KEY_LENGTH]>;

/// Generate a random 256-bit key.
pub fn generate_key() -> Result<KeyMaterial, CryptoError> {
    let mut key = Zeroizing::new([0u8; AES_KEY_LENGTH]);
    getrandom::getrandom(key.as_mut_slice()).map_err(|e| CryptoError::RngFailed(e.to_string()))?;
    Ok(key)
}

/// Check that `key` is exactly [`AES_KEY_LENGTH`] bytes and copy it out.
pub fn key_from_slice(key: &[u8]) -> Result<KeyMaterial, CryptoError> {
    if key.len() != AES_KEY_LENGTH {
        return Err(CryptoError::InvalidKeyLength {
            expected: AES_KEY_LENGTH,
            got: key.len(),
        });
    }
    let mut material = Zeroizing::new([0u8; AES_KEY_LENGTH]);
    material.copy_from_slice(key);
    Ok(material)
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Wire format version for sealed blobs.
///
/// Version 1: AES-256-GCM, context bound through AAD
/// Format: [version=1:1B][IV:12B][ciphertext+tag]
pub const CURRENT_VERSION: u8 = 1;

/// Supported wire format versions (for decryption).
pub const SUPPORTED_VERSIONS: &[u8] = &[1];

/// AES-GCM IV length in bytes (96 bits per NIST recommendation).
pub const AES_GCM_IV_LENGTH: usize = 12;

/// AES-GCM tag length in bytes (128 bits).
pub const AES_GCM_TAG_LENGTH: usize = 16;

/// AES key length in bytes (256 bits).
pub const AES_KEY_LENGTH: usize = 32;

/// Non-secret key/value metadata bound to a ciphertext.
///
/// Keys are kept sorted so the CBOR encoding of a context is deterministic
/// and can be authenticated as AAD.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptionContext(BTreeMap<String, String>);

impl EncryptionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pair, returning the value it replaced.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Overlay `other` on top of `self`; colliding keys take `other`'s value.
    pub fn merge(&mut self, other: &EncryptionContext) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EncryptionContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<BTreeMap<String, String>> for EncryptionContext {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl From<EncryptionContext> for BTreeMap<String, String> {
    fn from(context: EncryptionContext) -> Self {
        context.0
    }
}

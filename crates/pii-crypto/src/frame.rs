//! Sealed frame encode/decode.
//!
//! Frame: [header_len:4 BE][CBOR header][v1 AES-GCM blob]
//!
//! The header names the sealing key and carries the encryption context (and,
//! for envelope messages, the encrypted data key). Its exact CBOR bytes are the
//! blob's AAD, so the header cannot be altered without the frame failing to open.

use serde::{Deserialize, Serialize};

use crate::aes_gcm::{decrypt_blob, encrypt_blob};
use crate::error::CryptoError;
use crate::types::EncryptionContext;

/// Frame header format version.
pub const FRAME_VERSION: u8 = 1;

const LENGTH_PREFIX: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
    pub v: u8,
    /// Identifier of the master key involved in sealing.
    pub key: String,
    pub ctx: EncryptionContext,
    /// Encrypted data key; empty when the frame is sealed directly under `key`.
    #[serde(with = "serde_bytes", default, skip_serializing_if = "Vec::is_empty")]
    pub edk: Vec<u8>,
}

impl FrameHeader {
    pub fn new(key: impl Into<String>, ctx: EncryptionContext) -> Self {
        Self {
            v: FRAME_VERSION,
            key: key.into(),
            ctx,
            edk: Vec::new(),
        }
    }

    pub fn with_encrypted_data_key(mut self, edk: Vec<u8>) -> Self {
        self.edk = edk;
        self
    }
}

/// A parsed frame whose body has not been decrypted yet.
#[derive(Debug)]
pub struct Frame<'a> {
    pub header: FrameHeader,
    header_bytes: &'a [u8],
    body: &'a [u8],
}

impl Frame<'_> {
    /// Decrypt the body, authenticating the header bytes as AAD.
    pub fn open(&self, key: &[u8]) -> Result<Vec<u8>, CryptoError> {
        decrypt_blob(self.body, key, self.header_bytes)
    }
}

/// Encode `header` and seal `plaintext` under `key`.
pub fn seal_frame(
    header: &FrameHeader,
    key: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let mut header_bytes = Vec::new();
    ciborium::into_writer(header, &mut header_bytes)
        .map_err(|e| CryptoError::FrameEncode(format!("{}", e)))?;
    let header_len = u32::try_from(header_bytes.len())
        .map_err(|_| CryptoError::FrameEncode("header exceeds u32 length".to_string()))?;

    let body = encrypt_blob(plaintext, key, &header_bytes)?;

    let mut out = Vec::with_capacity(LENGTH_PREFIX + header_bytes.len() + body.len());
    out.extend_from_slice(&header_len.to_be_bytes());
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Split a frame into its decoded header and still-sealed body.
pub fn parse_frame(data: &[u8]) -> Result<Frame<'_>, CryptoError> {
    if data.len() < LENGTH_PREFIX {
        return Err(CryptoError::DataTooShort);
    }
    let (prefix, rest) = data.split_at(LENGTH_PREFIX);
    let header_len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    if rest.len() < header_len {
        return Err(CryptoError::DataTooShort);
    }
    let (header_bytes, body) = rest.split_at(header_len);

    let header: FrameHeader = ciborium::from_reader(header_bytes)
        .map_err(|e| CryptoError::FrameDecode(format!("{}", e)))?;
    if header.v != FRAME_VERSION {
        return Err(CryptoError::UnsupportedVersion(header.v));
    }

    Ok(Frame {
        header,
        header_bytes,
        body,
    })
}

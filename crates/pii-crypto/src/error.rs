use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Encrypted data too short")]
    DataTooShort,

    #[error("Unsupported encryption version: {0}")]
    UnsupportedVersion(u8),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Frame encode error: {0}")]
    FrameEncode(String),

    #[error("Frame decode error: {0}")]
    FrameDecode(String),

    #[error("Random number generation failed: {0}")]
    RngFailed(String),
}

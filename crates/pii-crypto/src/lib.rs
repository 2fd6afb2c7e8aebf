pub mod aes_gcm;
pub mod error;
pub mod frame;
pub mod keys;
pub mod types;

pub use aes_gcm::{decrypt_blob, encrypt_blob};
pub use error::CryptoError;
pub use frame::{parse_frame, seal_frame, Frame, FrameHeader, FRAME_VERSION};
pub use keys::{generate_key, key_from_slice, KeyMaterial};
pub use types::{EncryptionContext, AES_KEY_LENGTH, CURRENT_VERSION, SUPPORTED_VERSIONS};

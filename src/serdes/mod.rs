//! Step-result serdes: the serialize/deserialize pair a durable step executor
//! calls before checkpointing a result and before replaying it.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::context::SerdesContext;
use crate::error::{Result, SerdesError};

pub mod field_level;
pub mod whole_object;

pub use field_level::FieldLevelSerdes;
pub use whole_object::WholeObjectSerdes;

use crate::cipher::{DirectKms, EnvelopeScheme};

/// Top-level envelope field holding the base64 ciphertext of the bundle.
pub const ENCRYPTED_PII_FIELD: &str = "__encrypted_pii";

/// Top-level envelope field holding the informational context copy.
pub const ENCRYPTION_CONTEXT_FIELD: &str = "__encryption_context";

/// Field-level encryption directly under a KMS key.
pub type FieldLevelKmsSerdes<T> = FieldLevelSerdes<T, DirectKms>;

/// Field-level encryption under per-message data keys.
pub type EnvelopeEncryptionSerdes<T> = FieldLevelSerdes<T, EnvelopeScheme>;

/// Whole payload encrypted directly under a KMS key.
pub type KmsSerdes<T> = WholeObjectSerdes<T, DirectKms>;

/// `None` in, `None` out: an absent step result is never encrypted.
#[async_trait]
pub trait Serdes<T>: Send + Sync {
    async fn serialize(&self, value: Option<&T>, context: &SerdesContext)
        -> Result<Option<String>>;

    async fn deserialize(&self, data: Option<&str>, context: &SerdesContext)
        -> Result<Option<T>>;
}

pub(crate) fn encode_ciphertext(ciphertext: &[u8]) -> String {
    STANDARD.encode(ciphertext)
}

pub(crate) fn decode_ciphertext(encoded: &str, what: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(encoded)
        .map_err(|e| SerdesError::MalformedEnvelope(format!("{what} is not valid base64: {e}")))
}

//! Context-bound encryption for durable step results.
//!
//! Three codecs implement [`Serdes`]:
//! - [`FieldLevelKmsSerdes`]: listed paths encrypted directly under a KMS key.
//! - [`EnvelopeEncryptionSerdes`]: listed paths encrypted under a fresh data key.
//! - [`KmsSerdes`]: the whole payload encrypted under a KMS key.
//!
//! Every ciphertext is bound to the caller's entity id and execution ARN, so
//! replaying a result under a different identity fails.

pub mod cipher;
pub mod config;
pub mod context;
pub mod envelope;
pub mod error;
pub mod extract;
pub mod kms;
pub mod path;
pub mod serdes;

pub use cipher::{ContextCipher, DirectKms, EnvelopeScheme};
pub use config::SerdesConfig;
pub use context::{ContextBinder, SerdesContext, ENTITY_ID_KEY, EXECUTION_ARN_KEY};
pub use envelope::{DecryptedMessage, EnvelopeCipher, KmsKeyring};
pub use error::{Result, SerdesError};
pub use extract::{extract, restore, Extraction, SensitiveBundle, PLACEHOLDER_KEY};
pub use kms::{KeyManagementService, KmsError, LocalKms};
#[cfg(feature = "aws")]
pub use kms::AwsKms;
pub use path::{PathError, SensitivePath, PATH_DELIMITER};
pub use pii_crypto::EncryptionContext;
pub use serdes::{
    EnvelopeEncryptionSerdes, FieldLevelKmsSerdes, FieldLevelSerdes, KmsSerdes, Serdes,
    WholeObjectSerdes, ENCRYPTED_PII_FIELD, ENCRYPTION_CONTEXT_FIELD,
};

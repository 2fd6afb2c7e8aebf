//! Process configuration, read once at startup.

use crate::error::{Result, SerdesError};

/// Key identifiers the codecs need before they can encrypt.
///
/// Empty variables count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerdesConfig {
    /// Key id or ARN for the direct-KMS codecs.
    pub kms_key_id: Option<String>,
    /// Generator key ARN for the envelope codec.
    pub kms_key_arn: Option<String>,
}

impl SerdesConfig {
    pub const KMS_KEY_ID_VAR: &'static str = "KMS_KEY_ID";
    pub const KMS_KEY_ARN_VAR: &'static str = "KMS_KEY_ARN";

    pub fn new(kms_key_id: Option<String>, kms_key_arn: Option<String>) -> Self {
        Self {
            kms_key_id: kms_key_id.filter(|v| !v.is_empty()),
            kms_key_arn: kms_key_arn.filter(|v| !v.is_empty()),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::new(
            lookup(Self::KMS_KEY_ID_VAR),
            lookup(Self::KMS_KEY_ARN_VAR),
        )
    }

    pub fn kms_key_id(&self) -> Result<&str> {
        self.kms_key_id
            .as_deref()
            .ok_or(SerdesError::MissingConfiguration(Self::KMS_KEY_ID_VAR))
    }

    pub fn kms_key_arn(&self) -> Result<&str> {
        self.kms_key_arn
            .as_deref()
            .ok_or(SerdesError::MissingConfiguration(Self::KMS_KEY_ARN_VAR))
    }
}

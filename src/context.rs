//! Caller identity and the encryption context bound to every ciphertext.

use serde::{Deserialize, Serialize};

use pii_crypto::EncryptionContext;

use crate::error::{Result, SerdesError};

/// Context key carrying the step's entity id.
pub const ENTITY_ID_KEY: &str = "entityId";

/// Context key carrying the durable execution ARN.
pub const EXECUTION_ARN_KEY: &str = "durableExecutionArn";

/// Identity the step executor supplies with every serialize/deserialize call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerdesContext {
    pub entity_id: String,
    pub durable_execution_arn: String,
}

impl SerdesContext {
    pub fn new(entity_id: impl Into<String>, durable_execution_arn: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            durable_execution_arn: durable_execution_arn.into(),
        }
    }
}

/// Builds the encryption context from caller identity plus static tags.
///
/// Precedence: identity fields are laid down first and the static tags are
/// merged over them, so a static tag named `entityId` replaces the caller's.
#[derive(Debug, Clone, Default)]
pub struct ContextBinder {
    static_tags: EncryptionContext,
}

impl ContextBinder {
    pub fn new(static_tags: EncryptionContext) -> Self {
        Self { static_tags }
    }

    pub fn static_tags(&self) -> &EncryptionContext {
        &self.static_tags
    }

    /// Full context bound into the ciphertext.
    pub fn build(&self, caller: &SerdesContext) -> EncryptionContext {
        let mut context = EncryptionContext::new();
        context.insert(ENTITY_ID_KEY, caller.entity_id.as_str());
        context.insert(EXECUTION_ARN_KEY, caller.durable_execution_arn.as_str());
        context.merge(&self.static_tags);
        context
    }

    /// Informational copy stored next to direct-KMS field-level ciphertext:
    /// entity id plus static tags. Never used for verification.
    pub fn debug_subset(&self, caller: &SerdesContext) -> EncryptionContext {
        let mut context = EncryptionContext::new();
        context.insert(ENTITY_ID_KEY, caller.entity_id.as_str());
        context.merge(&self.static_tags);
        context
    }
}

/// A key whose value differs between two contexts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub key: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

impl From<Mismatch> for SerdesError {
    fn from(m: Mismatch) -> Self {
        SerdesError::ContextMismatch {
            key: m.key,
            expected: m.expected,
            actual: m.actual,
        }
    }
}

/// First key of `expected` that `actual` lacks or maps to another value.
/// Extra keys in `actual` are ignored.
pub fn find_mismatch(expected: &EncryptionContext, actual: &EncryptionContext) -> Option<Mismatch> {
    expected.iter().find_map(|(key, value)| match actual.get(key) {
        Some(found) if found == value => None,
        found => Some(Mismatch {
            key: key.to_string(),
            expected: Some(value.to_string()),
            actual: found.map(str::to_string),
        }),
    })
}

/// First difference in either direction; used where contexts must be equal.
pub fn find_difference(left: &EncryptionContext, right: &EncryptionContext) -> Option<Mismatch> {
    find_mismatch(left, right).or_else(|| {
        right
            .iter()
            .find(|(key, _)| !left.contains_key(key))
            .map(|(key, value)| Mismatch {
                key: key.to_string(),
                expected: None,
                actual: Some(value.to_string()),
            })
    })
}

/// Check that every pair of `expected` appears unchanged in `actual`.
pub fn verify(expected: &EncryptionContext, actual: &EncryptionContext) -> Result<()> {
    match find_mismatch(expected, actual) {
        Some(mismatch) => Err(mismatch.into()),
        None => Ok(()),
    }
}

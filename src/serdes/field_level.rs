//! Field-level codec: only the configured paths are encrypted.
//!
//! Wire format (JSON text): the payload with every found path replaced by
//! `{"__encrypted": "<path>"}`, plus `__encrypted_pii` (base64 ciphertext of
//! the extracted values) and, for direct KMS, `__encryption_context`. A
//! payload with none of the paths present is written as plain JSON.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use zeroize::Zeroizing;

use pii_crypto::EncryptionContext;

use super::{
    decode_ciphertext, encode_ciphertext, Serdes, ENCRYPTED_PII_FIELD, ENCRYPTION_CONTEXT_FIELD,
};
use crate::cipher::{ContextCipher, DirectKms, EnvelopeScheme};
use crate::config::SerdesConfig;
use crate::context::{ContextBinder, SerdesContext};
use crate::error::{Result, SerdesError};
use crate::extract::{extract, restore, type_name, Extraction, SensitiveBundle};
use crate::kms::KeyManagementService;
use crate::path::{parse_paths, SensitivePath};

pub struct FieldLevelSerdes<T, C> {
    cipher: C,
    paths: Vec<SensitivePath>,
    binder: ContextBinder,
    _payload: PhantomData<fn() -> T>,
}

impl<T, C: ContextCipher> FieldLevelSerdes<T, C> {
    pub fn new(cipher: C, paths: Vec<SensitivePath>) -> Self {
        Self {
            cipher,
            paths,
            binder: ContextBinder::default(),
            _payload: PhantomData,
        }
    }

    /// Tags merged over the caller identity in every encryption context.
    pub fn with_static_context(mut self, tags: EncryptionContext) -> Self {
        self.binder = ContextBinder::new(tags);
        self
    }

    pub fn paths(&self) -> &[SensitivePath] {
        &self.paths
    }

    pub fn binder(&self) -> &ContextBinder {
        &self.binder
    }

    async fn seal_value(&self, value: &Value, context: &SerdesContext) -> Result<String> {
        let Extraction {
            mut redacted,
            bundle,
        } = extract(value, &self.paths)?;

        if bundle.is_empty() {
            debug!(
                configured_paths = self.paths.len(),
                "No sensitive fields present; writing plaintext"
            );
            return Ok(serde_json::to_string(&redacted)?);
        }

        let bound = self.binder.build(context);
        let plaintext = Zeroizing::new(bundle.to_plaintext()?);
        let ciphertext = self.cipher.seal(&plaintext, &bound).await?;

        let envelope = redacted.as_object_mut().ok_or_else(|| {
            SerdesError::MalformedEnvelope(format!(
                "payload with sensitive fields must be an object, got {}",
                type_name(value)
            ))
        })?;
        envelope.insert(
            ENCRYPTED_PII_FIELD.to_string(),
            Value::String(encode_ciphertext(&ciphertext)),
        );
        if C::RECORDS_DEBUG_CONTEXT {
            envelope.insert(
                ENCRYPTION_CONTEXT_FIELD.to_string(),
                serde_json::to_value(self.binder.debug_subset(context))?,
            );
        }

        info!(
            entity_id = %context.entity_id,
            fields = bundle.len(),
            ciphertext_len = ciphertext.len(),
            "Encrypted sensitive fields"
        );
        Ok(serde_json::to_string(&redacted)?)
    }

    /// An envelope whose `__encrypted_pii` is absent, `null` or `""` never
    /// carried ciphertext and is returned unchanged without a provider call.
    async fn open_value(&self, data: &str, context: &SerdesContext) -> Result<Value> {
        let mut envelope: Value = serde_json::from_str(data)?;

        let encoded = match envelope.get(ENCRYPTED_PII_FIELD) {
            None | Some(Value::Null) => {
                debug!("Envelope carries no ciphertext; returning as-is");
                return Ok(envelope);
            }
            Some(Value::String(encoded)) if encoded.is_empty() => {
                debug!("Envelope carries no ciphertext; returning as-is");
                return Ok(envelope);
            }
            Some(Value::String(encoded)) => encoded.clone(),
            Some(other) => {
                return Err(SerdesError::MalformedEnvelope(format!(
                    "{ENCRYPTED_PII_FIELD} must be a string, got {}",
                    type_name(other)
                )))
            }
        };
        let ciphertext = decode_ciphertext(&encoded, ENCRYPTED_PII_FIELD)?;

        let expected = self.binder.build(context);
        let plaintext = Zeroizing::new(self.cipher.open(&ciphertext, &expected).await?);
        let bundle = SensitiveBundle::from_plaintext(&plaintext)?;

        if let Value::Object(map) = &mut envelope {
            map.remove(ENCRYPTED_PII_FIELD);
            map.remove(ENCRYPTION_CONTEXT_FIELD);
        }
        restore(&mut envelope, &bundle)?;

        info!(
            entity_id = %context.entity_id,
            fields = bundle.len(),
            "Decrypted sensitive fields"
        );
        Ok(envelope)
    }
}

impl<T> FieldLevelSerdes<T, DirectKms> {
    /// Field-level codec encrypting under `config.kms_key_id`.
    pub fn kms<I, S>(
        kms: Arc<dyn KeyManagementService>,
        config: &SerdesConfig,
        field_paths: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self::new(
            DirectKms::from_config(kms, config),
            parse_paths(field_paths)?,
        ))
    }
}

impl<T> FieldLevelSerdes<T, EnvelopeScheme> {
    /// Field-level codec using envelope encryption under `config.kms_key_arn`.
    pub fn envelope<I, S>(
        kms: Arc<dyn KeyManagementService>,
        config: &SerdesConfig,
        field_paths: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self::new(
            EnvelopeScheme::from_config(kms, config),
            parse_paths(field_paths)?,
        ))
    }
}

#[async_trait]
impl<T, C> Serdes<T> for FieldLevelSerdes<T, C>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
    C: ContextCipher,
{
    async fn serialize(
        &self,
        value: Option<&T>,
        context: &SerdesContext,
    ) -> Result<Option<String>> {
        let Some(value) = value else {
            return Ok(None);
        };
        self.cipher.ensure_configured()?;
        let value = serde_json::to_value(value)?;
        self.seal_value(&value, context).await.map(Some)
    }

    async fn deserialize(
        &self,
        data: Option<&str>,
        context: &SerdesContext,
    ) -> Result<Option<T>> {
        let Some(data) = data else {
            return Ok(None);
        };
        let value = self.open_value(data, context).await?;
        Ok(Some(serde_json::from_value(value)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ENTITY_ID_KEY, EXECUTION_ARN_KEY};
    use crate::kms::LocalKms;
    use crate::serdes::{EnvelopeEncryptionSerdes, FieldLevelKmsSerdes};
    use serde_json::json;

    fn caller() -> SerdesContext {
        SerdesContext::new("entity-1", "arn:exec/1")
    }

    fn setup() -> (Arc<LocalKms>, SerdesConfig) {
        let kms = Arc::new(LocalKms::new());
        let key_id = kms.create_key().unwrap();
        let config = SerdesConfig::new(Some(key_id.clone()), Some(key_id));
        (kms, config)
    }

    fn tags() -> EncryptionContext {
        [("service", "order-processing"), ("environment", "production")]
            .into_iter()
            .collect()
    }

    #[tokio::test]
    async fn kms_envelope_records_debug_context() {
        let (kms, config) = setup();
        let serdes: FieldLevelKmsSerdes<Value> =
            FieldLevelSerdes::kms(kms, &config, ["customer.ssn"])
                .unwrap()
                .with_static_context(tags());

        let doc = json!({"customer": {"ssn": "123-45-6789", "name": "A"}});
        let out = serdes.serialize(Some(&doc), &caller()).await.unwrap().unwrap();
        let envelope: Value = serde_json::from_str(&out).unwrap();

        let debug = &envelope[ENCRYPTION_CONTEXT_FIELD];
        assert_eq!(debug[ENTITY_ID_KEY], "entity-1");
        assert_eq!(debug["service"], "order-processing");
        assert!(debug.get(EXECUTION_ARN_KEY).is_none());
    }

    #[tokio::test]
    async fn envelope_variant_has_no_debug_context() {
        let (kms, config) = setup();
        let serdes: EnvelopeEncryptionSerdes<Value> =
            FieldLevelSerdes::envelope(kms, &config, ["customer.ssn"]).unwrap();

        let doc = json!({"customer": {"ssn": "123-45-6789"}});
        let out = serdes.serialize(Some(&doc), &caller()).await.unwrap().unwrap();
        let envelope: Value = serde_json::from_str(&out).unwrap();
        assert!(envelope.get(ENCRYPTION_CONTEXT_FIELD).is_none());
        assert!(envelope[ENCRYPTED_PII_FIELD].is_string());

        let back = serdes.deserialize(Some(&out), &caller()).await.unwrap();
        assert_eq!(back, Some(doc));
    }

    #[tokio::test]
    async fn tampered_debug_context_is_ignored() {
        let (kms, config) = setup();
        let serdes: FieldLevelKmsSerdes<Value> =
            FieldLevelSerdes::kms(kms, &config, ["customer.ssn"]).unwrap();

        let doc = json!({"customer": {"ssn": "123-45-6789"}});
        let out = serdes.serialize(Some(&doc), &caller()).await.unwrap().unwrap();
        let mut envelope: Value = serde_json::from_str(&out).unwrap();
        envelope[ENCRYPTION_CONTEXT_FIELD] = json!({"entityId": "someone-else"});
        let tampered = serde_json::to_string(&envelope).unwrap();

        let back = serdes.deserialize(Some(&tampered), &caller()).await.unwrap();
        assert_eq!(back, Some(doc));
    }

    #[tokio::test]
    async fn missing_key_id_fails_even_without_sensitive_fields() {
        let serdes: FieldLevelKmsSerdes<Value> = FieldLevelSerdes::kms(
            Arc::new(LocalKms::new()),
            &SerdesConfig::default(),
            ["customer.ssn"],
        )
        .unwrap();
        let err = serdes
            .serialize(Some(&json!({"plain": true})), &caller())
            .await
            .unwrap_err();
        assert!(matches!(err, SerdesError::MissingConfiguration("KMS_KEY_ID")));
    }

    #[tokio::test]
    async fn non_string_ciphertext_is_malformed() {
        let (kms, config) = setup();
        let serdes: FieldLevelKmsSerdes<Value> =
            FieldLevelSerdes::kms(kms, &config, ["a"]).unwrap();
        let err = serdes
            .deserialize(Some(r#"{"a":1,"__encrypted_pii":42}"#), &caller())
            .await
            .unwrap_err();
        assert!(matches!(err, SerdesError::MalformedEnvelope(_)));
    }

    #[tokio::test]
    async fn bad_base64_is_malformed() {
        let (kms, config) = setup();
        let serdes: FieldLevelKmsSerdes<Value> =
            FieldLevelSerdes::kms(kms, &config, ["a"]).unwrap();
        let err = serdes
            .deserialize(Some(r#"{"__encrypted_pii":"***"}"#), &caller())
            .await
            .unwrap_err();
        assert!(matches!(err, SerdesError::MalformedEnvelope(_)));
    }

    #[tokio::test]
    async fn null_ciphertext_field_skips_decryption() {
        let (kms, config) = setup();
        let serdes: FieldLevelKmsSerdes<Value> =
            FieldLevelSerdes::kms(kms, &config, ["a"]).unwrap();
        let back = serdes
            .deserialize(Some(r#"{"a":1,"__encrypted_pii":null}"#), &caller())
            .await
            .unwrap();
        assert_eq!(back, Some(json!({"a": 1, "__encrypted_pii": null})));
    }

    #[tokio::test]
    async fn repeated_path_round_trips() {
        let (kms, config) = setup();
        let serdes: FieldLevelKmsSerdes<Value> =
            FieldLevelSerdes::kms(kms, &config, ["customer.ssn", "customer.ssn"]).unwrap();
        assert_eq!(serdes.paths().len(), 1);

        let doc = json!({"customer": {"ssn": "123-45-6789", "name": "A"}});
        let out = serdes.serialize(Some(&doc), &caller()).await.unwrap();
        let back = serdes.deserialize(out.as_deref(), &caller()).await.unwrap();
        assert_eq!(back, Some(doc));
    }

    #[tokio::test]
    async fn empty_ciphertext_field_skips_decryption() {
        let (kms, config) = setup();
        let serdes: FieldLevelKmsSerdes<Value> =
            FieldLevelSerdes::kms(kms, &config, ["a"]).unwrap();
        let back = serdes
            .deserialize(Some(r#"{"a":1,"__encrypted_pii":""}"#), &caller())
            .await
            .unwrap();
        assert_eq!(back, Some(json!({"a": 1, "__encrypted_pii": ""})));
    }

    #[tokio::test]
    async fn invalid_path_rejected_at_construction() {
        let (kms, config) = setup();
        assert!(matches!(
            FieldLevelSerdes::<Value, DirectKms>::kms(kms, &config, ["customer..ssn"]),
            Err(SerdesError::Path(_))
        ));
    }

    #[tokio::test]
    async fn scalar_payload_passes_through() {
        let (kms, config) = setup();
        let serdes: FieldLevelKmsSerdes<String> =
            FieldLevelSerdes::kms(kms, &config, ["customer.ssn"]).unwrap();
        let out = serdes
            .serialize(Some(&"hello".to_string()), &caller())
            .await
            .unwrap();
        assert_eq!(out.as_deref(), Some("\"hello\""));
        let back = serdes.deserialize(out.as_deref(), &caller()).await.unwrap();
        assert_eq!(back.as_deref(), Some("hello"));
    }
}

//! Selective field extraction and restoration.
//!
//! `extract` pulls the configured paths out of a clone of the payload and
//! leaves a placeholder in each spot; `restore` writes the values back.

use serde_json::{Map, Value};

use crate::error::{Result, SerdesError};
use crate::path::{self, SensitivePath};

/// Key of the placeholder object that marks an extracted field.
pub const PLACEHOLDER_KEY: &str = "__encrypted";

/// Placeholder left where `path`'s value used to be.
pub fn placeholder(path: &SensitivePath) -> Value {
    let mut marker = Map::new();
    marker.insert(PLACEHOLDER_KEY.to_string(), Value::String(path.as_str().to_string()));
    Value::Object(marker)
}

/// Path (as written) → original value, in extraction order.
///
/// Encrypted as a single unit so a whole payload costs one provider call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensitiveBundle(Map<String, Value>);

impl SensitiveBundle {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.0.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    fn insert(&mut self, path: &SensitivePath, value: Value) {
        self.0.insert(path.as_str().to_string(), value);
    }

    /// JSON bytes handed to the cipher.
    pub fn to_plaintext(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    pub fn from_plaintext(plaintext: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(plaintext)?;
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(SerdesError::MalformedEnvelope(format!(
                "decrypted bundle must be an object, got {}",
                type_name(&other)
            ))),
        }
    }
}

/// Result of [`extract`].
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Clone of the input with every found path replaced by a placeholder.
    pub redacted: Value,
    /// The values that were replaced. Paths that were absent are not listed.
    pub bundle: SensitiveBundle,
}

/// Pull `paths` out of a copy of `value`. The input is never modified.
///
/// Paths are resolved against the redacted copy in order, so with overlapping
/// paths a later, deeper path sees the placeholder of an earlier, shallower
/// one and is skipped.
pub fn extract(value: &Value, paths: &[SensitivePath]) -> Result<Extraction> {
    let mut redacted = value.clone();
    let mut bundle = SensitiveBundle::default();

    for sensitive in paths {
        if bundle.get(sensitive.as_str()).is_some() {
            continue;
        }
        let Some(found) = path::get(&redacted, sensitive)?.cloned() else {
            continue;
        };
        bundle.insert(sensitive, found);
        path::set(&mut redacted, sensitive, placeholder(sensitive))?;
    }

    Ok(Extraction { redacted, bundle })
}

/// Write every bundled value back into `container`.
///
/// Entries are applied in reverse extraction order so a shallow path that was
/// captured with a deeper placeholder inside it is restored before that
/// deeper value. Whatever sits at a path is overwritten without checking for
/// a placeholder.
pub fn restore(container: &mut Value, bundle: &SensitiveBundle) -> Result<()> {
    for (raw, value) in bundle.0.iter().rev() {
        let sensitive = SensitivePath::parse(raw)?;
        path::set(container, &sensitive, value.clone())?;
    }
    Ok(())
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::parse_paths;
    use serde_json::json;

    fn order() -> Value {
        json!({
            "customer": {"ssn": "123-45-6789", "name": "A"},
            "payment": {"creditCard": "4111-1111-1111-1111", "amount": 10}
        })
    }

    #[test]
    fn extract_replaces_with_placeholders() {
        let paths = parse_paths(["customer.ssn", "payment.creditCard"]).unwrap();
        let Extraction { redacted, bundle } = extract(&order(), &paths).unwrap();

        assert_eq!(
            redacted,
            json!({
                "customer": {"ssn": {"__encrypted": "customer.ssn"}, "name": "A"},
                "payment": {"creditCard": {"__encrypted": "payment.creditCard"}, "amount": 10}
            })
        );
        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.get("customer.ssn"), Some(&json!("123-45-6789")));
        assert_eq!(
            bundle.get("payment.creditCard"),
            Some(&json!("4111-1111-1111-1111"))
        );
    }

    #[test]
    fn extract_leaves_input_untouched() {
        let input = order();
        let paths = parse_paths(["customer.ssn"]).unwrap();
        extract(&input, &paths).unwrap();
        assert_eq!(input, order());
    }

    #[test]
    fn absent_paths_are_skipped() {
        let paths = parse_paths(["customer.dob", "shipping.address"]).unwrap();
        let Extraction { redacted, bundle } = extract(&order(), &paths).unwrap();
        assert!(bundle.is_empty());
        assert_eq!(redacted, order());
    }

    #[test]
    fn round_trip_restores_original() {
        let paths = parse_paths(["customer.ssn", "payment.creditCard", "customer.dob"]).unwrap();
        let Extraction {
            mut redacted,
            bundle,
        } = extract(&order(), &paths).unwrap();
        restore(&mut redacted, &bundle).unwrap();
        assert_eq!(redacted, order());
        assert!(redacted["customer"].get("dob").is_none());
    }

    #[test]
    fn overlapping_paths_round_trip() {
        for raw in [["customer", "customer.ssn"], ["customer.ssn", "customer"]] {
            let paths = parse_paths(raw).unwrap();
            let Extraction {
                mut redacted,
                bundle,
            } = extract(&order(), &paths).unwrap();
            assert_eq!(redacted["customer"], json!({"__encrypted": "customer"}));
            restore(&mut redacted, &bundle).unwrap();
            assert_eq!(redacted, order());
        }
    }

    #[test]
    fn repeated_path_keeps_first_value() {
        let ssn = SensitivePath::parse("customer.ssn").unwrap();
        let paths = vec![ssn.clone(), ssn];
        let Extraction {
            mut redacted,
            bundle,
        } = extract(&order(), &paths).unwrap();
        assert_eq!(bundle.len(), 1);
        assert_eq!(bundle.get("customer.ssn"), Some(&json!("123-45-6789")));
        restore(&mut redacted, &bundle).unwrap();
        assert_eq!(redacted, order());
    }

    #[test]
    fn null_leaf_is_extracted() {
        let doc = json!({"customer": {"ssn": null}});
        let paths = parse_paths(["customer.ssn"]).unwrap();
        let Extraction {
            mut redacted,
            bundle,
        } = extract(&doc, &paths).unwrap();
        assert_eq!(bundle.get("customer.ssn"), Some(&Value::Null));
        restore(&mut redacted, &bundle).unwrap();
        assert_eq!(redacted, doc);
    }

    #[test]
    fn path_through_list_is_an_error() {
        let doc = json!({"items": [{"id": "1"}]});
        let paths = parse_paths(["items.id"]).unwrap();
        assert!(extract(&doc, &paths).is_err());
    }

    #[test]
    fn bundle_plaintext_round_trip() {
        let paths = parse_paths(["payment.creditCard", "customer.ssn"]).unwrap();
        let bundle = extract(&order(), &paths).unwrap().bundle;
        let plaintext = bundle.to_plaintext().unwrap();
        let back = SensitiveBundle::from_plaintext(&plaintext).unwrap();
        assert_eq!(back, bundle);
        assert_eq!(
            back.paths().collect::<Vec<_>>(),
            vec!["payment.creditCard", "customer.ssn"]
        );
    }

    #[test]
    fn non_object_bundle_is_malformed() {
        assert!(matches!(
            SensitiveBundle::from_plaintext(b"[1,2]"),
            Err(SerdesError::MalformedEnvelope(_))
        ));
    }
}

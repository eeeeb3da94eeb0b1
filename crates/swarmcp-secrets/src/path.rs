use serde_json::{Map, Value};

use crate::error::SecretStoreError;

/// Field preferred when a lookup names none.
const DEFAULT_FIELD: &str = "data";

/// `<logical-path>[#<field>]`, split once at the first `#`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecretPath<'a> {
    pub logical: &'a str,
    pub field: Option<&'a str>,
}

impl<'a> SecretPath<'a> {
    /// # Errors
    ///
    /// Returns an error when the logical part of `raw` is empty.
    pub fn parse(raw: &'a str) -> Result<Self, SecretStoreError> {
        let raw = raw.trim();
        let (logical, field) = match raw.split_once('#') {
            Some((logical, field)) => (logical, Some(field).filter(|field| !field.is_empty())),
            None => (raw, None),
        };
        let logical = logical.trim_matches('/');
        if logical.is_empty() {
            return Err(SecretStoreError::EmptyPath);
        }
        Ok(Self { logical, field })
    }

    /// KV v2 keeps documents under `<mount>/data/<rest>`.
    #[must_use]
    pub fn kv2_path(&self) -> String {
        match self.logical.split_once('/') {
            Some((mount, rest)) => format!("{mount}/data/{rest}"),
            None => format!("{}/data", self.logical),
        }
    }
}

/// Select one string field from a secret document.
///
/// An explicit field wins; otherwise a field named `data`, otherwise the only
/// field when there is exactly one.
///
/// # Errors
///
/// Returns an error when the field is missing, not a string, or cannot be
/// chosen unambiguously.
pub fn pick_field(
    path: &str,
    document: &Map<String, Value>,
    field: Option<&str>,
) -> Result<Vec<u8>, SecretStoreError> {
    if let Some(field) = field {
        let value = document
            .get(field)
            .ok_or_else(|| SecretStoreError::FieldNotFound {
                path: path.to_string(),
                field: field.to_string(),
            })?;
        return string_bytes(path, field, value);
    }

    if let Some(value) = document.get(DEFAULT_FIELD) {
        return string_bytes(path, DEFAULT_FIELD, value);
    }

    let mut fields = document.iter();
    match (fields.next(), fields.next()) {
        (Some((name, value)), None) => string_bytes(path, name, value),
        (None, _) => Err(SecretStoreError::NoData {
            path: path.to_string(),
        }),
        _ => Err(SecretStoreError::AmbiguousField {
            path: path.to_string(),
            fields: document.keys().cloned().collect::<Vec<_>>().join(", "),
        }),
    }
}

fn string_bytes(path: &str, field: &str, value: &Value) -> Result<Vec<u8>, SecretStoreError> {
    value
        .as_str()
        .map(|text| text.as_bytes().to_vec())
        .ok_or_else(|| SecretStoreError::NonStringField {
            path: path.to_string(),
            field: field.to_string(),
        })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use serde_json::json;

    use super::*;

    fn document(value: &Value) -> Map<String, Value> {
        value.as_object().expect("object").clone()
    }

    #[test]
    fn parse_splits_field_and_trims_slashes() {
        let path = SecretPath::parse(" /kv/app/db#password ").expect("parse");
        assert_eq!(path.logical, "kv/app/db");
        assert_eq!(path.field, Some("password"));

        let path = SecretPath::parse("kv/app#").expect("parse");
        assert_eq!(path.field, None);

        assert!(matches!(
            SecretPath::parse("  "),
            Err(SecretStoreError::EmptyPath)
        ));
        assert!(matches!(
            SecretPath::parse("#field"),
            Err(SecretStoreError::EmptyPath)
        ));
    }

    #[test]
    fn kv2_path_inserts_data_after_mount() {
        let path = SecretPath::parse("kv/app/db").expect("parse");
        assert_eq!(path.kv2_path(), "kv/data/app/db");
        let path = SecretPath::parse("kv").expect("parse");
        assert_eq!(path.kv2_path(), "kv/data");
    }

    #[test]
    fn pick_field_prefers_explicit_then_data_then_single() {
        let doc = document(&json!({"data": "d", "password": "p"}));
        assert_eq!(pick_field("kv/x", &doc, Some("password")).expect("explicit"), b"p");
        assert_eq!(pick_field("kv/x", &doc, None).expect("data field"), b"d");

        let single = document(&json!({"token": "t"}));
        assert_eq!(pick_field("kv/x", &single, None).expect("single"), b"t");
    }

    #[test]
    fn pick_field_rejects_ambiguous_missing_and_non_string() {
        let doc = document(&json!({"user": "u", "password": "p"}));
        let error = pick_field("kv/x", &doc, None).expect_err("ambiguous");
        assert!(error.to_string().contains("kv/x"));

        assert!(matches!(
            pick_field("kv/x", &doc, Some("missing")),
            Err(SecretStoreError::FieldNotFound { .. })
        ));

        let numeric = document(&json!({"port": 5432}));
        assert!(matches!(
            pick_field("kv/x", &numeric, None),
            Err(SecretStoreError::NonStringField { .. })
        ));
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Operation records and the strict decoder for untyped input.
//
// Callers normally build records through the typed constructors. The
// decoder exists for untyped boundaries (JSON payloads, the CLI) and maps a
// mapping-like value onto one fixed shape by field name. Missing or
// mistyped required fields are an error; they are never replaced with
// zero values.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StorageError;
use crate::key::format_key;

/// Field name to value map stored under one hash key.
pub type HashFields = BTreeMap<String, Value>;

/// Drop zero durations so that "no expiry" has a single representation.
pub fn normalize_ttl(ttl: Option<Duration>) -> Option<Duration> {
    ttl.filter(|ttl| !ttl.is_zero())
}

/// A single key/value write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SingleInsert {
    /// Sub-key inside the target collection.
    pub key: String,
    /// Value to store.
    pub value: Value,
    /// Optional time-to-live, whole seconds in untyped input.
    #[serde(default, with = "ttl_seconds", skip_serializing_if = "Option::is_none")]
    pub ttl: Option<Duration>,
}

impl SingleInsert {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = normalize_ttl(Some(ttl));
        self
    }
}

/// A write of one or more fields into the hash at `collection:key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HashInsert {
    pub collection: String,
    pub key: String,
    /// Hash contents. Untyped input may name this `value`.
    #[serde(alias = "value")]
    pub fields: HashFields,
    #[serde(default, with = "ttl_seconds", skip_serializing_if = "Option::is_none")]
    pub ttl: Option<Duration>,
}

impl HashInsert {
    pub fn new(collection: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            key: key.into(),
            fields: HashFields::new(),
            ttl: None,
        }
    }

    /// Add or replace one field of the hash.
    pub fn field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = normalize_ttl(Some(ttl));
        self
    }

    /// The key the hash is stored under.
    pub fn composite_key(&self) -> String {
        format_key(&self.collection, &self.key)
    }

    /// Decode one untyped hash-insert entry.
    pub fn from_value(input: &Value) -> Result<Self, StorageError> {
        match decode(input, OperationKind::HashInsert)? {
            OperationRecord::HashInsert(record) => Ok(record),
            other => Err(unexpected_shape(OperationKind::HashInsert, other.kind())),
        }
    }
}

/// A read of one field from the hash at `collection:key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HashLookup {
    pub collection: String,
    pub key: String,
    pub field: String,
}

impl HashLookup {
    pub fn new(
        collection: impl Into<String>,
        key: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            collection: collection.into(),
            key: key.into(),
            field: field.into(),
        }
    }

    /// The key the hash is stored under.
    pub fn composite_key(&self) -> String {
        format_key(&self.collection, &self.key)
    }

    /// Decode one untyped hash-lookup entry.
    pub fn from_value(input: &Value) -> Result<Self, StorageError> {
        match decode(input, OperationKind::HashLookup)? {
            OperationRecord::HashLookup(record) => Ok(record),
            other => Err(unexpected_shape(OperationKind::HashLookup, other.kind())),
        }
    }
}

/// The shapes an untyped input can be decoded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    SingleInsert,
    BatchInsert,
    HashInsert,
    HashLookup,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::SingleInsert => "single insert",
            OperationKind::BatchInsert => "batch insert",
            OperationKind::HashInsert => "hash insert",
            OperationKind::HashLookup => "hash lookup",
        };
        f.write_str(name)
    }
}

/// A decoded, fixed-shape storage request.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationRecord {
    SingleInsert(SingleInsert),
    BatchInsert(Vec<SingleInsert>),
    HashInsert(HashInsert),
    HashLookup(HashLookup),
}

impl OperationRecord {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationRecord::SingleInsert(_) => OperationKind::SingleInsert,
            OperationRecord::BatchInsert(_) => OperationKind::BatchInsert,
            OperationRecord::HashInsert(_) => OperationKind::HashInsert,
            OperationRecord::HashLookup(_) => OperationKind::HashLookup,
        }
    }
}

/// Envelope form of a batch insert: `{"records": [...]}`.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BatchEnvelope {
    records: Vec<SingleInsert>,
}

/// Decode `input` into the record shape named by `kind`.
///
/// ```rust
/// use polystore::record::{decode, OperationKind};
/// use serde_json::json;
///
/// let err = decode(&json!({"key": "k"}), OperationKind::HashInsert).unwrap_err();
/// assert!(err.to_string().contains("collection"));
/// ```
pub fn decode(input: &Value, kind: OperationKind) -> Result<OperationRecord, StorageError> {
    let fail = |err: serde_json::Error| StorageError::Decode(format!("{kind}: {err}"));

    let record = match kind {
        OperationKind::SingleInsert => {
            OperationRecord::SingleInsert(SingleInsert::deserialize(input).map_err(fail)?)
        }
        OperationKind::BatchInsert => {
            let records = match input {
                Value::Array(_) => Vec::<SingleInsert>::deserialize(input).map_err(fail)?,
                Value::Object(_) => BatchEnvelope::deserialize(input).map_err(fail)?.records,
                other => {
                    return Err(StorageError::Decode(format!(
                        "{kind}: expected an array or an object with `records`, got {}",
                        type_name(other)
                    )))
                }
            };
            OperationRecord::BatchInsert(records)
        }
        OperationKind::HashInsert => {
            let record = HashInsert::deserialize(input).map_err(fail)?;
            require_non_empty(kind, "collection", &record.collection)?;
            if record.fields.is_empty() {
                return Err(StorageError::Decode(format!("{kind}: `fields` is empty")));
            }
            OperationRecord::HashInsert(record)
        }
        OperationKind::HashLookup => {
            let record = HashLookup::deserialize(input).map_err(fail)?;
            require_non_empty(kind, "collection", &record.collection)?;
            require_non_empty(kind, "field", &record.field)?;
            OperationRecord::HashLookup(record)
        }
    };
    Ok(record)
}

fn require_non_empty(kind: OperationKind, name: &str, value: &str) -> Result<(), StorageError> {
    if value.is_empty() {
        return Err(StorageError::Decode(format!("{kind}: `{name}` is empty")));
    }
    Ok(())
}

fn unexpected_shape(expected: OperationKind, got: OperationKind) -> StorageError {
    StorageError::Decode(format!("expected {expected}, decoded {got}"))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Serde adapter: `Option<Duration>` as optional whole seconds.
mod ttl_seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ttl: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match ttl {
            Some(ttl) => s.serialize_some(&ttl.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<u64>::deserialize(d)?;
        Ok(secs.filter(|secs| *secs > 0).map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_single_insert() {
        let record = decode(
            &json!({"key": "k1", "value": {"a": 1}, "ttl": 30}),
            OperationKind::SingleInsert,
        )
        .unwrap();
        assert_eq!(
            record,
            OperationRecord::SingleInsert(
                SingleInsert::new("k1", json!({"a": 1})).with_ttl(Duration::from_secs(30))
            )
        );
    }

    #[test]
    fn test_single_insert_ttl_is_optional() {
        let record = decode(&json!({"key": "k", "value": "v"}), OperationKind::SingleInsert)
            .unwrap();
        match record {
            OperationRecord::SingleInsert(insert) => assert_eq!(insert.ttl, None),
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn test_zero_ttl_means_no_expiry() {
        let record = decode(
            &json!({"key": "k", "value": "v", "ttl": 0}),
            OperationKind::SingleInsert,
        )
        .unwrap();
        assert_eq!(
            record,
            OperationRecord::SingleInsert(SingleInsert::new("k", json!("v")))
        );
    }

    #[test]
    fn test_single_insert_requires_value() {
        let err = decode(&json!({"key": "k"}), OperationKind::SingleInsert).unwrap_err();
        assert!(matches!(err, StorageError::Decode(ref msg) if msg.contains("value")));
    }

    #[test]
    fn test_hash_insert_requires_collection() {
        let err = decode(&json!({"key": "k"}), OperationKind::HashInsert).unwrap_err();
        match err {
            StorageError::Decode(msg) => assert!(msg.contains("collection"), "{msg}"),
            other => panic!("expected Decode, got {other:?}"),
        }
    }

    #[test]
    fn test_hash_insert_rejects_empty_collection() {
        let err = decode(
            &json!({"collection": "", "key": "k", "fields": {"f": 1}}),
            OperationKind::HashInsert,
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::Decode(_)));
    }

    #[test]
    fn test_hash_insert_accepts_value_alias() {
        let record = HashInsert::from_value(&json!({
            "collection": "users",
            "key": "1",
            "value": {"name": "Alice"},
            "ttl": 60
        }))
        .unwrap();
        assert_eq!(record.composite_key(), "users:1");
        assert_eq!(record.fields.get("name"), Some(&json!("Alice")));
        assert_eq!(record.ttl, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_hash_insert_rejects_mistyped_fields() {
        let err = decode(
            &json!({"collection": "c", "key": "k", "fields": "not-a-map"}),
            OperationKind::HashInsert,
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::Decode(_)));
    }

    #[test]
    fn test_hash_lookup_rejects_unknown_fields() {
        let err = decode(
            &json!({"collection": "c", "key": "k", "field": "f", "extra": true}),
            OperationKind::HashLookup,
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::Decode(_)));
    }

    #[test]
    fn test_hash_lookup_requires_field() {
        let err = HashLookup::from_value(&json!({"collection": "c", "key": "k"})).unwrap_err();
        assert!(matches!(err, StorageError::Decode(ref msg) if msg.contains("field")));
    }

    #[test]
    fn test_batch_insert_array_and_envelope() {
        let entries = json!([
            {"key": "a", "value": 1},
            {"key": "b", "value": 2, "ttl": 5}
        ]);
        let from_array = decode(&entries, OperationKind::BatchInsert).unwrap();
        let from_envelope =
            decode(&json!({ "records": entries }), OperationKind::BatchInsert).unwrap();
        assert_eq!(from_array, from_envelope);
        match from_array {
            OperationRecord::BatchInsert(records) => {
                assert_eq!(records.len(), 2);
                assert_eq!(records[1].ttl, Some(Duration::from_secs(5)));
            }
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn test_batch_insert_rejects_scalar() {
        let err = decode(&json!("nope"), OperationKind::BatchInsert).unwrap_err();
        assert!(matches!(err, StorageError::Decode(ref msg) if msg.contains("a string")));
    }

    #[test]
    fn test_batch_insert_fails_on_one_bad_entry() {
        let err = decode(
            &json!([{"key": "a", "value": 1}, {"value": 2}]),
            OperationKind::BatchInsert,
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::Decode(_)));
    }

    #[test]
    fn test_kind_reports_variant() {
        let record = OperationRecord::HashLookup(HashLookup::new("c", "k", "f"));
        assert_eq!(record.kind(), OperationKind::HashLookup);
        assert_eq!(record.kind().to_string(), "hash lookup");
    }

    #[test]
    fn test_ttl_serializes_as_seconds() {
        let insert = SingleInsert::new("k", json!(1)).with_ttl(Duration::from_secs(90));
        let encoded = serde_json::to_value(&insert).unwrap();
        assert_eq!(encoded, json!({"key": "k", "value": 1, "ttl": 90}));
    }
}

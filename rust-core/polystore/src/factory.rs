// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Store factory: descriptor in, unconnected adapter out.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::adapter::StoreAdapter;
use crate::config::{StoreConfig, StoreType};
use crate::error::StorageError;

/// Construct the adapter named by `config`. The adapter is not connected.
///
#[cfg_attr(feature = "key-value-store", doc = "```rust")]
#[cfg_attr(not(feature = "key-value-store"), doc = "```ignore")]
/// use polystore::adapter::StoreAdapter;
/// use polystore::config::{StoreConfig, StoreType};
/// use polystore::factory::new_store;
///
/// let store = new_store(&StoreConfig::new(StoreType::KeyValue, "redis://127.0.0.1")).unwrap();
/// assert_eq!(store.name(), "key-value");
/// ```
pub fn new_store(config: &StoreConfig) -> Result<Arc<dyn StoreAdapter>, StorageError> {
    let store_type = config.store_type()?;
    info!(store_type = %store_type, url = %config.url, "creating store adapter");

    match store_type {
        StoreType::Document => document_store(config),
        StoreType::KeyValue => key_value_store(config),
        StoreType::Record => record_store(config),
    }
}

/// Decode an untyped descriptor and construct its adapter.
pub fn new_store_from_value(descriptor: &Value) -> Result<Arc<dyn StoreAdapter>, StorageError> {
    new_store(&StoreConfig::from_value(descriptor)?)
}

#[cfg(feature = "document-store")]
fn document_store(config: &StoreConfig) -> Result<Arc<dyn StoreAdapter>, StorageError> {
    Ok(Arc::new(crate::mongo_store::MongoStore::from_config(config)))
}

#[cfg(not(feature = "document-store"))]
fn document_store(_config: &StoreConfig) -> Result<Arc<dyn StoreAdapter>, StorageError> {
    Err(disabled(StoreType::Document, "document-store"))
}

#[cfg(feature = "key-value-store")]
fn key_value_store(config: &StoreConfig) -> Result<Arc<dyn StoreAdapter>, StorageError> {
    Ok(Arc::new(crate::redis_store::RedisStore::from_config(config)))
}

#[cfg(not(feature = "key-value-store"))]
fn key_value_store(_config: &StoreConfig) -> Result<Arc<dyn StoreAdapter>, StorageError> {
    Err(disabled(StoreType::KeyValue, "key-value-store"))
}

#[cfg(feature = "record-store")]
fn record_store(config: &StoreConfig) -> Result<Arc<dyn StoreAdapter>, StorageError> {
    Ok(Arc::new(crate::record_store::RecordStore::from_config(config)))
}

#[cfg(not(feature = "record-store"))]
fn record_store(_config: &StoreConfig) -> Result<Arc<dyn StoreAdapter>, StorageError> {
    Err(disabled(StoreType::Record, "record-store"))
}

#[allow(dead_code)]
fn disabled(store_type: StoreType, feature: &str) -> StorageError {
    StorageError::Config(format!(
        "{store_type} store support is not compiled in (enable the `{feature}` feature)"
    ))
}

#[cfg(all(
    test,
    feature = "document-store",
    feature = "key-value-store",
    feature = "record-store"
))]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dispatch_by_flag() {
        for (flag, name) in [(1, "document"), (2, "key-value"), (4, "record")] {
            let store =
                new_store_from_value(&json!({"storeType": flag, "url": "x", "name": "n"}))
                    .unwrap();
            assert_eq!(store.name(), name);
        }
    }

    #[test]
    fn test_dispatch_by_name() {
        let store = new_store_from_value(&json!({"storeType": "redis", "url": "redis://h"}))
            .unwrap();
        assert_eq!(store.name(), "key-value");

        let store = new_store_from_value(&json!({"dbType": "mongo", "dbUrl": "mongodb://h"}))
            .unwrap();
        assert_eq!(store.name(), "document");
    }

    #[test]
    fn test_unknown_store_type() {
        let err = new_store_from_value(&json!({"storeType": 999, "url": "x"})).err();
        assert!(matches!(err, Some(StorageError::UnknownStoreType(ref tag)) if tag == "999"));

        let err = new_store_from_value(&json!({"storeType": "cassandra", "url": "x"})).err();
        assert!(matches!(err, Some(StorageError::UnknownStoreType(_))));
    }

    #[test]
    fn test_non_flag_store_type_is_unknown() {
        for (tag, raw) in [
            (json!(-1), "-1"),
            (json!(1.5), "1.5"),
            (json!(true), "true"),
            (json!(null), "null"),
        ] {
            let err = new_store_from_value(&json!({"storeType": tag, "url": "x"})).err();
            assert!(
                matches!(err, Some(StorageError::UnknownStoreType(ref t)) if t == raw),
                "{raw}: {err:?}"
            );
        }
    }

    #[test]
    fn test_malformed_descriptor() {
        let err = new_store_from_value(&json!("not a descriptor")).err();
        assert!(matches!(err, Some(StorageError::Config(_))));
    }

    #[tokio::test]
    async fn test_record_store_from_descriptor_connects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("factory.redb");
        let store = new_store_from_value(&json!({
            "storeType": "record",
            "url": path.display().to_string(),
            "name": "sessions"
        }))
        .unwrap();

        store.connect().await.unwrap();
        store
            .insert_one("s", &crate::record::SingleInsert::new("1", json!(true)))
            .await
            .unwrap();
        assert_eq!(store.find_one("s", "1").await.unwrap(), Some(json!(true)));
        store.close().await;
    }
}

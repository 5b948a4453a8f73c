// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory store adapter.
//
// Uses a `BTreeMap` wrapped in a tokio `RwLock`, keyed by composite key, with
// the same value/hash/expiry semantics as the key-value adapter. Expired
// entries are treated as absent on read and replaced on write. Intended for
// testing, benchmarks and small ephemeral datasets; it is not selectable
// through the store factory.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::adapter::StoreAdapter;
use crate::error::StorageError;
use crate::key::format_key;
use crate::record::{normalize_ttl, HashFields, SingleInsert};

#[derive(Debug, Clone)]
enum Stored {
    Value(Value),
    Hash(HashFields),
}

#[derive(Debug, Clone)]
struct Entry {
    stored: Stored,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

fn deadline(ttl: Option<Duration>) -> Option<Instant> {
    normalize_ttl(ttl).map(|ttl| Instant::now() + ttl)
}

/// An in-memory store adapter backed by a sorted `BTreeMap`.
///
/// All data lives in process memory and is lost on drop. Clones share state,
/// making it suitable for concurrent tokio tasks.
///
/// # Example
///
/// ```rust
/// use polystore::adapter::StoreAdapter;
/// use polystore::memory::InMemoryStore;
/// use polystore::record::SingleInsert;
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let store = InMemoryStore::new();
/// store.connect().await.unwrap();
/// store.insert_one("greetings", &SingleInsert::new("en", json!("hello"))).await.unwrap();
/// let val = store.find_one("greetings", "en").await.unwrap();
/// assert_eq!(val, Some(json!("hello")));
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    /// Entries keyed by composite key, protected by a read-write lock.
    data: Arc<RwLock<BTreeMap<String, Entry>>>,
    connected: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Create a new, empty, disconnected store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Return the number of live (unexpired) keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.data
            .read()
            .await
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    /// Return true if the store holds no live keys.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether `connect()` has been called without a later `close()`.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn ensure_connected(&self) -> Result<(), StorageError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(StorageError::NotConnected(self.name().to_string()))
        }
    }

    async fn live(&self, key: &str) -> Option<Stored> {
        let map = self.data.read().await;
        map.get(key)
            .filter(|entry| entry.is_live(Instant::now()))
            .map(|entry| entry.stored.clone())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn wrong_type(key: &str) -> StorageError {
    StorageError::Backend(format!(
        "WRONGTYPE key '{key}' holds the wrong kind of value"
    ))
}

#[async_trait]
impl StoreAdapter for InMemoryStore {
    async fn connect(&self) -> Result<(), StorageError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn find_one(&self, collection: &str, key: &str) -> Result<Option<Value>, StorageError> {
        self.ensure_connected()?;
        let full_key = format_key(collection, key);
        match self.live(&full_key).await {
            Some(Stored::Value(value)) => Ok(Some(value)),
            Some(Stored::Hash(_)) => Err(wrong_type(&full_key)),
            None => Ok(None),
        }
    }

    async fn find_many(
        &self,
        collection: &str,
        keys: &[String],
    ) -> Result<Vec<Option<Value>>, StorageError> {
        self.ensure_connected()?;
        let map = self.data.read().await;
        let now = Instant::now();
        let results = keys
            .iter()
            .map(|key| {
                // Multi-get reports non-string entries as absent.
                match map.get(&format_key(collection, key)) {
                    Some(entry) if entry.is_live(now) => match &entry.stored {
                        Stored::Value(value) => Some(value.clone()),
                        Stored::Hash(_) => None,
                    },
                    _ => None,
                }
            })
            .collect();
        Ok(results)
    }

    async fn insert_one(&self, collection: &str, record: &SingleInsert) -> Result<(), StorageError> {
        self.ensure_connected()?;
        let mut map = self.data.write().await;
        map.insert(
            format_key(collection, &record.key),
            Entry {
                stored: Stored::Value(record.value.clone()),
                expires_at: deadline(record.ttl),
            },
        );
        Ok(())
    }

    async fn insert_many(
        &self,
        collection: &str,
        records: &[SingleInsert],
    ) -> Result<(), StorageError> {
        self.ensure_connected()?;
        let mut map = self.data.write().await;
        for record in records {
            map.insert(
                format_key(collection, &record.key),
                Entry {
                    stored: Stored::Value(record.value.clone()),
                    expires_at: None,
                },
            );
        }
        for record in records {
            if let Some(entry) = map.get_mut(&format_key(collection, &record.key)) {
                entry.expires_at = deadline(record.ttl);
            }
        }
        Ok(())
    }

    async fn hash_set(
        &self,
        key: &str,
        fields: &HashFields,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        self.ensure_connected()?;
        if fields.is_empty() {
            return Ok(());
        }
        let mut map = self.data.write().await;
        let now = Instant::now();
        let entry = map.entry(key.to_string()).or_insert_with(|| Entry {
            stored: Stored::Hash(HashFields::new()),
            expires_at: None,
        });
        if !entry.is_live(now) {
            *entry = Entry {
                stored: Stored::Hash(HashFields::new()),
                expires_at: None,
            };
        }
        match &mut entry.stored {
            Stored::Hash(existing) => {
                existing.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            Stored::Value(_) => return Err(wrong_type(key)),
        }
        if let Some(at) = deadline(ttl) {
            entry.expires_at = Some(at);
        }
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Value>, StorageError> {
        self.ensure_connected()?;
        match self.live(key).await {
            Some(Stored::Hash(fields)) => Ok(fields.get(field).cloned()),
            Some(Stored::Value(_)) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::HashInsert;
    use serde_json::json;

    async fn connected() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.connect().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_basic_insert_and_find() {
        let store = connected().await;

        assert!(store.is_empty().await);
        assert_eq!(store.find_one("c", "k1").await.unwrap(), None);

        store
            .insert_one("c", &SingleInsert::new("k1", json!("v1")))
            .await
            .unwrap();
        assert_eq!(store.find_one("c", "k1").await.unwrap(), Some(json!("v1")));
        assert_eq!(store.len().await, 1);

        // Overwrite.
        store
            .insert_one("c", &SingleInsert::new("k1", json!({"n": 2})))
            .await
            .unwrap();
        assert_eq!(
            store.find_one("c", "k1").await.unwrap(),
            Some(json!({"n": 2}))
        );
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_operations_require_connect() {
        let store = InMemoryStore::new();
        let err = store.find_one("c", "k").await.unwrap_err();
        assert!(matches!(err, StorageError::NotConnected(_)));

        store.connect().await.unwrap();
        store.close().await;
        let err = store.hash_get("c:k", "f").await.unwrap_err();
        assert!(matches!(err, StorageError::NotConnected(_)));
    }

    #[tokio::test]
    async fn test_find_many_aligns_with_input() {
        let store = connected().await;
        store
            .insert_many(
                "c",
                &[
                    SingleInsert::new("a", json!(1)),
                    SingleInsert::new("c", json!(3)),
                ],
            )
            .await
            .unwrap();

        let keys = vec!["a".to_string(), "missing".to_string(), "c".to_string()];
        let results = store.find_many("c", &keys).await.unwrap();
        assert_eq!(results, vec![Some(json!(1)), None, Some(json!(3))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expires_entries() {
        let store = connected().await;
        store
            .insert_many(
                "session",
                &[
                    SingleInsert::new("short", json!("s")).with_ttl(Duration::from_secs(5)),
                    SingleInsert::new("long", json!("l")),
                ],
            )
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(store.find_one("session", "short").await.unwrap(), None);
        assert_eq!(
            store.find_one("session", "long").await.unwrap(),
            Some(json!("l"))
        );
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_hash_fields_merge() {
        let store = connected().await;
        store
            .insert_one_hash(&HashInsert::new("users", "1").field("name", json!("Alice")))
            .await
            .unwrap();
        store
            .insert_one_hash(&HashInsert::new("users", "1").field("age", json!(30)))
            .await
            .unwrap();

        assert_eq!(
            store.find_one_field("users", "1", "name").await.unwrap(),
            Some(json!("Alice"))
        );
        assert_eq!(
            store.find_one_field("users", "1", "age").await.unwrap(),
            Some(json!(30))
        );
        assert_eq!(store.find_one_field("users", "1", "email").await.unwrap(), None);
        assert_eq!(store.find_one_field("users", "2", "name").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_wrong_type_is_reported() {
        let store = connected().await;
        store
            .insert_one("c", &SingleInsert::new("plain", json!("v")))
            .await
            .unwrap();
        let err = store
            .hash_set("c:plain", &HashFields::from([("f".to_string(), json!(1))]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Backend(ref msg) if msg.contains("WRONGTYPE")));
    }

    #[tokio::test]
    async fn test_update_is_unsupported() {
        let store = connected().await;
        let err = store.update_one("c", "k", &json!({})).await.unwrap_err();
        assert!(matches!(err, StorageError::Unsupported("update_one")));
        let err = store.update_many("c", &[], &json!({})).await.unwrap_err();
        assert!(matches!(err, StorageError::Unsupported("update_many")));
    }

    #[tokio::test]
    async fn test_empty_hash_set_writes_nothing() {
        let store = connected().await;
        store.hash_set("h:1", &HashFields::new(), None).await.unwrap();
        assert!(store.is_empty().await);
        assert_eq!(store.find_one("h", "1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let store = connected().await;
        store.close().await;
        store.close().await;
        assert!(!store.is_connected());
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let store = connected().await;
        let clone = store.clone();

        store
            .insert_one("shared", &SingleInsert::new("k", json!("data")))
            .await
            .unwrap();
        assert_eq!(
            clone.find_one("shared", "k").await.unwrap(),
            Some(json!("data"))
        );
    }

    #[tokio::test]
    async fn test_name() {
        assert_eq!(InMemoryStore::new().name(), "in-memory");
    }
}

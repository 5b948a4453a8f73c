// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// redb-backed record store adapter.
//
// Uses redb (pure Rust, B-tree, ACID, single-file database) as the record
// store. The descriptor's `url` is the database file path and its `name`
// selects the table inside that file.
//
// # Design
//
// - One table of composite key -> JSON-encoded `StoredRecord`.
// - A record holds either a plain value or a map of named bins (a hash),
//   plus an optional absolute expiry in Unix milliseconds.
// - Expiry is lazy: expired records read as absent and are overwritten by
//   the next write. Nothing sweeps them in the background.
// - All redb calls run on `spawn_blocking`; `Database` is `Send + Sync`.
// - `insert_many` writes every record in one write transaction.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, TableError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::adapter::StoreAdapter;
use crate::config::StoreConfig;
use crate::error::StorageError;
use crate::key::format_key;
use crate::record::{normalize_ttl, HashFields, SingleInsert};

/// Table used when the descriptor does not name one.
pub const DEFAULT_TABLE: &str = "records";

fn table_def(name: &str) -> TableDefinition<'_, &'static str, &'static [u8]> {
    TableDefinition::new(name)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RecordBody {
    Value(Value),
    Bins(HashFields),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredRecord {
    body: RecordBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at_ms: Option<i64>,
}

impl StoredRecord {
    fn new(body: RecordBody, ttl: Option<Duration>) -> Self {
        Self {
            body,
            expires_at_ms: expiry_ms(ttl),
        }
    }

    fn is_live(&self, now_ms: i64) -> bool {
        self.expires_at_ms.map_or(true, |at| at > now_ms)
    }

    fn encode(&self) -> Result<Vec<u8>, StorageError> {
        Ok(serde_json::to_vec(self)?)
    }

    fn decode(key: &str, bytes: &[u8]) -> Result<Self, StorageError> {
        serde_json::from_slice(bytes).map_err(|e| {
            StorageError::SerializationError(format!("record '{key}': {e}"))
        })
    }
}

fn expiry_ms(ttl: Option<Duration>) -> Option<i64> {
    normalize_ttl(ttl).map(|ttl| {
        let millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        Utc::now().timestamp_millis().saturating_add(millis)
    })
}

fn wrong_type(key: &str) -> StorageError {
    StorageError::Backend(format!("record '{key}' holds the wrong kind of value"))
}

fn backend(context: &str, err: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(format!("{context}: {err}"))
}

/// A record store adapter powered by redb.
///
/// Not connected until [`StoreAdapter::connect`] opens (or creates) the
/// database file. Thread-safe: the open `Database` is shared by every
/// concurrent caller.
///
/// # Example
///
/// ```rust,no_run
/// use polystore::adapter::StoreAdapter;
/// use polystore::record::SingleInsert;
/// use polystore::record_store::RecordStore;
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let store = RecordStore::open("/tmp/polystore-test.redb", "sessions");
/// store.connect().await.unwrap();
/// store.insert_one("s", &SingleInsert::new("1", json!({"user": 7}))).await.unwrap();
/// assert_eq!(store.find_one("s", "1").await.unwrap(), Some(json!({"user": 7})));
/// store.close().await;
/// # });
/// ```
pub struct RecordStore {
    path: PathBuf,
    table: String,
    new_connection: bool,
    db: RwLock<Option<Arc<Database>>>,
}

impl RecordStore {
    /// Build an adapter for the database file at `path`, using `table`
    /// (or [`DEFAULT_TABLE`] when empty). Nothing is opened yet.
    pub fn open(path: impl AsRef<Path>, table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            path: path.as_ref().to_path_buf(),
            table: if table.is_empty() {
                DEFAULT_TABLE.to_string()
            } else {
                table
            },
            new_connection: false,
            db: RwLock::new(None),
        }
    }

    /// Build an adapter from a store descriptor.
    pub fn from_config(config: &StoreConfig) -> Self {
        let mut store = Self::open(&config.url, config.name.clone());
        store.new_connection = config.new_connection;
        store
    }

    /// Return the filesystem path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    async fn handle(&self) -> Result<Arc<Database>, StorageError> {
        self.db
            .read()
            .await
            .clone()
            .ok_or_else(|| StorageError::NotConnected(self.name().to_string()))
    }

    /// Run `f` against the open database on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Database, &str) -> Result<T, StorageError> + Send + 'static,
    {
        let db = self.handle().await?;
        let table = self.table.clone();
        tokio::task::spawn_blocking(move || f(&db, &table))
            .await
            .map_err(|e| StorageError::Backend(format!("task join: {e}")))?
    }

    async fn read_live(&self, keys: Vec<String>) -> Result<Vec<Option<StoredRecord>>, StorageError> {
        self.blocking(move |db, table| {
            let txn = db.begin_read().map_err(|e| backend("read txn", e))?;
            let table = match txn.open_table(table_def(table)) {
                Ok(t) => t,
                // Nothing has been written yet.
                Err(TableError::TableDoesNotExist(_)) => return Ok(vec![None; keys.len()]),
                Err(e) => return Err(backend("open table", e)),
            };

            let now_ms = Utc::now().timestamp_millis();
            let mut results = Vec::with_capacity(keys.len());
            for key in &keys {
                let bytes = table
                    .get(key.as_str())
                    .map_err(|e| backend("get", e))?
                    .map(|guard| guard.value().to_vec());
                let record = match bytes {
                    Some(bytes) => Some(StoredRecord::decode(key, &bytes)?),
                    None => None,
                };
                results.push(record.filter(|r| r.is_live(now_ms)));
            }
            Ok(results)
        })
        .await
    }

    async fn read_one(&self, key: String) -> Result<Option<StoredRecord>, StorageError> {
        Ok(self.read_live(vec![key]).await?.pop().flatten())
    }

    async fn write_all(&self, records: Vec<(String, StoredRecord)>) -> Result<(), StorageError> {
        let encoded = records
            .into_iter()
            .map(|(key, record)| Ok((key, record.encode()?)))
            .collect::<Result<Vec<_>, StorageError>>()?;

        self.blocking(move |db, table| {
            let txn = db.begin_write().map_err(|e| backend("write txn", e))?;
            {
                let mut table = txn
                    .open_table(table_def(table))
                    .map_err(|e| backend("open table", e))?;
                for (key, bytes) in &encoded {
                    table
                        .insert(key.as_str(), bytes.as_slice())
                        .map_err(|e| backend("insert", e))?;
                }
            }
            txn.commit().map_err(|e| backend("commit", e))?;
            Ok(())
        })
        .await
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("path", &self.path)
            .field("table", &self.table)
            .finish()
    }
}

#[async_trait]
impl StoreAdapter for RecordStore {
    async fn connect(&self) -> Result<(), StorageError> {
        let mut slot = self.db.write().await;

        if let Some(db) = slot.as_ref().filter(|_| !self.new_connection) {
            let db = Arc::clone(db);
            tokio::task::spawn_blocking(move || db.begin_read().map(drop))
                .await
                .map_err(|e| StorageError::Connect(format!("task join: {e}")))?
                .map_err(|e| StorageError::Connect(format!("health check: {e}")))?;
            debug!(path = %self.path.display(), "record store still reachable");
            return Ok(());
        }

        // The file lock is held until the previous handle is dropped.
        slot.take();

        let path = self.path.clone();
        let db = tokio::task::spawn_blocking(move || -> Result<Database, StorageError> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Database::create(&path).map_err(|e| {
                StorageError::Connect(format!("failed to open redb at {}: {e}", path.display()))
            })
        })
        .await
        .map_err(|e| StorageError::Connect(format!("task join: {e}")))??;

        info!(path = %self.path.display(), table = %self.table, "record store connected");
        *slot = Some(Arc::new(db));
        Ok(())
    }

    async fn find_one(&self, collection: &str, key: &str) -> Result<Option<Value>, StorageError> {
        let full_key = format_key(collection, key);
        debug!(key = %full_key, "record find_one");
        match self.read_one(full_key.clone()).await? {
            Some(StoredRecord {
                body: RecordBody::Value(value),
                ..
            }) => Ok(Some(value)),
            Some(_) => Err(wrong_type(&full_key)),
            None => Ok(None),
        }
    }

    async fn find_many(
        &self,
        collection: &str,
        keys: &[String],
    ) -> Result<Vec<Option<Value>>, StorageError> {
        debug!(collection, keys = keys.len(), "record find_many");
        let full_keys = keys.iter().map(|key| format_key(collection, key)).collect();
        let records = self.read_live(full_keys).await?;
        Ok(records
            .into_iter()
            .map(|record| match record.map(|r| r.body) {
                Some(RecordBody::Value(value)) => Some(value),
                // Multi-get reports bins as absent.
                _ => None,
            })
            .collect())
    }

    async fn insert_one(&self, collection: &str, record: &SingleInsert) -> Result<(), StorageError> {
        let full_key = format_key(collection, &record.key);
        debug!(key = %full_key, "record insert_one");
        self.write_all(vec![(
            full_key,
            StoredRecord::new(RecordBody::Value(record.value.clone()), record.ttl),
        )])
        .await
    }

    async fn insert_many(
        &self,
        collection: &str,
        records: &[SingleInsert],
    ) -> Result<(), StorageError> {
        debug!(collection, records = records.len(), "record insert_many");
        // Values and expirations commit together, so there is no partial state.
        let rows = records
            .iter()
            .map(|record| {
                (
                    format_key(collection, &record.key),
                    StoredRecord::new(RecordBody::Value(record.value.clone()), record.ttl),
                )
            })
            .collect();
        self.write_all(rows).await
    }

    async fn hash_set(
        &self,
        key: &str,
        fields: &HashFields,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        if fields.is_empty() {
            self.handle().await?;
            return Ok(());
        }
        debug!(key, fields = fields.len(), "record hash_set");
        let key = key.to_string();
        let fields = fields.clone();
        let new_expiry = expiry_ms(ttl);

        self.blocking(move |db, table| {
            let txn = db.begin_write().map_err(|e| backend("write txn", e))?;
            {
                let mut table = txn
                    .open_table(table_def(table))
                    .map_err(|e| backend("open table", e))?;

                let existing = table
                    .get(key.as_str())
                    .map_err(|e| backend("get", e))?
                    .map(|guard| guard.value().to_vec());
                let now_ms = Utc::now().timestamp_millis();
                let existing = match existing {
                    Some(bytes) => {
                        Some(StoredRecord::decode(&key, &bytes)?).filter(|r| r.is_live(now_ms))
                    }
                    None => None,
                };

                let record = match existing {
                    Some(StoredRecord {
                        body: RecordBody::Bins(mut bins),
                        expires_at_ms,
                    }) => {
                        bins.extend(fields);
                        StoredRecord {
                            body: RecordBody::Bins(bins),
                            expires_at_ms: new_expiry.or(expires_at_ms),
                        }
                    }
                    Some(_) => return Err(wrong_type(&key)),
                    None => StoredRecord {
                        body: RecordBody::Bins(fields),
                        expires_at_ms: new_expiry,
                    },
                };

                table
                    .insert(key.as_str(), record.encode()?.as_slice())
                    .map_err(|e| backend("insert", e))?;
            }
            txn.commit().map_err(|e| backend("commit", e))?;
            Ok(())
        })
        .await
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Value>, StorageError> {
        debug!(key, field, "record hash_get");
        match self.read_one(key.to_string()).await? {
            Some(StoredRecord {
                body: RecordBody::Bins(mut bins),
                ..
            }) => Ok(bins.remove(field)),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn close(&self) {
        if self.db.write().await.take().is_some() {
            info!(path = %self.path.display(), "record store closed");
        }
    }

    fn name(&self) -> &str {
        "record"
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// MongoDB document store adapter.
//
// Each collection maps to a MongoDB collection of the same name holding one
// document per key:
//
//     { _id: <key>, value: <value>, expiresAt: <date>? }
//
// Hashes live in the `hashes` collection as `{ _id: <composite key>,
// fields: {...}, expiresAt: <date>? }`. Expiry is enforced twice: reads
// filter out documents whose `expiresAt` has passed, and a TTL index
// (created lazily, once per collection) lets the server reap them.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::try_join_all;
use futures::TryStreamExt;
use mongodb::bson::{self, doc, Bson, DateTime, Document};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::adapter::StoreAdapter;
use crate::config::StoreConfig;
use crate::error::StorageError;
use crate::record::{normalize_ttl, HashFields, SingleInsert};

/// Database used when neither the descriptor nor the URI names one.
pub const DEFAULT_DATABASE: &str = "polystore";
/// Collection holding hash documents.
pub const HASH_COLLECTION: &str = "hashes";

const ID: &str = "_id";
const VALUE: &str = "value";
const FIELDS: &str = "fields";
const EXPIRES_AT: &str = "expiresAt";

impl From<mongodb::error::Error> for StorageError {
    fn from(err: mongodb::error::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

fn to_bson(value: &Value) -> Result<Bson, StorageError> {
    bson::to_bson(value).map_err(|e| StorageError::SerializationError(e.to_string()))
}

fn to_json(value: Bson) -> Value {
    value.into_relaxed_extjson()
}

fn expires_at(ttl: Option<Duration>) -> Option<DateTime> {
    normalize_ttl(ttl).map(|ttl| {
        let millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        DateTime::from_millis(DateTime::now().timestamp_millis().saturating_add(millis))
    })
}

/// Match documents that have no expiry or whose expiry is still ahead.
fn live_filter(filter: Document) -> Document {
    let mut filter = filter;
    filter.insert(
        "$or",
        vec![
            Bson::Document(doc! { EXPIRES_AT: { "$exists": false } }),
            Bson::Document(doc! { EXPIRES_AT: { "$gt": DateTime::now() } }),
        ],
    );
    filter
}

fn value_document(key: &str, record: &SingleInsert) -> Result<Document, StorageError> {
    let mut document = doc! { ID: key, VALUE: to_bson(&record.value)? };
    if let Some(at) = expires_at(record.ttl) {
        document.insert(EXPIRES_AT, at);
    }
    Ok(document)
}

/// The last record written for each key, in input order. Upserts run
/// concurrently, so a repeated key must reach the server only once.
fn last_per_key(records: &[SingleInsert]) -> Vec<&SingleInsert> {
    let last: HashMap<&str, usize> = records
        .iter()
        .enumerate()
        .map(|(i, record)| (record.key.as_str(), i))
        .collect();
    records
        .iter()
        .enumerate()
        .filter(|(i, record)| last.get(record.key.as_str()) == Some(i))
        .map(|(_, record)| record)
        .collect()
}

#[derive(Clone)]
struct Connection {
    client: Client,
    db: Database,
}

/// A document store adapter over a MongoDB deployment.
///
/// # Example
///
/// ```rust,no_run
/// use polystore::adapter::StoreAdapter;
/// use polystore::mongo_store::MongoStore;
/// use polystore::record::SingleInsert;
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let store = MongoStore::new("mongodb://127.0.0.1:27017", "app");
/// store.connect().await.unwrap();
/// store.insert_one("users", &SingleInsert::new("1", json!({"name": "Ada"}))).await.unwrap();
/// let user = store.find_one("users", "1").await.unwrap();
/// assert_eq!(user, Some(json!({"name": "Ada"})));
/// store.close().await;
/// # });
/// ```
pub struct MongoStore {
    endpoint: String,
    database: String,
    new_connection: bool,
    conn: RwLock<Option<Connection>>,
    ttl_indexed: Mutex<HashSet<String>>,
}

impl MongoStore {
    /// Build an adapter for `endpoint` using database `database` (empty
    /// means the URI's default database). Nothing is opened yet.
    pub fn new(endpoint: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            database: database.into(),
            new_connection: false,
            conn: RwLock::new(None),
            ttl_indexed: Mutex::new(HashSet::new()),
        }
    }

    /// Build an adapter from a store descriptor.
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            new_connection: config.new_connection,
            ..Self::new(config.endpoint(), config.name.clone())
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn connection(&self) -> Result<Connection, StorageError> {
        self.conn
            .read()
            .await
            .clone()
            .ok_or_else(|| StorageError::NotConnected(self.name().to_string()))
    }

    async fn ping(db: &Database) -> Result<(), StorageError> {
        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StorageError::Connect(format!("ping: {e}")))?;
        Ok(())
    }

    /// The named collection, with its TTL index ensured.
    async fn collection(&self, name: &str) -> Result<Collection<Document>, StorageError> {
        let conn = self.connection().await?;
        let collection = conn.db.collection::<Document>(name);

        let mut indexed = self.ttl_indexed.lock().await;
        if !indexed.contains(name) {
            let index = IndexModel::builder()
                .keys(doc! { EXPIRES_AT: 1 })
                .options(IndexOptions::builder().expire_after(Duration::ZERO).build())
                .build();
            collection.create_index(index).await?;
            debug!(collection = name, "ensured TTL index");
            indexed.insert(name.to_string());
        }
        Ok(collection)
    }
}

impl std::fmt::Debug for MongoStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoStore")
            .field("endpoint", &self.endpoint)
            .field("database", &self.database)
            .finish()
    }
}

#[async_trait]
impl StoreAdapter for MongoStore {
    async fn connect(&self) -> Result<(), StorageError> {
        let mut slot = self.conn.write().await;

        if let Some(conn) = slot.as_ref().filter(|_| !self.new_connection) {
            Self::ping(&conn.db).await?;
            debug!(endpoint = %self.endpoint, "mongodb still reachable");
            return Ok(());
        }

        if let Some(old) = slot.take() {
            old.client.shutdown().await;
        }
        self.ttl_indexed.lock().await.clear();

        let client = Client::with_uri_str(&self.endpoint)
            .await
            .map_err(|e| StorageError::Connect(format!("{}: {e}", self.endpoint)))?;
        let db = if self.database.is_empty() {
            client
                .default_database()
                .unwrap_or_else(|| client.database(DEFAULT_DATABASE))
        } else {
            client.database(&self.database)
        };
        Self::ping(&db).await?;

        info!(endpoint = %self.endpoint, database = db.name(), "mongodb connected");
        *slot = Some(Connection { client, db });
        Ok(())
    }

    async fn find_one(&self, collection: &str, key: &str) -> Result<Option<Value>, StorageError> {
        debug!(collection, key, "mongodb find_one");
        let coll = self.collection(collection).await?;
        let found = coll.find_one(live_filter(doc! { ID: key })).await?;
        Ok(found.and_then(|mut document| document.remove(VALUE)).map(to_json))
    }

    async fn find_many(
        &self,
        collection: &str,
        keys: &[String],
    ) -> Result<Vec<Option<Value>>, StorageError> {
        let coll = self.collection(collection).await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        debug!(collection, keys = keys.len(), "mongodb find_many");

        let documents: Vec<Document> = coll
            .find(live_filter(doc! { ID: { "$in": keys.to_vec() } }))
            .await?
            .try_collect()
            .await?;
        let by_id: HashMap<String, Bson> = documents
            .into_iter()
            .filter_map(|mut document| {
                let id = document.get_str(ID).ok()?.to_string();
                let value = document.remove(VALUE)?;
                Some((id, value))
            })
            .collect();

        Ok(keys
            .iter()
            .map(|key| by_id.get(key).cloned().map(to_json))
            .collect())
    }

    async fn insert_one(&self, collection: &str, record: &SingleInsert) -> Result<(), StorageError> {
        debug!(collection, key = %record.key, "mongodb insert_one");
        let coll = self.collection(collection).await?;
        coll.replace_one(doc! { ID: &record.key }, value_document(&record.key, record)?)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn insert_many(
        &self,
        collection: &str,
        records: &[SingleInsert],
    ) -> Result<(), StorageError> {
        let coll = self.collection(collection).await?;
        debug!(collection, records = records.len(), "mongodb insert_many");

        // Expiry travels inside each document, so every upsert is complete on its own.
        let documents = last_per_key(records)
            .into_iter()
            .map(|record| Ok((record.key.as_str(), value_document(&record.key, record)?)))
            .collect::<Result<Vec<_>, StorageError>>()?;
        try_join_all(documents.into_iter().map(|(key, document)| {
            let coll = coll.clone();
            async move {
                coll.replace_one(doc! { ID: key }, document)
                    .upsert(true)
                    .await
                    .map(drop)
            }
        }))
        .await?;
        Ok(())
    }

    async fn hash_set(
        &self,
        key: &str,
        fields: &HashFields,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        if fields.is_empty() {
            self.connection().await?;
            return Ok(());
        }
        debug!(key, fields = fields.len(), "mongodb hash_set");
        let coll = self.collection(HASH_COLLECTION).await?;

        let mut set = Document::new();
        for (field, value) in fields {
            set.insert(format!("{FIELDS}.{field}"), to_bson(value)?);
        }
        if let Some(at) = expires_at(ttl) {
            set.insert(EXPIRES_AT, at);
        }
        coll.update_one(doc! { ID: key }, doc! { "$set": set })
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Value>, StorageError> {
        debug!(key, field, "mongodb hash_get");
        let coll = self.collection(HASH_COLLECTION).await?;
        let mut projection = Document::new();
        projection.insert(format!("{FIELDS}.{field}"), 1);
        let found = coll
            .find_one(live_filter(doc! { ID: key }))
            .projection(projection)
            .await?;
        Ok(found
            .and_then(|mut document| match document.remove(FIELDS) {
                Some(Bson::Document(mut fields)) => fields.remove(field),
                _ => None,
            })
            .map(to_json))
    }

    async fn close(&self) {
        let Some(conn) = self.conn.write().await.take() else {
            return;
        };
        self.ttl_indexed.lock().await.clear();
        conn.client.shutdown().await;
        info!(endpoint = %self.endpoint, "mongodb connection closed");
    }

    fn name(&self) -> &str {
        "document"
    }
}

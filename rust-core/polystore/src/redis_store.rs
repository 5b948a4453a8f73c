// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Redis key-value store adapter.
//
// Values are stored as JSON text under the composite key; hashes are native
// Redis hashes whose field values are JSON text. One multiplexed connection
// is shared by every caller: it is cloned out of the lock before each
// command, so concurrent driver workers pipeline over the same socket.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::adapter::StoreAdapter;
use crate::config::StoreConfig;
use crate::error::StorageError;
use crate::key::format_key;
use crate::record::{normalize_ttl, HashFields, SingleInsert};

impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        StorageError::Backend(err.to_string())
    }
}

/// Encode a value for storage as a Redis string.
fn encode(value: &Value) -> Result<String, StorageError> {
    Ok(serde_json::to_string(value)?)
}

/// Decode a stored string. Text written by other clients that is not JSON
/// comes back as a JSON string.
fn decode(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

fn ttl_millis(ttl: Option<Duration>) -> Option<u64> {
    normalize_ttl(ttl).map(|ttl| u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1))
}

/// A key-value store adapter over a Redis server.
///
/// # Example
///
/// ```rust,no_run
/// use polystore::adapter::StoreAdapter;
/// use polystore::record::SingleInsert;
/// use polystore::redis_store::RedisStore;
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let store = RedisStore::new("redis://127.0.0.1:6379");
/// store.connect().await.unwrap();
/// store.insert_one("greetings", &SingleInsert::new("en", json!("hello"))).await.unwrap();
/// assert_eq!(store.find_one("greetings", "en").await.unwrap(), Some(json!("hello")));
/// # });
/// ```
pub struct RedisStore {
    endpoint: String,
    new_connection: bool,
    conn: RwLock<Option<MultiplexedConnection>>,
}

impl RedisStore {
    /// Build an adapter for `endpoint`. Nothing is opened yet.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            new_connection: false,
            conn: RwLock::new(None),
        }
    }

    /// Build an adapter from a store descriptor. `name` is not used.
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            new_connection: config.new_connection,
            ..Self::new(config.endpoint())
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn conn(&self) -> Result<MultiplexedConnection, StorageError> {
        self.conn
            .read()
            .await
            .clone()
            .ok_or_else(|| StorageError::NotConnected(self.name().to_string()))
    }

    async fn ping(conn: &mut MultiplexedConnection) -> Result<(), StorageError> {
        let _pong: String = redis::cmd("PING")
            .query_async(conn)
            .await
            .map_err(|e| StorageError::Connect(format!("ping: {e}")))?;
        Ok(())
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("endpoint", &self.endpoint)
            .field("new_connection", &self.new_connection)
            .finish()
    }
}

#[async_trait]
impl StoreAdapter for RedisStore {
    async fn connect(&self) -> Result<(), StorageError> {
        let mut slot = self.conn.write().await;

        if let Some(conn) = slot.as_mut().filter(|_| !self.new_connection) {
            Self::ping(conn).await?;
            debug!(endpoint = %self.endpoint, "redis still reachable");
            return Ok(());
        }

        let client = redis::Client::open(self.endpoint.as_str())
            .map_err(|e| StorageError::Connect(format!("{}: {e}", self.endpoint)))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StorageError::Connect(format!("{}: {e}", self.endpoint)))?;
        Self::ping(&mut conn).await?;

        info!(endpoint = %self.endpoint, "redis connected");
        *slot = Some(conn);
        Ok(())
    }

    async fn find_one(&self, collection: &str, key: &str) -> Result<Option<Value>, StorageError> {
        let full_key = format_key(collection, key);
        debug!(key = %full_key, "redis GET");
        let mut conn = self.conn().await?;
        let raw: Option<String> = redis::cmd("GET").arg(&full_key).query_async(&mut conn).await?;
        Ok(raw.map(decode))
    }

    async fn find_many(
        &self,
        collection: &str,
        keys: &[String],
    ) -> Result<Vec<Option<Value>>, StorageError> {
        let mut conn = self.conn().await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let full_keys: Vec<String> = keys.iter().map(|key| format_key(collection, key)).collect();
        debug!(collection, keys = keys.len(), "redis MGET");
        let raw: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&full_keys)
            .query_async(&mut conn)
            .await?;
        Ok(raw.into_iter().map(|value| value.map(decode)).collect())
    }

    async fn insert_one(&self, collection: &str, record: &SingleInsert) -> Result<(), StorageError> {
        let full_key = format_key(collection, &record.key);
        debug!(key = %full_key, "redis SET");
        let mut conn = self.conn().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(&full_key).arg(encode(&record.value)?);
        if let Some(ms) = ttl_millis(record.ttl) {
            cmd.arg("PX").arg(ms);
        }
        let () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn insert_many(
        &self,
        collection: &str,
        records: &[SingleInsert],
    ) -> Result<(), StorageError> {
        let mut conn = self.conn().await?;
        if records.is_empty() {
            return Ok(());
        }

        let mut mset = redis::cmd("MSET");
        for record in records {
            mset.arg(format_key(collection, &record.key))
                .arg(encode(&record.value)?);
        }
        debug!(collection, records = records.len(), "redis MSET");
        let () = mset.query_async(&mut conn).await?;

        // Expirations go out after the bulk write; a failure here leaves the
        // values in place without their expiry.
        let mut expirations = redis::pipe();
        let mut pending = 0usize;
        for record in records {
            if let Some(ms) = ttl_millis(record.ttl) {
                expirations
                    .cmd("PEXPIRE")
                    .arg(format_key(collection, &record.key))
                    .arg(ms)
                    .ignore();
                pending += 1;
            }
        }
        if pending > 0 {
            debug!(collection, expirations = pending, "redis PEXPIRE pipeline");
            let () = expirations.query_async(&mut conn).await?;
        }
        Ok(())
    }

    async fn hash_set(
        &self,
        key: &str,
        fields: &HashFields,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        let mut conn = self.conn().await?;
        if fields.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        let hset = pipe.cmd("HSET").arg(key);
        for (field, value) in fields {
            hset.arg(field).arg(encode(value)?);
        }
        hset.ignore();
        if let Some(ms) = ttl_millis(ttl) {
            pipe.cmd("PEXPIRE").arg(key).arg(ms).ignore();
        }
        debug!(key, fields = fields.len(), "redis HSET");
        let () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Value>, StorageError> {
        debug!(key, field, "redis HGET");
        let mut conn = self.conn().await?;
        let raw: Option<String> = redis::cmd("HGET")
            .arg(key)
            .arg(field)
            .query_async(&mut conn)
            .await?;
        Ok(raw.map(decode))
    }

    async fn close(&self) {
        // Dropping the last clone of the multiplexed connection ends its driver task.
        if self.conn.write().await.take().is_some() {
            info!(endpoint = %self.endpoint, "redis connection closed");
        }
    }

    fn name(&self) -> &str {
        "key-value"
    }
}

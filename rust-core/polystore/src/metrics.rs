// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Metrics-collecting wrapper for store adapters.
//
// Wraps any `StoreAdapter` and transparently counts reads, writes and
// failures, and sums wall-clock latency. Useful for dashboards, for tuning
// the hash driver's batch size, and for tests that need to observe how many
// backend calls a bulk operation actually made.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::adapter::StoreAdapter;
use crate::error::StorageError;
use crate::record::{HashFields, HashInsert, SingleInsert};

/// Accumulated statistics for a store adapter.
///
/// All counters are monotonically increasing for the lifetime of the
/// [`MetricsStore`] that owns them, until [`MetricsStore::reset_stats`].
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    /// Number of successful `connect` calls.
    pub connect_count: u64,
    /// Keys read through `find_one`, `find_many` and hash lookups.
    pub read_count: u64,
    /// Keys written through inserts and hash writes.
    pub write_count: u64,
    /// Calls that returned an error.
    pub failure_count: u64,
    /// Cumulative wall-clock latency of all read calls, in milliseconds.
    pub read_latency_sum_ms: f64,
    /// Cumulative wall-clock latency of all write calls, in milliseconds.
    pub write_latency_sum_ms: f64,
}

#[derive(Clone, Copy)]
enum Op {
    Read,
    Write,
}

/// A store adapter wrapper that collects operation metrics.
///
/// # Example
///
/// ```rust
/// use polystore::adapter::StoreAdapter;
/// use polystore::memory::InMemoryStore;
/// use polystore::metrics::MetricsStore;
/// use polystore::record::SingleInsert;
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let metered = MetricsStore::new(InMemoryStore::new());
/// metered.connect().await.unwrap();
///
/// metered.insert_one("c", &SingleInsert::new("k", json!(1))).await.unwrap();
/// metered.find_one("c", "k").await.unwrap();
///
/// let stats = metered.stats().await;
/// assert_eq!(stats.write_count, 1);
/// assert_eq!(stats.read_count, 1);
/// # });
/// ```
pub struct MetricsStore<S: StoreAdapter> {
    inner: S,
    stats: Arc<RwLock<StoreStats>>,
}

impl<S: StoreAdapter> MetricsStore<S> {
    /// Wrap `inner` with metrics collection.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            stats: Arc::new(RwLock::new(StoreStats::default())),
        }
    }

    /// Return a snapshot of the current statistics.
    pub async fn stats(&self) -> StoreStats {
        self.stats.read().await.clone()
    }

    /// Reset all statistics to zero.
    pub async fn reset_stats(&self) {
        let mut s = self.stats.write().await;
        *s = StoreStats::default();
    }

    /// Return a reference to the wrapped adapter.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn record<T>(
        &self,
        op: Op,
        keys: u64,
        elapsed: Duration,
        result: Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let mut s = self.stats.write().await;
        match op {
            Op::Read => {
                s.read_count += keys;
                s.read_latency_sum_ms += elapsed_ms;
            }
            Op::Write => {
                s.write_count += keys;
                s.write_latency_sum_ms += elapsed_ms;
            }
        }
        if result.is_err() {
            s.failure_count += 1;
        }
        result
    }
}

#[async_trait]
impl<S: StoreAdapter> StoreAdapter for MetricsStore<S> {
    async fn connect(&self) -> Result<(), StorageError> {
        let result = self.inner.connect().await;
        let mut s = self.stats.write().await;
        match result {
            Ok(()) => s.connect_count += 1,
            Err(_) => s.failure_count += 1,
        }
        result
    }

    async fn find_one(&self, collection: &str, key: &str) -> Result<Option<Value>, StorageError> {
        let start = Instant::now();
        let result = self.inner.find_one(collection, key).await;
        self.record(Op::Read, 1, start.elapsed(), result).await
    }

    async fn find_one_field(
        &self,
        collection: &str,
        key: &str,
        field: &str,
    ) -> Result<Option<Value>, StorageError> {
        let start = Instant::now();
        let result = self.inner.find_one_field(collection, key, field).await;
        self.record(Op::Read, 1, start.elapsed(), result).await
    }

    async fn find_many(
        &self,
        collection: &str,
        keys: &[String],
    ) -> Result<Vec<Option<Value>>, StorageError> {
        let start = Instant::now();
        let result = self.inner.find_many(collection, keys).await;
        self.record(Op::Read, keys.len() as u64, start.elapsed(), result)
            .await
    }

    async fn insert_one(&self, collection: &str, record: &SingleInsert) -> Result<(), StorageError> {
        let start = Instant::now();
        let result = self.inner.insert_one(collection, record).await;
        self.record(Op::Write, 1, start.elapsed(), result).await
    }

    async fn insert_many(
        &self,
        collection: &str,
        records: &[SingleInsert],
    ) -> Result<(), StorageError> {
        let start = Instant::now();
        let result = self.inner.insert_many(collection, records).await;
        self.record(Op::Write, records.len() as u64, start.elapsed(), result)
            .await
    }

    async fn insert_one_hash(&self, record: &HashInsert) -> Result<(), StorageError> {
        let start = Instant::now();
        let result = self.inner.insert_one_hash(record).await;
        self.record(Op::Write, 1, start.elapsed(), result).await
    }

    async fn hash_set(
        &self,
        key: &str,
        fields: &HashFields,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        let start = Instant::now();
        let result = self.inner.hash_set(key, fields, ttl).await;
        self.record(Op::Write, 1, start.elapsed(), result).await
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Value>, StorageError> {
        let start = Instant::now();
        let result = self.inner.hash_get(key, field).await;
        self.record(Op::Read, 1, start.elapsed(), result).await
    }

    async fn update_one(
        &self,
        collection: &str,
        key: &str,
        update: &Value,
    ) -> Result<(), StorageError> {
        self.inner.update_one(collection, key, update).await
    }

    async fn update_many(
        &self,
        collection: &str,
        keys: &[String],
        update: &Value,
    ) -> Result<(), StorageError> {
        self.inner.update_many(collection, keys, update).await
    }

    async fn close(&self) {
        self.inner.close().await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

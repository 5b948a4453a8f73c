// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Concurrent hash operation driver.
//
// Bulk hash inserts and lookups are split into fixed-size batches and each
// batch is handed to its own tokio task. Every worker walks its batch in
// order against the shared adapter; the driver waits for all of them, puts
// each outcome in the slot for its batch index and only then decides the
// result. Either every batch succeeded and the partial results are joined in
// submission order, or the caller gets a `MultiError` naming every failed
// batch. There are no retries.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::adapter::StoreAdapter;
use crate::batch::{batch, DEFAULT_BATCH_SIZE};
use crate::error::{BatchFailure, StorageError};
use crate::record::{HashInsert, HashLookup};

/// Fans bulk hash operations out over one task per batch.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use polystore::adapter::StoreAdapter;
/// use polystore::driver::HashDriver;
/// use polystore::memory::InMemoryStore;
/// use polystore::record::{HashInsert, HashLookup};
/// use serde_json::json;
/// use tokio_util::sync::CancellationToken;
///
/// # tokio_test::block_on(async {
/// let store = Arc::new(InMemoryStore::new());
/// store.connect().await.unwrap();
///
/// let driver = HashDriver::new(store).with_batch_size(2);
/// let cancel = CancellationToken::new();
///
/// let inserts = (0..5)
///     .map(|i| HashInsert::new("users", i.to_string()).field("n", json!(i)))
///     .collect();
/// driver.insert_many(inserts, &cancel).await.unwrap();
///
/// let lookups = (0..5)
///     .map(|i| HashLookup::new("users", i.to_string(), "n"))
///     .collect();
/// let values = driver.find_many(lookups, &cancel).await.unwrap();
/// assert_eq!(values[4], Some(json!(4)));
/// # });
/// ```
#[derive(Clone)]
pub struct HashDriver {
    adapter: Arc<dyn StoreAdapter>,
    batch_size: usize,
}

impl HashDriver {
    /// Create a driver over `adapter` with the default batch size.
    pub fn new(adapter: Arc<dyn StoreAdapter>) -> Self {
        Self {
            adapter,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set the number of entries each worker handles. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// The adapter every worker writes through.
    pub fn adapter(&self) -> &Arc<dyn StoreAdapter> {
        &self.adapter
    }

    /// Write every hash record, one worker per batch.
    pub async fn insert_many(
        &self,
        entries: Vec<HashInsert>,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        self.fan_out("insert_many", entries, cancel, |adapter, entry: HashInsert| async move {
            adapter.insert_one_hash(&entry).await
        })
        .await
        .map(|_| ())
    }

    /// Read one field per entry. The result is aligned with `entries`.
    pub async fn find_many(
        &self,
        entries: Vec<HashLookup>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Option<Value>>, StorageError> {
        self.fan_out("find_many", entries, cancel, |adapter, entry: HashLookup| async move {
            adapter.hash_get(&entry.composite_key(), &entry.field).await
        })
        .await
    }

    /// Like [`HashDriver::insert_many`] for untyped entries.
    ///
    /// Each entry is decoded inside its worker; an entry that does not
    /// decode stops that batch with a `Decode` error.
    pub async fn insert_many_raw(
        &self,
        entries: Vec<Value>,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        self.fan_out("insert_many_raw", entries, cancel, |adapter, entry: Value| async move {
            let record = HashInsert::from_value(&entry)?;
            adapter.insert_one_hash(&record).await
        })
        .await
        .map(|_| ())
    }

    /// Like [`HashDriver::find_many`] for untyped entries.
    pub async fn find_many_raw(
        &self,
        entries: Vec<Value>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Option<Value>>, StorageError> {
        self.fan_out("find_many_raw", entries, cancel, |adapter, entry: Value| async move {
            let lookup = HashLookup::from_value(&entry)?;
            adapter.hash_get(&lookup.composite_key(), &lookup.field).await
        })
        .await
    }

    async fn fan_out<T, R, F, Fut>(
        &self,
        operation: &'static str,
        entries: Vec<T>,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<Vec<R>, StorageError>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(Arc<dyn StoreAdapter>, T) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<R, StorageError>> + Send,
    {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let total = entries.len();
        let batches = batch(entries, self.batch_size);
        let batch_count = batches.len();
        debug!(
            store = self.adapter.name(),
            operation,
            entries = total,
            batches = batch_count,
            "dispatching hash workers"
        );

        let mut workers = JoinSet::new();
        for (index, chunk) in batches.into_iter().enumerate() {
            let adapter = Arc::clone(&self.adapter);
            let cancel = cancel.clone();
            let op = op.clone();
            workers.spawn(async move { (index, run_batch(adapter, chunk, &cancel, op).await) });
        }

        let mut slots: Vec<Option<Result<Vec<R>, StorageError>>> =
            std::iter::repeat_with(|| None).take(batch_count).collect();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(err) => warn!(operation, error = %err, "hash worker did not complete"),
            }
        }

        let mut results = Vec::with_capacity(total);
        let mut failures = Vec::new();
        let mut succeeded = 0;
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(Ok(partial)) => {
                    succeeded += 1;
                    results.extend(partial);
                }
                Some(Err(error)) => failures.push(BatchFailure {
                    batch: index,
                    error,
                }),
                // The worker panicked before reporting.
                None => failures.push(BatchFailure {
                    batch: index,
                    error: StorageError::Backend("worker panicked".to_string()),
                }),
            }
        }

        if failures.is_empty() {
            return Ok(results);
        }
        warn!(
            store = self.adapter.name(),
            operation,
            failed = failures.len(),
            succeeded,
            "hash workers failed"
        );
        Err(StorageError::MultiError {
            failures,
            succeeded,
        })
    }
}

async fn run_batch<T, R, F, Fut>(
    adapter: Arc<dyn StoreAdapter>,
    chunk: Vec<T>,
    cancel: &CancellationToken,
    op: F,
) -> Result<Vec<R>, StorageError>
where
    F: Fn(Arc<dyn StoreAdapter>, T) -> Fut,
    Fut: Future<Output = Result<R, StorageError>>,
{
    let mut partial = Vec::with_capacity(chunk.len());
    for entry in chunk {
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        partial.push(op(Arc::clone(&adapter), entry).await?);
    }
    Ok(partial)
}

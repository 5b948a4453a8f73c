// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Polystore: one storage interface over document, key-value and record stores
//
// Applications describe a backend with a `StoreConfig`, get an adapter from
// the factory and then talk to every store through the same `StoreAdapter`
// operations. Bulk hash work goes through the `HashDriver`, which fans
// batches out over tokio tasks and fails with a `MultiError` only after
// every worker has finished.
//
// # Modules
//
// - [`adapter`] -- The `StoreAdapter` trait every backend implements.
// - [`batch`] -- Order-preserving batching.
// - [`config`] -- Store descriptors, store-type tags and env loading.
// - [`driver`] -- The concurrent hash operation driver.
// - [`error`] -- The `StorageError` enum and per-batch failures.
// - [`factory`] -- Descriptor to adapter dispatch.
// - [`key`] -- Composite key formatting.
// - [`memory`] -- An in-memory adapter for tests and benchmarks.
// - [`metrics`] -- A transparent wrapper that collects operation statistics.
// - [`record`] -- Operation records and the strict untyped decoder.
//
// # Example
//
// ```rust
// use std::sync::Arc;
//
// use polystore::{HashDriver, HashInsert, HashLookup, InMemoryStore, MetricsStore, StoreAdapter};
// use serde_json::json;
// use tokio_util::sync::CancellationToken;
//
// # tokio_test::block_on(async {
// let store = Arc::new(MetricsStore::new(InMemoryStore::new()));
// store.connect().await.unwrap();
//
// let driver = HashDriver::new(store.clone()).with_batch_size(10);
// let cancel = CancellationToken::new();
// driver
//     .insert_many(vec![HashInsert::new("users", "1").field("name", json!("Ada"))], &cancel)
//     .await
//     .unwrap();
//
// let names = driver
//     .find_many(vec![HashLookup::new("users", "1", "name")], &cancel)
//     .await
//     .unwrap();
// assert_eq!(names, vec![Some(json!("Ada"))]);
// assert_eq!(store.stats().await.write_count, 1);
// # });
// ```

pub mod adapter;
pub mod batch;
pub mod config;
pub mod driver;
pub mod error;
pub mod factory;
pub mod key;
pub mod memory;
pub mod metrics;
pub mod record;

// Backend adapters, each behind its own default-on feature.
#[cfg(feature = "document-store")]
pub mod mongo_store;
#[cfg(feature = "record-store")]
pub mod record_store;
#[cfg(feature = "key-value-store")]
pub mod redis_store;

// Re-export the most commonly used types at the crate root for convenience.
pub use adapter::StoreAdapter;
pub use batch::{batch, DEFAULT_BATCH_SIZE};
pub use config::{StoreConfig, StoreTag, StoreType};
pub use driver::HashDriver;
pub use error::{BatchFailure, StorageError};
pub use factory::{new_store, new_store_from_value};
pub use key::format_key;
pub use memory::InMemoryStore;
pub use metrics::{MetricsStore, StoreStats};
pub use record::{decode, HashFields, HashInsert, HashLookup, OperationKind, OperationRecord, SingleInsert};

#[cfg(feature = "document-store")]
pub use mongo_store::MongoStore;
#[cfg(feature = "record-store")]
pub use record_store::RecordStore;
#[cfg(feature = "key-value-store")]
pub use redis_store::RedisStore;

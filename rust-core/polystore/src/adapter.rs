// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Uniform adapter trait for Polystore backends.
//
// Every store type (document, key-value, record) implements `StoreAdapter`.
// The trait mirrors the operations applications perform against any backend:
// key lookups and multi-gets, single and bulk inserts with expiry, and the
// hash primitives used by the concurrent hash driver. Adapters own exactly
// one connection handle, which must tolerate concurrent use by the driver's
// workers.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageError;
use crate::key::format_key;
use crate::record::{HashFields, HashInsert, SingleInsert};

/// A backend adapter translating the uniform operation set into one store's
/// native calls.
///
/// Plain values are addressed by `(collection, key)`; hashes are addressed by
/// their composite key (see [`crate::key::format_key`]). Absent keys are
/// `Ok(None)`, never an error.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Establish and health-check the connection.
    ///
    /// Must be called before any other operation.
    async fn connect(&self) -> Result<(), StorageError>;

    /// Retrieve the value stored at `collection:key`.
    async fn find_one(&self, collection: &str, key: &str) -> Result<Option<Value>, StorageError>;

    /// Retrieve one field of the hash stored at `collection:key`.
    async fn find_one_field(
        &self,
        collection: &str,
        key: &str,
        field: &str,
    ) -> Result<Option<Value>, StorageError> {
        self.hash_get(&format_key(collection, key), field).await
    }

    /// Retrieve several keys of one collection.
    ///
    /// The result has the same length and order as `keys`, with `None` for
    /// every key that is absent.
    async fn find_many(
        &self,
        collection: &str,
        keys: &[String],
    ) -> Result<Vec<Option<Value>>, StorageError>;

    /// Store one value, replacing any previous value for the key.
    async fn insert_one(&self, collection: &str, record: &SingleInsert) -> Result<(), StorageError>;

    /// Store several values, then apply their expirations.
    ///
    /// If the bulk write fails no expirations are applied. If applying an
    /// expiration fails the error is returned and the writes stay in place.
    async fn insert_many(
        &self,
        collection: &str,
        records: &[SingleInsert],
    ) -> Result<(), StorageError>;

    /// Write one hash record with its expiry.
    async fn insert_one_hash(&self, record: &HashInsert) -> Result<(), StorageError> {
        self.hash_set(&record.composite_key(), &record.fields, record.ttl)
            .await
    }

    /// Set `fields` on the hash stored at the composite `key`.
    ///
    /// Existing fields not named in `fields` are kept. A `ttl` resets the
    /// expiry of the whole hash.
    async fn hash_set(
        &self,
        key: &str,
        fields: &HashFields,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError>;

    /// Read one field of the hash stored at the composite `key`.
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Value>, StorageError>;

    /// Field- or document-level updates are not implemented by any adapter.
    async fn update_one(
        &self,
        _collection: &str,
        _key: &str,
        _update: &Value,
    ) -> Result<(), StorageError> {
        Err(StorageError::Unsupported("update_one"))
    }

    /// See [`StoreAdapter::update_one`].
    async fn update_many(
        &self,
        _collection: &str,
        _keys: &[String],
        _update: &Value,
    ) -> Result<(), StorageError> {
        Err(StorageError::Unsupported("update_many"))
    }

    /// Release the connection. Calling this on a closed adapter is a no-op.
    async fn close(&self);

    /// A human-readable name for this adapter, used in logging.
    fn name(&self) -> &str;
}

// SPDX-License-Identifier: PMPL-1.0-or-later
//! Property-based tests for batching, key formatting and the hash driver

use std::sync::Arc;

use polystore::{
    batch, format_key, HashDriver, HashInsert, HashLookup, InMemoryStore, StoreAdapter,
};
use proptest::prelude::*;
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// Generate arbitrary collection names
fn arb_collection() -> impl Strategy<Value = String> {
    "[a-z]{1,12}"
}

/// Generate arbitrary sub-keys, including the empty one
fn arb_subkey() -> impl Strategy<Value = String> {
    "[a-z0-9:]{0,12}"
}

proptest! {
    #[test]
    fn test_batches_concatenate_to_input(
        items in prop::collection::vec(any::<u32>(), 0..500),
        size in 1usize..150
    ) {
        let batches = batch(items.clone(), size);

        prop_assert_eq!(batches.len(), items.len().div_ceil(size));
        for (i, chunk) in batches.iter().enumerate() {
            prop_assert!(!chunk.is_empty());
            if i + 1 < batches.len() {
                prop_assert_eq!(chunk.len(), size);
            } else {
                prop_assert!(chunk.len() <= size);
            }
        }
        let joined: Vec<u32> = batches.into_iter().flatten().collect();
        prop_assert_eq!(joined, items);
    }

    #[test]
    fn test_format_key_prefixes_collection(
        collection in arb_collection(),
        subkey in arb_subkey()
    ) {
        let key = format_key(&collection, &subkey);
        if subkey.is_empty() {
            prop_assert_eq!(key, collection);
        } else {
            prop_assert_eq!(key, format!("{collection}:{subkey}"));
        }
    }

    #[test]
    fn test_driver_lookup_is_aligned_with_input(
        present in prop::collection::vec(any::<bool>(), 0..120),
        batch_size in 1usize..40
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let store = Arc::new(InMemoryStore::new());
            store.connect().await.unwrap();
            let driver = HashDriver::new(store.clone()).with_batch_size(batch_size);
            let cancel = CancellationToken::new();

            let writes: Vec<HashInsert> = present
                .iter()
                .enumerate()
                .filter(|(_, keep)| **keep)
                .map(|(i, _)| HashInsert::new("p", i.to_string()).field("i", json!(i)))
                .collect();
            driver.insert_many(writes, &cancel).await.unwrap();

            let reads: Vec<HashLookup> = (0..present.len())
                .map(|i| HashLookup::new("p", i.to_string(), "i"))
                .collect();
            let values = driver.find_many(reads, &cancel).await.unwrap();

            prop_assert_eq!(values.len(), present.len());
            for (i, (value, keep)) in values.iter().zip(&present).enumerate() {
                let expected = keep.then(|| json!(i));
                prop_assert_eq!(value, &expected);
            }

            Ok(())
        })?;
    }
}

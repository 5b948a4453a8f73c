// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Composite key formatting.

/// Separator placed between a collection name and its sub-key.
pub const KEY_SEPARATOR: char = ':';

/// Build the composite lookup key for `subkey` inside `collection`.
///
/// An empty `subkey` addresses the collection itself, so the collection name
/// is returned unchanged.
///
/// ```rust
/// use polystore::key::format_key;
///
/// assert_eq!(format_key("orders", ""), "orders");
/// assert_eq!(format_key("orders", "42"), "orders:42");
/// ```
pub fn format_key(collection: &str, subkey: &str) -> String {
    if subkey.is_empty() {
        return collection.to_string();
    }
    let mut key = String::with_capacity(collection.len() + 1 + subkey.len());
    key.push_str(collection);
    key.push(KEY_SEPARATOR);
    key.push_str(subkey);
    key
}

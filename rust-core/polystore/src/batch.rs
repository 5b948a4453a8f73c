// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Order-preserving batching for parallel dispatch.

/// Batch size used by [`crate::driver::HashDriver`] unless overridden.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Split `items` into consecutive chunks of at most `size` elements.
///
/// The final chunk may be shorter. Empty input yields no batches, and
/// concatenating the batches reproduces `items` in order. A `size` of zero is
/// treated as one.
///
/// ```rust
/// use polystore::batch::batch;
///
/// let batches = batch((1..=250).collect::<Vec<_>>(), 100);
/// let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
/// assert_eq!(sizes, vec![100, 100, 50]);
/// ```
pub fn batch<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    let mut batches = Vec::with_capacity(items.len().div_ceil(size));
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        batches.push(iter.by_ref().take(size).collect());
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uneven_split() {
        let batches = batch((1..=250).collect::<Vec<u32>>(), 100);
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
        assert_eq!(batches[2].first(), Some(&201));
        assert_eq!(batches[2].last(), Some(&250));
    }

    #[test]
    fn test_empty_input() {
        let batches: Vec<Vec<u8>> = batch(Vec::new(), 100);
        assert!(batches.is_empty());
    }

    #[test]
    fn test_exact_multiple() {
        let batches = batch((0..6).collect::<Vec<_>>(), 3);
        assert_eq!(batches, vec![vec![0, 1, 2], vec![3, 4, 5]]);
    }

    #[test]
    fn test_size_larger_than_input() {
        let batches = batch(vec!["a", "b"], 100);
        assert_eq!(batches, vec![vec!["a", "b"]]);
    }

    #[test]
    fn test_zero_size_behaves_as_one() {
        let batches = batch(vec![1, 2, 3], 0);
        assert_eq!(batches, vec![vec![1], vec![2], vec![3]]);
    }
}

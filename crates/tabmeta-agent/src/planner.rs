//! Batch planning

use std::collections::BTreeSet;

/// The next columns to ask about.
///
/// Up to `batch_size` names from `all \ processed`, in lexicographic order.
/// An empty result means every column is covered.
pub fn next_batch(
    all: &BTreeSet<String>,
    processed: &BTreeSet<String>,
    batch_size: usize,
) -> Vec<String> {
    let mut remaining: Vec<&String> = all.difference(processed).collect();
    remaining.sort();
    remaining
        .into_iter()
        .take(batch_size.max(1))
        .cloned()
        .collect()
}

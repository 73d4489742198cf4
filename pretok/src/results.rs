//! Output types of the pipeline.
//!
//! The frequency table is the contract with the downstream BPE trainer:
//! each key is the raw UTF-8 encoding of one whole pattern match, never a
//! tuple of per-byte symbols. The trainer splits keys into byte symbols on
//! its side.
use ahash::AHashMap;
use std::collections::hash_map;

use crate::metrics::PipelineStats;

/// Maps each distinct pre-token (as bytes) to its number of occurrences.
///
/// Merging is pointwise addition, so the result of folding any number of
/// partial tables does not depend on the order they arrive in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyTable {
    counts: AHashMap<Vec<u8>, u64>,
}

impl FrequencyTable {
    /// Creates a new empty table
    pub fn new() -> Self {
        Default::default()
    }

    /// Counts one occurrence of `pre_token`
    pub fn record(&mut self, pre_token: &[u8]) {
        self.add(pre_token, 1);
    }

    /// Adds `count` occurrences of `pre_token`
    pub fn add(&mut self, pre_token: &[u8], count: u64) {
        // Avoid allocating a key for pre-tokens we have already seen.
        if let Some(existing) = self.counts.get_mut(pre_token) {
            *existing += count;
        } else {
            self.counts.insert(pre_token.to_vec(), count);
        }
    }

    /// Folds another table into this one by summing counts per key
    pub fn merge(&mut self, other: FrequencyTable) {
        if self.counts.is_empty() {
            self.counts = other.counts;
            return;
        }
        for (pre_token, count) in other.counts {
            *self.counts.entry(pre_token).or_default() += count;
        }
    }

    /// Number of occurrences of `pre_token`, zero if never seen
    pub fn get(&self, pre_token: &[u8]) -> u64 {
        self.counts.get(pre_token).copied().unwrap_or(0)
    }

    /// Number of distinct pre-tokens
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all counts
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], u64)> {
        self.counts.iter().map(|(k, &v)| (k.as_slice(), v))
    }

    /// The `n` most frequent pre-tokens, ties broken by byte order
    pub fn most_common(&self, n: usize) -> Vec<(&[u8], u64)> {
        let mut entries: Vec<(&[u8], u64)> = self.iter().collect();
        entries.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries.truncate(n);
        entries
    }

    /// Releases the underlying map
    pub fn into_inner(self) -> AHashMap<Vec<u8>, u64> {
        self.counts
    }
}

impl IntoIterator for FrequencyTable {
    type Item = (Vec<u8>, u64);
    type IntoIter = hash_map::IntoIter<Vec<u8>, u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.counts.into_iter()
    }
}

impl FromIterator<(Vec<u8>, u64)> for FrequencyTable {
    fn from_iter<I: IntoIterator<Item = (Vec<u8>, u64)>>(iter: I) -> Self {
        let mut table = FrequencyTable::new();
        for (pre_token, count) in iter {
            table.add(&pre_token, count);
        }
        table
    }
}

/// Everything a full pipeline run produces
#[derive(Debug, Clone)]
pub struct PretokOutput {
    /// The merged frequency table
    pub table: FrequencyTable,
    /// The refined chunk boundaries the run used
    pub boundaries: Vec<u64>,
    /// Size of the corpus in bytes
    pub file_size: u64,
    /// Counter snapshot taken after the merge
    pub stats: PipelineStats,
}

impl PretokOutput {
    /// Number of chunks the corpus was split into
    pub fn chunk_count(&self) -> usize {
        self.boundaries.len().saturating_sub(1)
    }
}

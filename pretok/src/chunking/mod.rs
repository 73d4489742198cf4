//! Splitting a corpus into byte ranges that can be scanned independently.
//!
//! Chunk boundaries are first placed uniformly, then each interior boundary
//! is moved forward onto the start of the next delimiter occurrence. Since a
//! delimiter always forces a document break, no pre-token and no multi-byte
//! character can straddle two chunks, so every chunk decodes and scans the
//! same way it would inside the whole file.
pub mod planner;
pub mod scanner;

use crate::errors::{PretokError, PretokResult};

pub use planner::{initial_boundaries, BoundaryPlanner};
pub use scanner::{refine_boundaries, DelimiterScanner};

/// Half-open byte range `[start, end)` of the corpus assigned to one worker task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkInterval {
    pub start: u64,
    pub end: u64,
}

impl ChunkInterval {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "interval start after end");
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Turns a boundary list into the intervals between consecutive boundaries
pub fn intervals(boundaries: &[u64]) -> Vec<ChunkInterval> {
    boundaries
        .windows(2)
        .map(|pair| ChunkInterval::new(pair[0], pair[1]))
        .collect()
}

/// Checks that `boundaries` partitions a corpus of `file_sz` bytes: starts at
/// 0, ends at `file_sz`, strictly increasing. An empty corpus is `[0]`.
pub fn check_boundaries(boundaries: &[u64], file_sz: u64) -> PretokResult<()> {
    match (boundaries.first(), boundaries.last()) {
        (Some(&0), Some(&last)) if last == file_sz => {}
        (Some(&first), Some(&last)) => {
            return Err(PretokError::invalid_boundaries(format!(
                "expected a list from 0 to {}, got {}..{}",
                file_sz, first, last
            )))
        }
        _ => return Err(PretokError::invalid_boundaries("boundary list is empty")),
    }
    if let Some(pair) = boundaries.windows(2).find(|pair| pair[0] >= pair[1]) {
        return Err(PretokError::invalid_boundaries(format!(
            "not strictly increasing at {} -> {}",
            pair[0], pair[1]
        )));
    }
    Ok(())
}

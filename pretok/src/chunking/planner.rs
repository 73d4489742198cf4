use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use tracing::debug;

use super::scanner::DelimiterScanner;
use crate::config::{ChunkingPolicy, DEFAULT_LOOKAHEAD_WINDOW};
use crate::errors::{PretokError, PretokResult};
use crate::metrics::PipelineMetrics;

/// Uniformly spaced candidate offsets `[0, size, 2*size, …, file_sz]` with
/// `size = ceil(file_sz / num_chunks)`. The last entry is always `file_sz`.
pub fn initial_boundaries(file_sz: u64, num_chunks: usize) -> Vec<u64> {
    let num_chunks = num_chunks.max(1) as u64;
    let chunk_size = file_sz.div_ceil(num_chunks);
    let mut boundaries: Vec<u64> = (0..=num_chunks)
        .map(|i| i.saturating_mul(chunk_size).min(file_sz))
        .collect();
    if let Some(last) = boundaries.last_mut() {
        *last = file_sz;
    }
    boundaries
}

/// Produces the final boundary list for a corpus: uniform candidates from
/// the chunking policy, aligned onto the split delimiter.
#[derive(Debug, Clone)]
pub struct BoundaryPlanner {
    policy: ChunkingPolicy,
    lookahead_window: usize,
    metrics: PipelineMetrics,
}

impl BoundaryPlanner {
    pub fn new(policy: ChunkingPolicy) -> Self {
        Self {
            policy,
            lookahead_window: DEFAULT_LOOKAHEAD_WINDOW,
            metrics: PipelineMetrics::new(),
        }
    }

    pub fn with_lookahead_window(mut self, window: usize) -> Self {
        self.lookahead_window = window;
        self
    }

    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn policy(&self) -> ChunkingPolicy {
        self.policy
    }

    /// Plans boundaries over an already open source of `file_sz` bytes
    pub fn plan<R: Read + Seek>(
        &self,
        source: &mut R,
        file_sz: u64,
        worker_count: usize,
        delimiter: &[u8],
    ) -> std::io::Result<Vec<u64>> {
        let num_chunks = self.policy.num_chunks(file_sz, worker_count);
        let candidates = initial_boundaries(file_sz, num_chunks);
        let scanner =
            DelimiterScanner::with_metrics(delimiter, self.lookahead_window, self.metrics.clone());
        let boundaries = scanner.refine(source, file_sz, &candidates)?;

        debug!(
            "Planned {} chunks for {} bytes ({} requested)",
            boundaries.len().saturating_sub(1),
            file_sz,
            num_chunks
        );
        Ok(boundaries)
    }

    /// Opens `path` and plans its boundaries
    pub fn plan_file(
        &self,
        path: &Path,
        file_sz: u64,
        worker_count: usize,
        delimiter: &[u8],
    ) -> PretokResult<Vec<u64>> {
        let mut file = File::open(path).map_err(|e| PretokError::from_io(e, path))?;
        self.plan(&mut file, file_sz, worker_count, delimiter)
            .map_err(|e| PretokError::from_io(e, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    #[test]
    fn test_initial_boundaries_are_uniform() {
        assert_eq!(initial_boundaries(100, 4), vec![0, 25, 50, 75, 100]);
        // ceil(10 / 3) = 4, last forced to file_sz
        assert_eq!(initial_boundaries(10, 3), vec![0, 4, 8, 10]);
    }

    #[test]
    fn test_initial_boundaries_more_chunks_than_bytes() {
        let b = initial_boundaries(3, 8);
        assert_eq!(b.len(), 9);
        assert_eq!(b[0], 0);
        assert_eq!(*b.last().unwrap(), 3);
        assert!(b.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_initial_boundaries_empty_file() {
        assert!(initial_boundaries(0, 4).iter().all(|&b| b == 0));
        assert_eq!(initial_boundaries(0, 0), vec![0, 0]);
    }

    #[test]
    fn test_plan_aligns_to_delimiter() {
        let doc = "some words here|";
        let corpus = doc.repeat(50);
        let file_sz = corpus.len() as u64;
        let planner = BoundaryPlanner::new(ChunkingPolicy::Fixed {
            chunks: 7,
            large_file_chunks: 7,
            large_file_threshold: u64::MAX,
        });

        let boundaries = planner
            .plan(&mut Cursor::new(corpus.as_bytes()), file_sz, 1, b"|")
            .unwrap();

        assert_eq!(boundaries[0], 0);
        assert_eq!(*boundaries.last().unwrap(), file_sz);
        for &b in &boundaries[1..boundaries.len() - 1] {
            assert_eq!(corpus.as_bytes()[b as usize], b'|');
        }
        assert!(boundaries.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_plan_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", "abc<|endoftext|>".repeat(100)).unwrap();
        file.flush().unwrap();
        let file_sz = 1600;

        let planner = BoundaryPlanner::new(ChunkingPolicy::Oversubscribe { factor: 2 })
            .with_lookahead_window(32);
        let boundaries = planner
            .plan_file(file.path(), file_sz, 4, b"<|endoftext|>")
            .unwrap();

        // 8 candidates 200 bytes apart; each snaps forward to the next
        // delimiter, and every delimiter starts at 16*m + 3
        assert_eq!(boundaries.len(), 9);
        for &b in &boundaries[1..8] {
            assert_eq!(b % 16, 3);
        }
    }

    #[test]
    fn test_plan_file_missing() {
        let planner = BoundaryPlanner::new(ChunkingPolicy::Oversubscribe { factor: 8 });
        let result = planner.plan_file(Path::new("does/not/exist.txt"), 10, 1, b"|");
        assert!(matches!(result, Err(PretokError::FileNotFound(_))));
    }
}

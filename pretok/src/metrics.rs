use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Tracks I/O volume and throughput counters for a pipeline run.
///
/// Clones share the same counters, so the orchestrator can hand a clone to
/// each component and read the totals afterwards. Workers only ever add to
/// these counters; they never touch the frequency accumulator.
#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    // I/O volume
    bytes_read: Arc<AtomicU64>,
    boundary_bytes_scanned: Arc<AtomicU64>,

    // Work counters
    chunks_processed: Arc<AtomicU64>,
    documents_seen: Arc<AtomicU64>,
    matches_counted: Arc<AtomicU64>,
    lossy_chunks: Arc<AtomicU64>,
}

impl PipelineMetrics {
    /// Creates a new PipelineMetrics instance
    pub fn new() -> Self {
        Self {
            bytes_read: Arc::new(AtomicU64::new(0)),
            boundary_bytes_scanned: Arc::new(AtomicU64::new(0)),
            chunks_processed: Arc::new(AtomicU64::new(0)),
            documents_seen: Arc::new(AtomicU64::new(0)),
            matches_counted: Arc::new(AtomicU64::new(0)),
            lossy_chunks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records bytes read while looking for a delimiter near a boundary
    pub fn record_boundary_scan(&self, bytes: u64) {
        let total = self.boundary_bytes_scanned.fetch_add(bytes, Ordering::Relaxed) + bytes;
        debug!(
            "Boundary scan read {} bytes, total scanned: {} bytes",
            bytes, total
        );
    }

    /// Records one finished chunk
    pub fn record_chunk(&self, bytes: u64, documents: u64, matches: u64) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
        self.documents_seen.fetch_add(documents, Ordering::Relaxed);
        self.matches_counted.fetch_add(matches, Ordering::Relaxed);
        self.chunks_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a chunk that contained invalid UTF-8
    pub fn record_lossy_chunk(&self) {
        self.lossy_chunks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    pub fn chunks_processed(&self) -> u64 {
        self.chunks_processed.load(Ordering::Relaxed)
    }

    /// Gets a snapshot of the current counters
    pub fn get_stats(&self) -> PipelineStats {
        PipelineStats {
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            boundary_bytes_scanned: self.boundary_bytes_scanned.load(Ordering::Relaxed),
            chunks_processed: self.chunks_processed.load(Ordering::Relaxed),
            documents_seen: self.documents_seen.load(Ordering::Relaxed),
            matches_counted: self.matches_counted.load(Ordering::Relaxed),
            lossy_chunks: self.lossy_chunks.load(Ordering::Relaxed),
        }
    }

    /// Logs the current counters
    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Pipeline stats:\n\
             Bytes read by workers: {} bytes\n\
             Bytes scanned for boundaries: {} bytes\n\
             Chunks processed: {}\n\
             Documents/matches: {}/{}\n\
             Chunks with invalid UTF-8: {}",
            stats.bytes_read,
            stats.boundary_bytes_scanned,
            stats.chunks_processed,
            stats.documents_seen,
            stats.matches_counted,
            stats.lossy_chunks
        );
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`PipelineMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub bytes_read: u64,
    pub boundary_bytes_scanned: u64,
    pub chunks_processed: u64,
    pub documents_seen: u64,
    pub matches_counted: u64,
    pub lossy_chunks: u64,
}

use memchr::memmem::Finder;
use std::io::{self, Read, Seek, SeekFrom};
use tracing::{trace, warn};

use crate::config::DEFAULT_LOOKAHEAD_WINDOW;
use crate::metrics::PipelineMetrics;

/// Snaps candidate chunk boundaries onto delimiter occurrences.
///
/// NOTE: this assumes the delimiter is frequent enough in the corpus that a
/// search from any candidate finds one soon. There is no cap on how far a
/// search runs; a rare delimiter means scanning toward the end of the file
/// for every boundary, and a very large final chunk.
#[derive(Debug, Clone)]
pub struct DelimiterScanner<'d> {
    finder: Finder<'d>,
    window: usize,
    metrics: PipelineMetrics,
}

impl<'d> DelimiterScanner<'d> {
    /// Creates a scanner that reads `window` bytes per step
    pub fn new(delimiter: &'d [u8], window: usize) -> Self {
        Self::with_metrics(delimiter, window, PipelineMetrics::new())
    }

    /// Creates a scanner that reports scanned bytes to `metrics`
    pub fn with_metrics(delimiter: &'d [u8], window: usize, metrics: PipelineMetrics) -> Self {
        Self {
            finder: Finder::new(delimiter),
            window: window.max(1),
            metrics,
        }
    }

    pub fn delimiter(&self) -> &[u8] {
        self.finder.needle()
    }

    /// Offset of the first delimiter occurrence starting at or after `from`,
    /// or `file_sz` when there is none.
    pub fn find_next<R: Read + Seek>(
        &self,
        source: &mut R,
        from: u64,
        file_sz: u64,
    ) -> io::Result<u64> {
        let needle_len = self.finder.needle().len();
        if needle_len == 0 || from >= file_sz {
            return Ok(from.min(file_sz));
        }

        // Consecutive windows overlap by needle_len - 1 bytes so an occurrence
        // crossing a window edge is still found at its true start.
        let keep = needle_len - 1;
        let mut buf = vec![0u8; self.window + keep];
        let mut window_start = from;
        let mut carried = 0usize;
        let mut scanned = 0u64;

        source.seek(SeekFrom::Start(from))?;
        let found = loop {
            let read = fill(source, &mut buf[carried..])?;
            scanned += read as u64;
            let filled = carried + read;
            trace!(
                "Scanning {} bytes at offset {} for delimiter",
                filled,
                window_start
            );

            if let Some(i) = self.finder.find(&buf[..filled]) {
                break (window_start + i as u64).min(file_sz);
            }
            if filled < buf.len() {
                // EOF without a match
                break file_sz;
            }

            let advance = filled - keep;
            buf.copy_within(advance..filled, 0);
            window_start += advance as u64;
            carried = keep;
        };

        self.metrics.record_boundary_scan(scanned);
        Ok(found)
    }

    /// Aligns every interior candidate to the nearest following delimiter
    /// occurrence, then returns the sorted, deduplicated boundary list.
    ///
    /// The result always starts at 0 and ends at `file_sz`; for an empty
    /// file it is `[0]`. A candidate already at a delimiter start stays put,
    /// so refining an aligned list returns it unchanged.
    pub fn refine<R: Read + Seek>(
        &self,
        source: &mut R,
        file_sz: u64,
        candidates: &[u64],
    ) -> io::Result<Vec<u64>> {
        let interior = if candidates.len() > 2 {
            &candidates[1..candidates.len() - 1]
        } else {
            &[][..]
        };

        let mut boundaries = Vec::with_capacity(interior.len() + 2);
        boundaries.push(0);

        if self.finder.needle().is_empty() {
            if !interior.is_empty() {
                warn!("Empty split delimiter; cannot align boundaries, using a single chunk");
            }
        } else {
            for &candidate in interior {
                boundaries.push(self.find_next(source, candidate, file_sz)?);
            }
        }

        boundaries.push(file_sz);
        boundaries.sort_unstable();
        boundaries.dedup();
        Ok(boundaries)
    }
}

/// Aligns `chunk_boundaries` to the start of `split_special_token` using the
/// default look-ahead window.
pub fn refine_boundaries<R: Read + Seek>(
    source: &mut R,
    file_sz: u64,
    chunk_boundaries: &[u64],
    split_special_token: &[u8],
) -> io::Result<Vec<u64>> {
    DelimiterScanner::new(split_special_token, DEFAULT_LOOKAHEAD_WINDOW).refine(
        source,
        file_sz,
        chunk_boundaries,
    )
}

/// Reads until `buf` is full or the source is exhausted
fn fill<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match source.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

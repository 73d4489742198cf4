use std::borrow::Cow;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

use super::matcher::PatternMatcher;
use crate::chunking::ChunkInterval;
use crate::config::InvalidUtf8;
use crate::errors::{PretokError, PretokResult};
use crate::metrics::PipelineMetrics;
use crate::results::FrequencyTable;

/// Decodes bytes as UTF-8 according to `mode`.
///
/// Valid input is borrowed as-is. Invalid sequences are dropped or replaced
/// with U+FFFD; this never fails. The flag reports whether anything was
/// invalid.
pub fn decode_bytes(bytes: &[u8], mode: InvalidUtf8) -> (Cow<'_, str>, bool) {
    match std::str::from_utf8(bytes) {
        Ok(text) => (Cow::Borrowed(text), false),
        Err(_) => {
            let mut text = String::with_capacity(bytes.len());
            for chunk in bytes.utf8_chunks() {
                text.push_str(chunk.valid());
                if !chunk.invalid().is_empty() && mode == InvalidUtf8::Replace {
                    text.push(char::REPLACEMENT_CHARACTER);
                }
            }
            (Cow::Owned(text), true)
        }
    }
}

/// Scans one byte range of the corpus into a local frequency table.
///
/// A worker holds no open file: every call opens the corpus on its own, so
/// concurrent calls never share a seek position.
#[derive(Debug, Clone)]
pub struct ChunkWorker {
    path: PathBuf,
    matcher: PatternMatcher,
    invalid_utf8: InvalidUtf8,
    metrics: PipelineMetrics,
}

impl ChunkWorker {
    pub fn new(path: impl Into<PathBuf>, matcher: PatternMatcher, invalid_utf8: InvalidUtf8) -> Self {
        Self::with_metrics(path, matcher, invalid_utf8, PipelineMetrics::new())
    }

    pub fn with_metrics(
        path: impl Into<PathBuf>,
        matcher: PatternMatcher,
        invalid_utf8: InvalidUtf8,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            path: path.into(),
            matcher,
            invalid_utf8,
            metrics,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Reads exactly the bytes of `interval`
    pub fn read_interval(&self, interval: ChunkInterval) -> PretokResult<Vec<u8>> {
        let path = self.path.as_path();
        let mut file = File::open(path).map_err(|e| PretokError::from_io(e, path))?;
        file.seek(SeekFrom::Start(interval.start))
            .map_err(|e| PretokError::from_io(e, path))?;

        let expected = interval.len();
        let mut bytes = Vec::with_capacity(expected as usize);
        file.take(expected)
            .read_to_end(&mut bytes)
            .map_err(|e| PretokError::from_io(e, path))?;

        if bytes.len() as u64 != expected {
            return Err(PretokError::short_read(
                path,
                interval.start,
                expected,
                bytes.len() as u64,
            ));
        }
        Ok(bytes)
    }

    /// Reads, decodes, splits and counts one interval
    pub fn process_interval(&self, interval: ChunkInterval) -> PretokResult<FrequencyTable> {
        trace!(
            "Processing chunk [{}, {}) of {}",
            interval.start,
            interval.end,
            self.path.display()
        );

        let bytes = self.read_interval(interval)?;
        let (text, lossy) = decode_bytes(&bytes, self.invalid_utf8);
        if lossy {
            warn!(
                "Invalid UTF-8 in chunk [{}, {}) of {}, decoded with mode {:?}",
                interval.start,
                interval.end,
                self.path.display(),
                self.invalid_utf8
            );
            self.metrics.record_lossy_chunk();
        }

        let mut table = FrequencyTable::new();
        let tally = self.matcher.count_text(&text, &mut table)?;
        self.metrics
            .record_chunk(interval.len(), tally.documents, tally.matches);

        debug!(
            "Chunk [{}, {}) produced {} matches, {} distinct pre-tokens",
            interval.start,
            interval.end,
            tally.matches,
            table.len()
        );
        Ok(table)
    }
}

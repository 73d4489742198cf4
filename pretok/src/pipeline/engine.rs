use indicatif::ProgressBar;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use tracing::{debug, info, warn};

use super::matcher::PatternMatcher;
use super::serial::pre_tokenize_serial;
use super::worker::ChunkWorker;
use crate::chunking::{check_boundaries, intervals, BoundaryPlanner, ChunkInterval};
use crate::config::PretokConfig;
use crate::delimiters::DelimiterSet;
use crate::errors::{PretokError, PretokResult};
use crate::metrics::PipelineMetrics;
use crate::results::{FrequencyTable, PretokOutput};

/// Pre-tokenizes `path` with the default chunking settings and returns the
/// merged frequency table.
///
/// `special_tokens` split documents; `split_special_token` is the delimiter
/// chunk boundaries are aligned to, normally one of `special_tokens`.
pub fn pre_tokenize<S: AsRef<str>>(
    path: impl AsRef<Path>,
    pattern: &str,
    special_tokens: &[S],
    split_special_token: impl AsRef<[u8]>,
) -> PretokResult<FrequencyTable> {
    let split = std::str::from_utf8(split_special_token.as_ref())
        .map_err(|e| PretokError::invalid_delimiter(format!("split token is not UTF-8: {}", e)))?;

    let config = PretokConfig {
        pattern: pattern.to_string(),
        special_tokens: special_tokens
            .iter()
            .map(|t| t.as_ref().to_string())
            .collect(),
        split_special_token: split.to_string(),
        ..Default::default()
    };

    Ok(Pretokenizer::new(config)?.run(path)?.table)
}

/// Runs the full pipeline: plan boundaries, fan chunks out to a worker
/// pool, fold the partial tables into one.
pub struct Pretokenizer {
    config: PretokConfig,
    matcher: PatternMatcher,
    metrics: PipelineMetrics,
    progress: Option<ProgressBar>,
}

impl Pretokenizer {
    /// Validates `config` and compiles its pattern and delimiters
    pub fn new(config: PretokConfig) -> PretokResult<Self> {
        config.validate()?;
        let delimiters = DelimiterSet::new(config.special_tokens.iter().cloned())?;
        let split = config.split_special_token.as_bytes();
        if !split.is_empty() {
            if !delimiters.contains(split) {
                warn!(
                    "Split token {:?} is not one of the special tokens; documents may span chunks",
                    config.split_special_token
                );
            }
            let overlapping = delimiters.overlapping_split(split);
            if !overlapping.is_empty() {
                warn!(
                    "Special tokens {:?} can overlap the split token {:?}; chunked counts may differ from a serial scan",
                    overlapping, config.split_special_token
                );
            }
        }
        let matcher = PatternMatcher::new(&config.pattern, delimiters)?;

        Ok(Self {
            config,
            matcher,
            metrics: PipelineMetrics::new(),
            progress: None,
        })
    }

    /// Reports each folded chunk to `progress`
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &PretokConfig {
        &self.config
    }

    pub fn matcher(&self) -> &PatternMatcher {
        &self.matcher
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    fn planner(&self) -> BoundaryPlanner {
        BoundaryPlanner::new(self.config.chunking_policy())
            .with_lookahead_window(self.config.lookahead_window)
            .with_metrics(self.metrics.clone())
    }

    fn worker(&self, path: &Path) -> ChunkWorker {
        ChunkWorker::with_metrics(
            path,
            self.matcher.clone(),
            self.config.invalid_utf8,
            self.metrics.clone(),
        )
    }

    /// Refined chunk boundaries for the corpus at `path`
    pub fn plan(&self, path: impl AsRef<Path>) -> PretokResult<Vec<u64>> {
        let path = path.as_ref();
        let file_sz = file_size(path)?;
        self.planner().plan_file(
            path,
            file_sz,
            self.config.thread_count.get(),
            self.config.split_special_token.as_bytes(),
        )
    }

    /// Pre-tokenizes the corpus at `path`
    pub fn run(&self, path: impl AsRef<Path>) -> PretokResult<PretokOutput> {
        let path = path.as_ref();
        info!(
            "Starting pre-tokenization of {} with {} special tokens",
            path.display(),
            self.matcher.delimiters().len()
        );

        let file_sz = file_size(path)?;
        let boundaries = self.planner().plan_file(
            path,
            file_sz,
            self.config.thread_count.get(),
            self.config.split_special_token.as_bytes(),
        )?;
        let table = self.run_with_boundaries(path, &boundaries)?;

        self.metrics.log_stats();
        info!(
            "Pre-tokenization complete. {} distinct pre-tokens, {} total, {} chunks",
            table.len(),
            table.total(),
            boundaries.len().saturating_sub(1)
        );

        Ok(PretokOutput {
            table,
            boundaries,
            file_size: file_sz,
            stats: self.metrics.get_stats(),
        })
    }

    /// Runs the worker pool over a caller-supplied boundary list.
    ///
    /// The list must run from 0 to the file size and be strictly
    /// increasing, otherwise `InvalidBoundaries` is returned before any
    /// chunk is read. Interior boundaries are expected at delimiter starts;
    /// that part is not checked.
    pub fn run_with_boundaries(
        &self,
        path: impl AsRef<Path>,
        boundaries: &[u64],
    ) -> PretokResult<FrequencyTable> {
        let path = path.as_ref();
        check_boundaries(boundaries, file_size(path)?)?;
        let chunks = intervals(boundaries);
        debug!("Dispatching {} chunks of {}", chunks.len(), path.display());

        if let Some(progress) = &self.progress {
            progress.set_length(chunks.len() as u64);
        }
        if chunks.is_empty() {
            return Ok(FrequencyTable::new());
        }

        let pool = build_pool(self.config.thread_count.get())?;
        let worker = self.worker(path);
        fan_out(&pool, &worker, &chunks, self.progress.as_ref())
    }

    /// Single-threaded reference scan of the whole corpus
    pub fn run_serial(&self, path: impl AsRef<Path>) -> PretokResult<FrequencyTable> {
        pre_tokenize_serial(path.as_ref(), &self.matcher, self.config.invalid_utf8)
    }
}

fn file_size(path: &Path) -> PretokResult<u64> {
    Ok(path
        .metadata()
        .map_err(|e| PretokError::from_io(e, path))?
        .len())
}

fn build_pool(threads: usize) -> PretokResult<ThreadPool> {
    ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("pretok-worker-{}", i))
        .build()
        .map_err(|e| PretokError::worker_pool(e.to_string()))
}

/// Spawns one task per chunk and folds results on the calling thread as
/// they arrive. The accumulator never leaves this function.
///
/// On the first failure, tasks that have not started yet are skipped and
/// the error is returned; a partial table is never returned.
fn fan_out(
    pool: &ThreadPool,
    worker: &ChunkWorker,
    chunks: &[ChunkInterval],
    progress: Option<&ProgressBar>,
) -> PretokResult<FrequencyTable> {
    let cancelled = AtomicBool::new(false);
    let (tx, rx) = mpsc::channel::<PretokResult<FrequencyTable>>();

    let mut accumulator = FrequencyTable::new();
    let mut failure = None;
    let mut folded = 0usize;

    pool.in_place_scope(|scope| {
        for &chunk in chunks {
            let tx = tx.clone();
            let cancelled = &cancelled;
            scope.spawn(move |_| {
                if cancelled.load(Ordering::Relaxed) {
                    return;
                }
                // The receiver only hangs up after a failure
                let _ = tx.send(worker.process_interval(chunk));
            });
        }
        drop(tx);

        for partial in rx {
            match partial {
                Ok(table) => {
                    accumulator.merge(table);
                    folded += 1;
                    if let Some(progress) = progress {
                        progress.inc(1);
                    }
                }
                Err(e) => {
                    cancelled.store(true, Ordering::Relaxed);
                    failure = Some(e);
                    break;
                }
            }
        }
    });

    if let Some(e) = failure {
        return Err(e);
    }
    if folded != chunks.len() {
        return Err(PretokError::worker_pool(format!(
            "{} of {} chunks reported no result",
            chunks.len() - folded,
            chunks.len()
        )));
    }
    Ok(accumulator)
}

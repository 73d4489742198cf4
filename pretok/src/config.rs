use config::{Config as ConfigBuilder, File};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::errors::{PretokError, PretokResult};

/// GPT-4 style pre-tokenization pattern: contraction suffixes, letter runs,
/// digit runs of at most three, punctuation runs, and whitespace runs that
/// leave the last space attached to the following word.
pub const GPT4_PATTERN: &str = r"'(?i:[sdmt]|ll|ve|re)|[^\r\n\p{L}\p{N}]?+\p{L}+|\p{N}{1,3}| ?[^\s\p{L}\p{N}]++[\r\n]*|\s*[\r\n]|\s+(?!\S)|\s+";

/// Document separator used by most web-text corpora
pub const END_OF_TEXT: &str = "<|endoftext|>";

/// Default look-ahead window used when aligning boundaries
pub const DEFAULT_LOOKAHEAD_WINDOW: usize = 4096;

/// Files above this size switch to the large-file chunk count under the fixed policy
pub const DEFAULT_LARGE_FILE_THRESHOLD: u64 = 4 * 1024 * 1024 * 1024;

/// How invalid UTF-8 inside a chunk is handled. Neither mode ever fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidUtf8 {
    /// Drop invalid byte sequences
    #[default]
    Ignore,
    /// Substitute U+FFFD for each invalid byte sequence
    Replace,
}

impl std::str::FromStr for InvalidUtf8 {
    type Err = PretokError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "replace" => Ok(Self::Replace),
            other => Err(PretokError::config_error(format!(
                "Unknown invalid-utf8 mode '{}', expected ignore|replace",
                other
            ))),
        }
    }
}

/// How many candidate chunks the boundary planner asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkingPolicy {
    /// A multiple of the worker count, balancing load without over-fragmenting
    Oversubscribe { factor: usize },
    /// A fixed chunk count, with a bounded larger count for very large files
    Fixed {
        chunks: usize,
        large_file_chunks: usize,
        large_file_threshold: u64,
    },
}

impl ChunkingPolicy {
    /// Number of candidate chunks for a corpus of `file_sz` bytes, never zero
    pub fn num_chunks(&self, file_sz: u64, worker_count: usize) -> usize {
        let n = match *self {
            Self::Oversubscribe { factor } => factor.saturating_mul(worker_count),
            Self::Fixed {
                chunks,
                large_file_chunks,
                large_file_threshold,
            } => {
                if file_sz > large_file_threshold {
                    large_file_chunks
                } else {
                    chunks
                }
            }
        };
        n.max(1)
    }
}

/// Configuration for a pre-tokenization run.
///
/// # Configuration Locations
///
/// Loaded from, in increasing order of precedence:
/// 1. Global `$HOME/.config/pretok/config.yaml`
/// 2. Local `.pretok.yaml` in the current directory
/// 3. Custom config file passed via `--config`
///
/// Example:
/// ```yaml
/// special_tokens: ["<|endoftext|>"]
/// split_special_token: "<|endoftext|>"
/// thread_count: 8
/// chunks_per_worker: 8
/// # fixed_chunks: 64
/// lookahead_window: 4096
/// invalid_utf8: ignore
/// log_level: info
/// ```
///
/// Command-line values take precedence; see [`PretokConfig::merge_with_cli`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PretokConfig {
    /// Pre-tokenization pattern (fancy-regex syntax)
    #[serde(default = "default_pattern")]
    pub pattern: String,

    /// Literal strings that split documents, in alternation order
    #[serde(default = "default_special_tokens")]
    pub special_tokens: Vec<String>,

    /// Delimiter chunk boundaries are aligned to
    #[serde(default = "default_split_special_token")]
    pub split_special_token: String,

    /// Size of the worker pool
    /// Defaults to number of CPU cores if not specified
    #[serde(default = "default_thread_count")]
    pub thread_count: NonZeroUsize,

    /// Candidate chunks per worker under the oversubscription policy
    #[serde(default = "default_chunks_per_worker")]
    pub chunks_per_worker: NonZeroUsize,

    /// Switches to the fixed policy with this many chunks
    #[serde(default)]
    pub fixed_chunks: Option<NonZeroUsize>,

    /// Chunk count under the fixed policy for files above `large_file_threshold`
    #[serde(default = "default_large_file_chunks")]
    pub large_file_chunks: NonZeroUsize,

    #[serde(default = "default_large_file_threshold")]
    pub large_file_threshold: u64,

    /// Bytes read per step while searching for a delimiter
    #[serde(default = "default_lookahead_window")]
    pub lookahead_window: usize,

    #[serde(default)]
    pub invalid_utf8: InvalidUtf8,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_pattern() -> String {
    GPT4_PATTERN.to_string()
}

fn default_special_tokens() -> Vec<String> {
    vec![END_OF_TEXT.to_string()]
}

fn default_split_special_token() -> String {
    END_OF_TEXT.to_string()
}

fn default_thread_count() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

fn default_chunks_per_worker() -> NonZeroUsize {
    NonZeroUsize::new(8).unwrap_or(NonZeroUsize::MIN)
}

fn default_large_file_chunks() -> NonZeroUsize {
    NonZeroUsize::new(512).unwrap_or(NonZeroUsize::MIN)
}

fn default_large_file_threshold() -> u64 {
    DEFAULT_LARGE_FILE_THRESHOLD
}

fn default_lookahead_window() -> usize {
    DEFAULT_LOOKAHEAD_WINDOW
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for PretokConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
            special_tokens: default_special_tokens(),
            split_special_token: default_split_special_token(),
            thread_count: default_thread_count(),
            chunks_per_worker: default_chunks_per_worker(),
            fixed_chunks: None,
            large_file_chunks: default_large_file_chunks(),
            large_file_threshold: default_large_file_threshold(),
            lookahead_window: default_lookahead_window(),
            invalid_utf8: InvalidUtf8::default(),
            log_level: default_log_level(),
        }
    }
}

/// Values given explicitly on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub pattern: Option<String>,
    pub special_tokens: Option<Vec<String>>,
    pub split_special_token: Option<String>,
    pub thread_count: Option<NonZeroUsize>,
    pub chunks_per_worker: Option<NonZeroUsize>,
    pub fixed_chunks: Option<NonZeroUsize>,
    pub lookahead_window: Option<usize>,
    pub invalid_utf8: Option<InvalidUtf8>,
    pub log_level: Option<String>,
}

impl PretokConfig {
    /// Loads configuration from the default locations
    pub fn load() -> PretokResult<Self> {
        Self::load_from(None)
    }

    /// Loads configuration from the default locations plus a specific file.
    /// The specific file must exist; the default locations are optional.
    pub fn load_from(config_path: Option<&Path>) -> PretokResult<Self> {
        let mut builder = ConfigBuilder::builder();

        let default_files = [
            // Global config
            dirs::config_dir().map(|p| p.join("pretok/config.yaml")),
            // Local config
            Some(PathBuf::from(".pretok.yaml")),
        ];

        for path in default_files.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Merges explicit CLI values over configuration file values
    pub fn merge_with_cli(mut self, cli: ConfigOverrides) -> Self {
        if let Some(pattern) = cli.pattern {
            self.pattern = pattern;
        }
        if let Some(special_tokens) = cli.special_tokens {
            self.special_tokens = special_tokens;
        }
        if let Some(split) = cli.split_special_token {
            self.split_special_token = split;
        }
        if let Some(threads) = cli.thread_count {
            self.thread_count = threads;
        }
        if let Some(factor) = cli.chunks_per_worker {
            self.chunks_per_worker = factor;
            // An explicit oversubscription factor means the caller wants that policy
            if cli.fixed_chunks.is_none() {
                self.fixed_chunks = None;
            }
        }
        if cli.fixed_chunks.is_some() {
            self.fixed_chunks = cli.fixed_chunks;
        }
        if let Some(window) = cli.lookahead_window {
            self.lookahead_window = window;
        }
        if let Some(mode) = cli.invalid_utf8 {
            self.invalid_utf8 = mode;
        }
        if let Some(level) = cli.log_level {
            self.log_level = level;
        }
        self
    }

    /// Rejects values the pipeline cannot run with
    pub fn validate(&self) -> PretokResult<()> {
        if self.lookahead_window == 0 {
            return Err(PretokError::config_error(
                "lookahead_window must be greater than zero",
            ));
        }
        if let Some(i) = self.special_tokens.iter().position(|t| t.is_empty()) {
            return Err(PretokError::invalid_delimiter(format!(
                "special token #{} is empty",
                i
            )));
        }
        Ok(())
    }

    /// The chunking policy these settings describe
    pub fn chunking_policy(&self) -> ChunkingPolicy {
        match self.fixed_chunks {
            Some(chunks) => ChunkingPolicy::Fixed {
                chunks: chunks.get(),
                large_file_chunks: self.large_file_chunks.get().max(chunks.get()),
                large_file_threshold: self.large_file_threshold,
            },
            None => ChunkingPolicy::Oversubscribe {
                factor: self.chunks_per_worker.get(),
            },
        }
    }
}

//! Error types for the pre-tokenization pipeline.
//!
//! Every failure is either absorbed by a documented degrade policy or
//! propagated to the caller as a [`PretokError`]:
//!
//! ```rust,ignore
//! match pretok::pre_tokenize(path, pattern, &specials, "<|endoftext|>") {
//!     Ok(table) => // Hand the table to the BPE trainer,
//!     Err(PretokError::FileNotFound(path)) => // Corpus is missing,
//!     Err(e) => // Any other failure is fatal for the whole run
//! }
//! ```
//!
//! # Degrade vs. propagate
//!
//! 1. **Invalid UTF-8** never shows up here. Chunks are decoded lossily.
//! 2. **I/O failures** are fatal. A chunk that cannot be read would silently
//!    undercount the global table.
//! 3. **Worker failures** are fatal for the same reason. The orchestrator
//!    never returns a partial table.
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for pipeline operations
pub type PretokResult<T> = Result<T, PretokError>;

/// Errors that can occur while pre-tokenizing a corpus
#[derive(Error, Debug)]
pub enum PretokError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("Short read in {path} at offset {start}: expected {expected} bytes, got {actual}")]
    ShortRead {
        path: PathBuf,
        start: u64,
        expected: u64,
        actual: u64,
    },
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("Pattern matching failed: {0}")]
    PatternMatch(String),
    #[error("Invalid delimiter: {0}")]
    InvalidDelimiter(String),
    #[error("Invalid chunk boundaries: {0}")]
    InvalidBoundaries(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Worker pool error: {0}")]
    WorkerPool(String),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl PretokError {
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound(path.into())
    }

    pub fn permission_denied(path: impl Into<PathBuf>) -> Self {
        Self::PermissionDenied(path.into())
    }

    pub fn short_read(path: impl Into<PathBuf>, start: u64, expected: u64, actual: u64) -> Self {
        Self::ShortRead {
            path: path.into(),
            start,
            expected,
            actual,
        }
    }

    pub fn invalid_pattern(msg: impl Into<String>) -> Self {
        Self::InvalidPattern(msg.into())
    }

    pub fn pattern_match(msg: impl Into<String>) -> Self {
        Self::PatternMatch(msg.into())
    }

    pub fn invalid_delimiter(msg: impl Into<String>) -> Self {
        Self::InvalidDelimiter(msg.into())
    }

    pub fn invalid_boundaries(msg: impl Into<String>) -> Self {
        Self::InvalidBoundaries(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn worker_pool(msg: impl Into<String>) -> Self {
        Self::WorkerPool(msg.into())
    }

    /// Maps an I/O error raised while touching `path` onto the matching variant
    pub fn from_io(err: io::Error, path: &Path) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::file_not_found(path),
            io::ErrorKind::PermissionDenied => Self::permission_denied(path),
            _ => Self::IoError(err),
        }
    }
}

impl From<config::ConfigError> for PretokError {
    fn from(err: config::ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}

//! The parallel pre-tokenization pipeline.
//!
//! ```rust,ignore
//! file size -> boundary plan -> disjoint intervals -> parallel scans -> partial tables -> merged table
//! ```
//!
//! # Fan-out / fan-in
//!
//! Each chunk is one task on a bounded rayon pool. Tasks share nothing
//! mutable: each opens the corpus on its own and builds a private
//! [`FrequencyTable`](crate::results::FrequencyTable). Results travel back
//! over a channel to the orchestrating thread, which alone owns the
//! accumulator and folds each partial table in as it arrives:
//!
//! ```rust,ignore
//! pool.in_place_scope(|scope| {
//!     for chunk in chunks {
//!         scope.spawn(move |_| tx.send(worker.process_interval(chunk)));
//!     }
//!     for partial in rx {
//!         accumulator.merge(partial?);
//!     }
//! });
//! ```
//!
//! Merging is pointwise addition, so completion order never changes the
//! result. The only correctness requirement is that every byte of the
//! corpus is scanned by exactly one task, which the boundary invariants in
//! [`chunking`](crate::chunking) guarantee.
//!
//! # Reference implementation
//!
//! [`pre_tokenize_serial`] decodes the whole file at once (memory-mapped
//! for large files) and must agree with the parallel result key for key.
pub mod engine;
pub mod matcher;
pub mod serial;
pub mod worker;

pub use engine::{pre_tokenize, Pretokenizer};
pub use matcher::PatternMatcher;
pub use serial::pre_tokenize_serial;
pub use worker::ChunkWorker;

pub mod chunking;
pub mod config;
pub mod delimiters;
pub mod errors;
pub mod metrics;
pub mod pipeline;
pub mod results;

pub use chunking::{refine_boundaries, BoundaryPlanner, ChunkInterval, DelimiterScanner};
pub use config::{
    ChunkingPolicy, ConfigOverrides, InvalidUtf8, PretokConfig, END_OF_TEXT, GPT4_PATTERN,
};
pub use delimiters::DelimiterSet;
pub use errors::{PretokError, PretokResult};
pub use metrics::{PipelineMetrics, PipelineStats};
pub use pipeline::{pre_tokenize, pre_tokenize_serial, Pretokenizer};
pub use results::{FrequencyTable, PretokOutput};

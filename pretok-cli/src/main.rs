use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use pretok::{
    chunking::intervals, ConfigOverrides, FrequencyTable, InvalidUtf8, PipelineStats,
    PretokConfig, Pretokenizer,
};
use serde::Serialize;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Parallel regex pre-tokenization of large text corpora", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Count pre-token frequencies in a corpus
    Count(CountArgs),

    /// Print the chunk boundaries a run would use
    Boundaries(BoundariesArgs),
}

/// Settings shared by every subcommand
#[derive(Args)]
struct PipelineArgs {
    /// Corpus file to read
    file: PathBuf,

    /// Special token that splits documents (can be specified multiple times)
    #[arg(short = 's', long = "special-token")]
    special_tokens: Vec<String>,

    /// Delimiter chunk boundaries are aligned to
    #[arg(long = "split-token")]
    split_token: Option<String>,

    /// Number of worker threads
    #[arg(short = 'j', long)]
    threads: Option<NonZeroUsize>,

    /// Candidate chunks per worker thread
    #[arg(long)]
    chunks_per_worker: Option<NonZeroUsize>,

    /// Use a fixed chunk count instead of scaling with the thread count
    #[arg(long)]
    fixed_chunks: Option<NonZeroUsize>,

    /// Bytes read per step while searching for a delimiter
    #[arg(long)]
    lookahead: Option<usize>,

    /// Path to a config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG is used when unset
    #[arg(long)]
    log_level: Option<String>,

    /// Print a JSON report instead of the human summary
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct CountArgs {
    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Pre-tokenization pattern (defaults to the GPT-4 pattern)
    #[arg(short = 'p', long)]
    pattern: Option<String>,

    /// How to handle invalid UTF-8 (ignore|replace)
    #[arg(long = "invalid-utf8")]
    invalid_utf8: Option<InvalidUtf8>,

    /// Number of most frequent pre-tokens to show
    #[arg(short = 'n', long, default_value = "20")]
    top: usize,

    /// Re-run single-threaded and fail if the tables differ
    #[arg(long)]
    verify: bool,
}

#[derive(Args)]
struct BoundariesArgs {
    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Serialize)]
struct PreTokenCount {
    pre_token: String,
    bytes: Vec<u8>,
    count: u64,
}

#[derive(Serialize)]
struct CountReport {
    file: String,
    file_size: u64,
    chunks: usize,
    distinct: usize,
    total: u64,
    elapsed_ms: u128,
    verified: Option<bool>,
    stats: PipelineStats,
    top: Vec<PreTokenCount>,
}

#[derive(Serialize)]
struct BoundaryReport<'a> {
    file: String,
    file_size: u64,
    boundaries: &'a [u64],
}

fn main() -> Result<()> {
    run()
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Count(args) => {
            let overrides = ConfigOverrides {
                pattern: args.pattern.clone(),
                invalid_utf8: args.invalid_utf8,
                ..overrides_from(&args.pipeline)
            };
            let config = load_config(&args.pipeline, overrides)?;
            count(&args, config)
        }
        Commands::Boundaries(args) => {
            let config = load_config(&args.pipeline, overrides_from(&args.pipeline))?;
            boundaries(&args.pipeline, config)
        }
    }
}

fn overrides_from(args: &PipelineArgs) -> ConfigOverrides {
    ConfigOverrides {
        special_tokens: (!args.special_tokens.is_empty()).then(|| args.special_tokens.clone()),
        split_special_token: args.split_token.clone(),
        thread_count: args.threads,
        chunks_per_worker: args.chunks_per_worker,
        fixed_chunks: args.fixed_chunks,
        lookahead_window: args.lookahead,
        log_level: args.log_level.clone(),
        ..Default::default()
    }
}

fn load_config(args: &PipelineArgs, overrides: ConfigOverrides) -> Result<PretokConfig> {
    let explicit_level = overrides.log_level.is_some();
    let config = PretokConfig::load_from(args.config.as_deref())
        .context("Failed to load configuration")?
        .merge_with_cli(overrides);

    init_tracing(&config.log_level, explicit_level);
    debug!("Effective configuration: {:?}", config);
    Ok(config)
}

/// Logs go to stderr so stdout stays clean for reports
fn init_tracing(level: &str, explicit: bool) {
    let filter = if explicit {
        EnvFilter::new(level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };
    // A subscriber may already be installed when embedded in tests
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn progress_bar(hidden: bool) -> Result<ProgressBar> {
    if hidden {
        return Ok(ProgressBar::hidden());
    }
    let progress = ProgressBar::new(0);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} chunks")?
            .progress_chars("=>-"),
    );
    Ok(progress)
}

fn count(args: &CountArgs, config: PretokConfig) -> Result<()> {
    let path = args.pipeline.file.as_path();
    let progress = progress_bar(args.pipeline.json)?;
    let pretok = Pretokenizer::new(config)?.with_progress(progress.clone());

    let start = Instant::now();
    let output = pretok
        .run(path)
        .with_context(|| format!("Failed to pre-tokenize {}", path.display()))?;
    let elapsed = start.elapsed();
    progress.finish_and_clear();

    let verified = if args.verify {
        let serial = pretok.run_serial(path)?;
        if serial != output.table {
            bail!(
                "Parallel and serial frequency tables differ for {} ({} vs {} distinct pre-tokens)",
                path.display(),
                output.table.len(),
                serial.len()
            );
        }
        Some(true)
    } else {
        None
    };

    if args.pipeline.json {
        let report = CountReport {
            file: path.display().to_string(),
            file_size: output.file_size,
            chunks: output.chunk_count(),
            distinct: output.table.len(),
            total: output.table.total(),
            elapsed_ms: elapsed.as_millis(),
            verified,
            stats: output.stats,
            top: top_entries(&output.table, args.top),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_count_summary(path, &output.table, output.file_size, output.chunk_count(), elapsed);
        if verified.is_some() {
            println!("{}", "Serial scan matches".green());
        }
        print_top(&output.table, args.top);
    }
    Ok(())
}

fn boundaries(args: &PipelineArgs, config: PretokConfig) -> Result<()> {
    let path = args.file.as_path();
    let pretok = Pretokenizer::new(config)?;
    let boundaries = pretok
        .plan(path)
        .with_context(|| format!("Failed to plan chunks for {}", path.display()))?;
    let file_size = boundaries.last().copied().unwrap_or(0);

    if args.json {
        let report = BoundaryReport {
            file: path.display().to_string(),
            file_size,
            boundaries: &boundaries,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let chunks = intervals(&boundaries);
    println!(
        "{} {} ({} bytes, {} chunks)",
        "Plan for".bold(),
        path.display().to_string().blue(),
        file_size,
        chunks.len()
    );
    for (i, chunk) in chunks.iter().enumerate() {
        println!(
            "{:>5}  [{}, {})  {} bytes",
            i.to_string().green(),
            chunk.start,
            chunk.end,
            chunk.len()
        );
    }
    Ok(())
}

fn top_entries(table: &FrequencyTable, n: usize) -> Vec<PreTokenCount> {
    table
        .most_common(n)
        .into_iter()
        .map(|(bytes, count)| PreTokenCount {
            pre_token: String::from_utf8_lossy(bytes).into_owned(),
            bytes: bytes.to_vec(),
            count,
        })
        .collect()
}

fn print_count_summary(
    path: &Path,
    table: &FrequencyTable,
    file_size: u64,
    chunks: usize,
    elapsed: Duration,
) {
    println!("\n{}", path.display().to_string().blue());
    println!(
        "{} bytes in {} chunks: {} pre-tokens, {} distinct",
        file_size,
        chunks,
        table.total(),
        table.len()
    );
    // Millisecond precision is plenty for a summary line
    let elapsed = Duration::from_millis(elapsed.as_millis() as u64);
    println!("Finished in {}", humantime::format_duration(elapsed));
}

fn print_top(table: &FrequencyTable, n: usize) {
    if n == 0 || table.is_empty() {
        return;
    }
    println!("\n{}", "Most frequent pre-tokens:".bold());
    for (bytes, count) in table.most_common(n) {
        println!(
            "{:>12}  {:?}",
            count.to_string().green(),
            String::from_utf8_lossy(bytes)
        );
    }
}

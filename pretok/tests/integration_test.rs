use anyhow::Result;
use pretok::chunking::intervals;
use pretok::{
    pre_tokenize, BoundaryPlanner, ChunkingPolicy, DelimiterScanner, FrequencyTable,
    InvalidUtf8, PretokConfig, PretokError, Pretokenizer, END_OF_TEXT, GPT4_PATTERN,
};
use std::fs;
use std::io::Cursor;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

const WORDS: &[&str] = &[
    "the", "quick", "brown", "fox", "don't", "we'll", "THEY'RE", "naïve", "café", "日本語",
    "東京", "😀", "12345", "3.14159", "!!!", "...", "(parens)", "\"quoted\"", "tab\there",
    "line\nbreak", "  spaced", "mixedCase", "über", "crème", "—", "x", "\r\n",
];

/// Deterministic multi-document corpus with multi-byte text, odd whitespace
/// and back-to-back delimiters.
fn build_corpus(docs: usize, seed: u64) -> String {
    let mut state = seed;
    let mut rand = || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (state >> 33) as usize
    };

    let mut out = String::new();
    for d in 0..docs {
        let words = 5 + rand() % 60;
        for w in 0..words {
            if w > 0 {
                out.push_str(match rand() % 7 {
                    0 => "  ",
                    1 => "\n",
                    2 => " \n\n",
                    _ => " ",
                });
            }
            out.push_str(WORDS[rand() % WORDS.len()]);
        }
        if rand() % 5 == 0 {
            out.push('\n');
        }
        out.push_str(END_OF_TEXT);
        if d % 13 == 0 {
            out.push_str(END_OF_TEXT);
        }
    }
    out
}

fn write_corpus(dir: &TempDir, name: &str, content: &[u8]) -> Result<PathBuf> {
    let path = dir.path().join(name);
    fs::write(&path, content)?;
    Ok(path)
}

fn config_with(threads: usize) -> PretokConfig {
    PretokConfig {
        thread_count: NonZeroUsize::new(threads).unwrap(),
        ..Default::default()
    }
}

fn assert_boundary_invariants(corpus: &[u8], boundaries: &[u64]) {
    let file_sz = corpus.len() as u64;
    if file_sz == 0 {
        assert_eq!(boundaries, &[0]);
        return;
    }

    assert_eq!(boundaries.first(), Some(&0));
    assert_eq!(boundaries.last(), Some(&file_sz));
    assert!(
        boundaries.windows(2).all(|w| w[0] < w[1]),
        "boundaries not strictly increasing: {:?}",
        boundaries
    );
    for &b in &boundaries[1..boundaries.len() - 1] {
        assert!(
            corpus[b as usize..].starts_with(END_OF_TEXT.as_bytes()),
            "boundary {} is not at a delimiter",
            b
        );
    }

    let covered: u64 = intervals(boundaries).iter().map(|iv| iv.len()).sum();
    assert_eq!(covered, file_sz);
}

fn run_parallel(path: &Path, config: PretokConfig) -> Result<FrequencyTable> {
    Ok(Pretokenizer::new(config)?.run(path)?.table)
}

#[test]
fn test_parallel_matches_serial() -> Result<()> {
    let dir = tempdir()?;
    let corpus = build_corpus(400, 7);
    let path = write_corpus(&dir, "corpus.txt", corpus.as_bytes())?;

    let serial = Pretokenizer::new(config_with(1))?.run_serial(&path)?;
    assert!(!serial.is_empty());

    for threads in [1, 2, 4, 8] {
        let parallel = run_parallel(&path, config_with(threads))?;
        assert_eq!(parallel, serial, "mismatch with {} threads", threads);
    }
    Ok(())
}

#[test]
fn test_small_lookahead_window_matches_serial() -> Result<()> {
    let dir = tempdir()?;
    let corpus = build_corpus(200, 11);
    let path = write_corpus(&dir, "corpus.txt", corpus.as_bytes())?;

    let config = PretokConfig {
        lookahead_window: 5,
        ..config_with(4)
    };
    let pretok = Pretokenizer::new(config)?;
    let output = pretok.run(&path)?;

    assert_boundary_invariants(corpus.as_bytes(), &output.boundaries);
    assert_eq!(output.table, pretok.run_serial(&path)?);
    Ok(())
}

#[test]
fn test_merge_associativity_across_chunk_counts() -> Result<()> {
    let dir = tempdir()?;
    let corpus = build_corpus(300, 3);
    let path = write_corpus(&dir, "corpus.txt", corpus.as_bytes())?;

    let mut tables = Vec::new();
    for chunks in [1, 4, 37] {
        let config = PretokConfig {
            fixed_chunks: NonZeroUsize::new(chunks),
            ..config_with(4)
        };
        let pretok = Pretokenizer::new(config)?;
        let boundaries = pretok.plan(&path)?;
        assert_boundary_invariants(corpus.as_bytes(), &boundaries);
        assert!(boundaries.len() - 1 <= chunks);

        tables.push(pretok.run_with_boundaries(&path, &boundaries)?);
    }

    assert_eq!(tables[0], tables[1]);
    assert_eq!(tables[1], tables[2]);
    Ok(())
}

#[test]
fn test_boundary_invariants_across_sizes() {
    let corpus = build_corpus(120, 42).into_bytes();

    for len in [0, 1, 13, 14, 100, 1_000, 4_097, corpus.len() / 2, corpus.len()] {
        let slice = &corpus[..len];
        for chunks in [1, 2, 3, 16, 64] {
            let planner = BoundaryPlanner::new(ChunkingPolicy::Fixed {
                chunks,
                large_file_chunks: chunks,
                large_file_threshold: u64::MAX,
            })
            .with_lookahead_window(64);

            let boundaries = planner
                .plan(&mut Cursor::new(slice), len as u64, 1, END_OF_TEXT.as_bytes())
                .unwrap();
            assert_boundary_invariants(slice, &boundaries);
        }
    }
}

#[test]
fn test_alignment_is_idempotent() {
    let corpus = build_corpus(80, 5).into_bytes();
    let file_sz = corpus.len() as u64;
    let planner = BoundaryPlanner::new(ChunkingPolicy::Oversubscribe { factor: 8 });
    let aligned = planner
        .plan(&mut Cursor::new(&corpus), file_sz, 4, END_OF_TEXT.as_bytes())
        .unwrap();

    let scanner = DelimiterScanner::new(END_OF_TEXT.as_bytes(), 4096);
    let again = scanner
        .refine(&mut Cursor::new(&corpus), file_sz, &aligned)
        .unwrap();
    assert_eq!(aligned, again);
}

#[test]
fn test_empty_corpus() -> Result<()> {
    let dir = tempdir()?;
    let path = write_corpus(&dir, "empty.txt", b"")?;

    let table = pre_tokenize(&path, GPT4_PATTERN, &[END_OF_TEXT], END_OF_TEXT)?;
    assert!(table.is_empty());

    let output = Pretokenizer::new(config_with(2))?.run(&path)?;
    assert_eq!(output.boundaries, vec![0]);
    assert_eq!(output.chunk_count(), 0);
    Ok(())
}

#[test]
fn test_invalid_utf8_degrades_identically() -> Result<()> {
    let dir = tempdir()?;
    let mut corpus = build_corpus(150, 9).into_bytes();
    // Sprinkle stray continuation bytes and truncated sequences, some right
    // before a delimiter.
    let mut i = 0;
    while i < corpus.len() {
        if corpus[i..].starts_with(END_OF_TEXT.as_bytes()) && i % 3 == 0 {
            corpus.splice(i..i, [0xE2, 0x82]);
            i += 2 + END_OF_TEXT.len();
        } else if corpus[i] == b' ' && i % 11 == 0 {
            corpus.insert(i, 0xFF);
            i += 2;
        } else {
            i += 1;
        }
    }
    let path = write_corpus(&dir, "dirty.txt", &corpus)?;

    for mode in [InvalidUtf8::Ignore, InvalidUtf8::Replace] {
        let config = PretokConfig {
            invalid_utf8: mode,
            ..config_with(4)
        };
        let pretok = Pretokenizer::new(config)?;
        let output = pretok.run(&path)?;

        assert!(output.stats.lossy_chunks > 0);
        assert_eq!(output.table, pretok.run_serial(&path)?, "mode {:?}", mode);
    }
    Ok(())
}

#[test]
fn test_without_special_tokens_uses_one_chunk() -> Result<()> {
    let dir = tempdir()?;
    let corpus = build_corpus(50, 1);
    let path = write_corpus(&dir, "corpus.txt", corpus.as_bytes())?;

    let config = PretokConfig {
        special_tokens: vec![],
        split_special_token: String::new(),
        ..config_with(4)
    };
    let pretok = Pretokenizer::new(config)?;
    let output = pretok.run(&path)?;

    assert_eq!(output.boundaries, vec![0, corpus.len() as u64]);
    assert_eq!(output.table, pretok.run_serial(&path)?);
    // The delimiter is ordinary text now
    assert!(output.table.get(b"<|") > 0);
    Ok(())
}

#[test]
fn test_missing_corpus_is_fatal() {
    let result = pre_tokenize(
        "no/such/dir/corpus.txt",
        GPT4_PATTERN,
        &[END_OF_TEXT],
        END_OF_TEXT,
    );
    assert!(matches!(result, Err(PretokError::FileNotFound(_))));
}

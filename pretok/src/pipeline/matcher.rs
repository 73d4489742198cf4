use fancy_regex::Regex as FancyRegex;
use regex::Regex;
use std::sync::Arc;

use crate::delimiters::DelimiterSet;
use crate::errors::{PretokError, PretokResult};
use crate::results::FrequencyTable;

/// Per-document tallies returned by [`PatternMatcher::count_text`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanTally {
    pub documents: u64,
    pub matches: u64,
}

/// Compiled pre-tokenization pattern plus the delimiter splitter.
///
/// Both regexes are immutable once built and safe to share across worker
/// threads; cloning only bumps reference counts.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    pattern: Arc<FancyRegex>,
    splitter: Option<Arc<Regex>>,
    delimiters: DelimiterSet,
}

impl PatternMatcher {
    /// Compiles `pattern` and the literal alternation over `delimiters`
    pub fn new(pattern: &str, delimiters: DelimiterSet) -> PretokResult<Self> {
        let compiled = FancyRegex::new(pattern)
            .map_err(|e| PretokError::invalid_pattern(format!("{}: {}", pattern, e)))?;

        let splitter = match delimiters.alternation_pattern() {
            Some(alternation) => Some(Arc::new(Regex::new(&alternation).map_err(|e| {
                PretokError::invalid_pattern(format!("special token alternation: {}", e))
            })?)),
            None => None,
        };

        Ok(Self {
            pattern: Arc::new(compiled),
            splitter,
            delimiters,
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn delimiters(&self) -> &DelimiterSet {
        &self.delimiters
    }

    /// Splits text into documents at every delimiter occurrence, dropping
    /// the delimiters themselves. Without delimiters the text is one document.
    pub fn documents<'t>(&self, text: &'t str) -> Vec<&'t str> {
        match &self.splitter {
            Some(splitter) => splitter.split(text).collect(),
            None => vec![text],
        }
    }

    /// Counts every pattern match in one document, returning the match count.
    ///
    /// The backtracking engine has a fixed stack. A single match that needs
    /// to backtrack over roughly a million characters, such as a whitespace
    /// run of that length under [`GPT4_PATTERN`](crate::config::GPT4_PATTERN),
    /// fails with `PatternMatch` instead of being counted.
    pub fn count_document(&self, document: &str, table: &mut FrequencyTable) -> PretokResult<u64> {
        let mut matches = 0;
        for m in self.pattern.find_iter(document) {
            let m = m.map_err(|e| {
                PretokError::pattern_match(format!("{} (document of {} bytes)", e, document.len()))
            })?;
            table.record(m.as_str().as_bytes());
            matches += 1;
        }
        Ok(matches)
    }

    /// Splits `text` into documents and counts the matches of each
    pub fn count_text(&self, text: &str, table: &mut FrequencyTable) -> PretokResult<ScanTally> {
        let mut tally = ScanTally::default();
        for document in self.documents(text) {
            tally.documents += 1;
            tally.matches += self.count_document(document, table)?;
        }
        Ok(tally)
    }
}

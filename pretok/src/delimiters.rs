use crate::errors::{PretokError, PretokResult};

/// Ordered set of literal special tokens that split a corpus into documents.
///
/// Tokens keep the order they were given in, which is also the alternation
/// order used when splitting: at any position the first listed token that
/// matches wins. Repeated tokens are dropped, keeping the first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelimiterSet {
    tokens: Vec<String>,
}

impl DelimiterSet {
    /// Builds a set from literal tokens, rejecting empty strings
    pub fn new<I, S>(tokens: I) -> PretokResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::default();
        for token in tokens {
            let token = token.into();
            if token.is_empty() {
                return Err(PretokError::invalid_delimiter(
                    "special tokens must not be empty",
                ));
            }
            if !set.tokens.contains(&token) {
                set.tokens.push(token);
            }
        }
        Ok(set)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn contains(&self, token: &[u8]) -> bool {
        self.tokens.iter().any(|t| t.as_bytes() == token)
    }

    /// Tokens with an occurrence that can start before an occurrence of
    /// `split` and run into it, `split` itself included when it overlaps
    /// itself. A boundary placed at such a `split` may not be where a whole
    /// file split would cut.
    pub fn overlapping_split(&self, split: &[u8]) -> Vec<&str> {
        self.tokens
            .iter()
            .filter(|t| runs_into(t.as_bytes(), split))
            .map(String::as_str)
            .collect()
    }

    /// Regex alternation matching any token literally, or `None` for an empty set
    pub fn alternation_pattern(&self) -> Option<String> {
        if self.tokens.is_empty() {
            return None;
        }
        let escaped: Vec<String> = self.tokens.iter().map(|t| regex::escape(t)).collect();
        Some(escaped.join("|"))
    }
}

/// Whether some proper suffix of `token` starts with `split`, or is a
/// prefix of it
fn runs_into(token: &[u8], split: &[u8]) -> bool {
    (1..token.len()).any(|i| {
        let tail = &token[i..];
        tail.starts_with(split) || split.starts_with(tail)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_order_and_drops_duplicates() {
        let set = DelimiterSet::new(["<|a|>", "<|b|>", "<|a|>"]).unwrap();
        assert_eq!(set.as_slice(), &["<|a|>".to_string(), "<|b|>".to_string()]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_rejects_empty_token() {
        let result = DelimiterSet::new(["<|endoftext|>", ""]);
        assert!(matches!(result, Err(PretokError::InvalidDelimiter(_))));
    }

    #[test]
    fn test_alternation_escapes_metacharacters() {
        let set = DelimiterSet::new(["<|endoftext|>", "a.b"]).unwrap();
        assert_eq!(
            set.alternation_pattern().unwrap(),
            r"<\|endoftext\|>|a\.b"
        );
        assert!(DelimiterSet::default().alternation_pattern().is_none());
    }

    #[test]
    fn test_contains() {
        let set = DelimiterSet::new(vec!["<|endoftext|>".to_string()]).unwrap();
        assert!(set.contains(b"<|endoftext|>"));
        assert!(!set.contains(b"<|pad|>"));
    }

    #[test]
    fn test_overlapping_split() {
        let split = b"<|endoftext|>";
        let set = DelimiterSet::new(["<|endoftext|>", "<|pad|>"]).unwrap();
        assert!(set.overlapping_split(split).is_empty());

        let set = DelimiterSet::new(["<|endoftext|>", "x<|endoftext|>", "t|><|e"]).unwrap();
        assert_eq!(set.overlapping_split(split), vec!["x<|endoftext|>", "t|><|e"]);

        let set = DelimiterSet::new(["aa"]).unwrap();
        assert_eq!(set.overlapping_split(b"aa"), vec!["aa"]);
        assert!(DelimiterSet::new(["ab"]).unwrap().overlapping_split(b"ab").is_empty());
    }
}

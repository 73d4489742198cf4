use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use tracing::{debug, trace};

use super::matcher::PatternMatcher;
use super::worker::decode_bytes;
use crate::config::InvalidUtf8;
use crate::errors::{PretokError, PretokResult};
use crate::results::FrequencyTable;

/// Files at or above this size are memory-mapped instead of read
pub(crate) const MMAP_THRESHOLD: u64 = 10 * 1024 * 1024; // 10MB

/// Single-threaded reference: decode the whole corpus once, split once on
/// all delimiters, count every match. The parallel pipeline must produce
/// exactly this table.
pub fn pre_tokenize_serial(
    path: &Path,
    matcher: &PatternMatcher,
    invalid_utf8: InvalidUtf8,
) -> PretokResult<FrequencyTable> {
    let size = path
        .metadata()
        .map_err(|e| PretokError::from_io(e, path))?
        .len();

    let mut table = FrequencyTable::new();
    if size == 0 {
        return Ok(table);
    }

    let tally = if size >= MMAP_THRESHOLD {
        trace!("Memory-mapping {} for serial scan", path.display());
        let file = File::open(path).map_err(|e| PretokError::from_io(e, path))?;
        // SAFETY: the corpus is treated as read-only for the whole run
        let mmap = unsafe { Mmap::map(&file) }.map_err(PretokError::IoError)?;
        let (text, _) = decode_bytes(&mmap, invalid_utf8);
        matcher.count_text(&text, &mut table)?
    } else {
        let bytes = std::fs::read(path).map_err(|e| PretokError::from_io(e, path))?;
        let (text, _) = decode_bytes(&bytes, invalid_utf8);
        matcher.count_text(&text, &mut table)?
    };

    debug!(
        "Serial scan of {} bytes: {} documents, {} matches",
        size, tally.documents, tally.matches
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{END_OF_TEXT, GPT4_PATTERN};
    use crate::delimiters::DelimiterSet;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_serial_counts() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "one two<|endoftext|>two three<|endoftext|>").unwrap();
        file.flush().unwrap();

        let matcher =
            PatternMatcher::new(GPT4_PATTERN, DelimiterSet::new([END_OF_TEXT]).unwrap()).unwrap();
        let table = pre_tokenize_serial(file.path(), &matcher, InvalidUtf8::Ignore).unwrap();

        assert_eq!(table.get(b"one"), 1);
        assert_eq!(table.get(b" two"), 1);
        assert_eq!(table.get(b"two"), 1);
        assert_eq!(table.get(b" three"), 1);
        assert_eq!(table.total(), 4);
    }

    #[test]
    fn test_serial_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let matcher = PatternMatcher::new(GPT4_PATTERN, DelimiterSet::default()).unwrap();
        let table = pre_tokenize_serial(file.path(), &matcher, InvalidUtf8::Ignore).unwrap();
        assert!(table.is_empty());
    }
}

use std::io::Write;
use std::path::Path;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// The fundamental edit primitive: byte-span replacement with verification.
///
/// Section splices and rewritten matches both compile down to this primitive.
/// Intelligence lives in span acquisition (markers, patterns), not application.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Edit does nothing until applied"]
pub struct Edit {
    /// Starting byte offset (inclusive)
    pub byte_start: usize,
    /// Ending byte offset (exclusive)
    pub byte_end: usize,
    /// New text to put at [byte_start, byte_end)
    pub new_text: String,
    /// Verification of what we expect to find before applying
    pub expected_before: EditVerification,
}

/// Verification strategy for edit safety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerification {
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of expected text (faster for large spans)
    Hash(u64),
}

impl EditVerification {
    /// Check if the provided text matches the verification criteria.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => text == expected,
            EditVerification::Hash(expected_hash) => xxh3_64(text.as_bytes()) == *expected_hash,
        }
    }

    /// Create verification from text, using hash for text over 1KB.
    ///
    /// Sections usually span whole functions, so most splices verify by hash.
    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            EditVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            EditVerification::ExactMatch(text.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("before-text verification failed at byte {byte_start}")]
    BeforeTextMismatch {
        byte_start: usize,
        byte_end: usize,
        expected: String,
        found: String,
    },

    #[error("invalid byte range: [{byte_start}, {byte_end}) in text of length {text_len}")]
    InvalidByteRange {
        byte_start: usize,
        byte_end: usize,
        text_len: usize,
    },

    #[error("overlapping edits at [{byte_start}, {byte_end})")]
    Overlap { byte_start: usize, byte_end: usize },

    #[error("invalid edit would create malformed UTF-8")]
    InvalidUtf8Edit,

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Edit {
    /// Create a new edit with automatic verification generation.
    pub fn new(
        byte_start: usize,
        byte_end: usize,
        new_text: impl Into<String>,
        expected_before: impl AsRef<str>,
    ) -> Self {
        Self {
            byte_start,
            byte_end,
            new_text: new_text.into(),
            expected_before: EditVerification::from_text(expected_before.as_ref()),
        }
    }

    /// Validate the edit against the current text.
    ///
    /// Returns the current text at [byte_start, byte_end) if validation succeeds.
    fn validate<'a>(&self, content: &'a str) -> Result<&'a str, EditError> {
        if self.byte_start > self.byte_end || self.byte_end > content.len() {
            return Err(EditError::InvalidByteRange {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                text_len: content.len(),
            });
        }

        let current = content
            .get(self.byte_start..self.byte_end)
            .ok_or(EditError::InvalidUtf8Edit)?;

        if !self.expected_before.matches(current) {
            return Err(EditError::BeforeTextMismatch {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                expected: format!("{:?}", self.expected_before),
                found: current.to_string(),
            });
        }

        Ok(current)
    }

    /// Apply this edit to `content`, returning the new text.
    pub fn apply_to(&self, content: &str) -> Result<String, EditError> {
        self.validate(content)?;

        let mut out = String::with_capacity(
            content.len() - (self.byte_end - self.byte_start) + self.new_text.len(),
        );
        out.push_str(&content[..self.byte_start]);
        out.push_str(&self.new_text);
        out.push_str(&content[self.byte_end..]);
        Ok(out)
    }

    /// Apply multiple edits to the same text in one pass.
    ///
    /// All edits are validated against the original text first. Edits are
    /// then sorted by byte_start descending and applied bottom-to-top to avoid
    /// offset invalidation.
    pub fn apply_batch(content: &str, mut edits: Vec<Edit>) -> Result<String, EditError> {
        if edits.is_empty() {
            return Ok(content.to_string());
        }

        for edit in &edits {
            edit.validate(content)?;
        }

        edits.sort_by(|a, b| {
            b.byte_start
                .cmp(&a.byte_start)
                .then(b.byte_end.cmp(&a.byte_end))
        });

        // For non-overlapping regions: earlier edit's end <= later edit's start.
        // Two insertions at the same offset are ambiguous and count as overlap.
        for window in edits.windows(2) {
            let (later, earlier) = (&window[0], &window[1]);
            if earlier.byte_end > later.byte_start || earlier.byte_start == later.byte_start {
                return Err(EditError::Overlap {
                    byte_start: earlier.byte_start,
                    byte_end: later.byte_end,
                });
            }
        }

        let mut new_content = content.to_string();
        for edit in &edits {
            new_content.replace_range(edit.byte_start..edit.byte_end, &edit.new_text);
        }

        Ok(new_content)
    }
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or the destination is untouched.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EditError> {
    // Same directory keeps the rename on one filesystem
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_edit_verification_exact_match() {
        let text = "hello world";
        let verify = EditVerification::ExactMatch(text.to_string());
        assert!(verify.matches(text));
        assert!(!verify.matches("hello"));
    }

    #[test]
    fn test_edit_verification_hash() {
        let text = "hello world";
        let verify = EditVerification::Hash(xxh3_64(text.as_bytes()));
        assert!(verify.matches(text));
        assert!(!verify.matches("goodbye world"));
    }

    #[test]
    fn test_edit_verification_from_text_large() {
        let text = "x".repeat(2000);
        assert!(matches!(
            EditVerification::from_text(&text),
            EditVerification::Hash(_)
        ));
        assert!(matches!(
            EditVerification::from_text("small"),
            EditVerification::ExactMatch(_)
        ));
    }

    #[test]
    fn test_edit_invalid_range() {
        let edit = Edit::new(5, 20, "replacement", "");
        let result = edit.apply_to("hello world");
        assert!(matches!(result, Err(EditError::InvalidByteRange { .. })));

        let inverted = Edit::new(10, 5, "replacement", "");
        let result = inverted.apply_to("hello world");
        assert!(matches!(result, Err(EditError::InvalidByteRange { .. })));
    }

    #[test]
    fn test_edit_splits_char_boundary() {
        // "é" is two bytes
        let edit = Edit::new(1, 2, "x", "");
        let result = edit.apply_to("é");
        assert!(matches!(result, Err(EditError::InvalidUtf8Edit)));
    }

    #[test]
    fn test_edit_before_text_mismatch() {
        let edit = Edit::new(0, 5, "HELLO", "howdy");
        let result = edit.apply_to("hello world");
        assert!(matches!(result, Err(EditError::BeforeTextMismatch { .. })));
    }

    #[test]
    fn test_batch_edits_same_text() {
        let content = "line1\nline2\nline3\n";
        let edits = vec![
            Edit::new(0, 5, "LINE1", "line1"),
            Edit::new(12, 17, "LINE3", "line3"),
            Edit::new(6, 11, "LINE2", "line2"),
        ];

        let out = Edit::apply_batch(content, edits).unwrap();
        assert_eq!(out, "LINE1\nLINE2\nLINE3\n");
    }

    #[test]
    fn test_batch_rejects_overlap() {
        let edits = vec![Edit::new(0, 5, "a", "hello"), Edit::new(3, 8, "b", "lo wo")];
        let result = Edit::apply_batch("hello world", edits);
        assert!(matches!(result, Err(EditError::Overlap { .. })));
    }

    #[test]
    fn test_atomic_write_integration() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("out.txt");
        fs::write(&file_path, b"original content").unwrap();

        atomic_write(&file_path, b"modified content").unwrap();

        assert_eq!(fs::read_to_string(&file_path).unwrap(), "modified content");
    }
}

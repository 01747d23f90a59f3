//! Section locator - carves a marker-delimited region out of a document
//!
//! A section is found textually: the first start marker at or after a search
//! origin, then the first end marker after it. There is no parsing; if the
//! document's shape differs from what the markers assume, lookup fails with
//! [`LocateError::MarkerNotFound`].
//!
//! Sections have copy-and-splice semantics. [`Section::text`] is an owned copy;
//! callers mutate the copy and hand it back through [`Section::splice`], which
//! verifies the original subrange is still in place before replacing it.

use crate::edit::{Edit, EditError};
use std::fmt;
use thiserror::Error;

/// Minimum Jaro-Winkler similarity for a line to be offered as a suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// Which boundary of a section a marker delimits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerRole {
    Start,
    End,
}

impl fmt::Display for MarkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerRole::Start => write!(f, "start"),
            MarkerRole::End => write!(f, "end"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocateError {
    #[error("{role} marker {marker:?} not found (searched from byte {origin})")]
    MarkerNotFound {
        marker: String,
        role: MarkerRole,
        origin: usize,
        /// Closest line in the document, if any is similar enough
        suggestion: Option<String>,
    },
}

/// A contiguous subrange of a document, `[start, end)` in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub start: usize,
    pub end: usize,
    /// Copy of `document[start..end]` at locate time
    pub text: String,
}

impl Section {
    /// Text before the section, or `None` if `document` is too short or the
    /// offset is not a char boundary in it.
    pub fn prefix<'a>(&self, document: &'a str) -> Option<&'a str> {
        document.get(..self.start)
    }

    /// Text after the section. `None` under the same conditions as [`prefix`].
    ///
    /// [`prefix`]: Section::prefix
    pub fn suffix<'a>(&self, document: &'a str) -> Option<&'a str> {
        document.get(self.end..)
    }

    /// Replace this section's subrange in `document` with `rewritten`.
    ///
    /// Fails if the subrange no longer holds the text that was located.
    pub fn splice(&self, document: &str, rewritten: &str) -> Result<String, EditError> {
        Edit::new(self.start, self.end, rewritten, &self.text).apply_to(document)
    }
}

/// Locate the section between `start_marker` and `end_marker`.
///
/// The start marker is the first occurrence at or after `origin`; the end
/// marker is the first occurrence strictly after the start marker's position.
/// Only the first candidate region is ever addressed.
///
/// # Examples
///
/// ```
/// use anchor_patcher::section::locate;
///
/// let doc = "intro // A begin body // A end outro";
/// let section = locate(doc, "// A begin", "// A end", 0).unwrap();
/// assert_eq!(section.text, "// A begin body ");
/// assert_eq!(&doc[section.start..section.end], section.text);
/// ```
pub fn locate(
    document: &str,
    start_marker: &str,
    end_marker: &str,
    origin: usize,
) -> Result<Section, LocateError> {
    let start = document
        .get(origin..)
        .and_then(|tail| tail.find(start_marker))
        .map(|idx| origin + idx)
        .ok_or_else(|| marker_not_found(document, start_marker, MarkerRole::Start, origin))?;

    // Strictly after `start`: resume at the next char boundary.
    let end_origin = start + document[start..].chars().next().map_or(0, char::len_utf8);
    let end = document[end_origin..]
        .find(end_marker)
        .map(|idx| end_origin + idx)
        .ok_or_else(|| marker_not_found(document, end_marker, MarkerRole::End, end_origin))?;

    tracing::debug!(start, end, start_marker, end_marker, "located section");

    Ok(Section {
        start,
        end,
        text: document[start..end].to_string(),
    })
}

fn marker_not_found(document: &str, marker: &str, role: MarkerRole, origin: usize) -> LocateError {
    LocateError::MarkerNotFound {
        marker: marker.to_string(),
        role,
        origin,
        suggestion: closest_line(document, marker),
    }
}

/// Find the document line most similar to `marker`.
fn closest_line(document: &str, marker: &str) -> Option<String> {
    let marker = marker.trim();
    if marker.is_empty() {
        return None;
    }

    document
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| (strsim::jaro_winkler(marker, line), line))
        .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, line)| line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "head\n// A start\nbody a\n// A end\n// B start\nbody b\n// B end\ntail\n";

    #[test]
    fn test_locate_first_section() {
        let section = locate(DOC, "// A start", "// A end", 0).unwrap();
        assert_eq!(section.text, "// A start\nbody a\n");
        assert_eq!(section.start, 5);
        assert_eq!(section.end, section.start + section.text.len());
    }

    #[test]
    fn test_locate_reconstructs_document() {
        let section = locate(DOC, "// B start", "// B end", 0).unwrap();
        let rebuilt = format!(
            "{}{}{}",
            section.prefix(DOC).unwrap(),
            section.text,
            section.suffix(DOC).unwrap()
        );
        assert_eq!(rebuilt, DOC);
    }

    #[test]
    fn test_prefix_suffix_on_foreign_document() {
        let section = locate(DOC, "// B start", "// B end", 0).unwrap();
        assert_eq!(section.prefix("short"), None);
        assert_eq!(section.suffix("short"), None);
        // Offset 5 falls inside the first multi-byte char.
        let korean = "가나다라마바사아자차카타파하";
        let section = Section {
            start: 1,
            end: 5,
            text: String::new(),
        };
        assert_eq!(section.prefix(korean), None);
        assert_eq!(section.suffix(korean), None);
    }

    #[test]
    fn test_end_marker_searched_after_start() {
        // "// A end" appears before the start marker; the later one wins.
        let doc = "// A end\n// A start\nx\n// A end\n";
        let section = locate(doc, "// A start", "// A end", 0).unwrap();
        assert_eq!(section.text, "// A start\nx\n");
    }

    #[test]
    fn test_first_candidate_only() {
        let doc = "[s]one[e][s]two[e]";
        let section = locate(doc, "[s]", "[e]", 0).unwrap();
        assert_eq!(section.text, "[s]one");
    }

    #[test]
    fn test_origin_skips_earlier_regions() {
        let doc = "[s]one[e][s]two[e]";
        let section = locate(doc, "[s]", "[e]", 1).unwrap();
        assert_eq!(section.text, "[s]two");
        assert_eq!(section.start, 9);
    }

    #[test]
    fn test_missing_start_marker() {
        let err = locate(DOC, "// C start", "// C end", 0).unwrap_err();
        match err {
            LocateError::MarkerNotFound {
                marker,
                role,
                origin,
                ..
            } => {
                assert_eq!(marker, "// C start");
                assert_eq!(role, MarkerRole::Start);
                assert_eq!(origin, 0);
            }
        }
    }

    #[test]
    fn test_missing_end_marker_reports_search_origin() {
        let err = locate(DOC, "// B start", "// Z end", 0).unwrap_err();
        let LocateError::MarkerNotFound { role, origin, .. } = err;
        assert_eq!(role, MarkerRole::End);
        assert_eq!(origin, DOC.find("// B start").unwrap() + 1);
    }

    #[test]
    fn test_origin_out_of_bounds() {
        let err = locate(DOC, "head", "tail", DOC.len() + 10).unwrap_err();
        let LocateError::MarkerNotFound { role, .. } = err;
        assert_eq!(role, MarkerRole::Start);
    }

    #[test]
    fn test_suggestion_for_near_miss() {
        let err = locate(DOC, "// A strat", "// A end", 0).unwrap_err();
        let LocateError::MarkerNotFound { suggestion, .. } = err;
        assert_eq!(suggestion.as_deref(), Some("// A start"));
    }

    #[test]
    fn test_no_suggestion_for_unrelated_marker() {
        let err = locate(DOC, "zzzzzzzzzzzzzzzzzzzz", "// A end", 0).unwrap_err();
        let LocateError::MarkerNotFound { suggestion, .. } = err;
        assert!(suggestion.is_none());
    }

    #[test]
    fn test_splice_replaces_section() {
        let section = locate(DOC, "// A start", "// A end", 0).unwrap();
        let rewritten = section.text.replace("body a", "body a\nextra");
        let out = section.splice(DOC, &rewritten).unwrap();
        assert!(out.contains("body a\nextra\n// A end"));
        assert_eq!(out.len(), DOC.len() + "\nextra".len());
    }

    #[test]
    fn test_splice_detects_stale_section() {
        let section = locate(DOC, "// A start", "// A end", 0).unwrap();
        let changed = DOC.replace("body a", "BODY A");
        assert!(section.splice(&changed, "x").is_err());
    }

    #[test]
    fn test_multibyte_markers() {
        let doc = "// 네이버 로그인 콜백\n코드\n// 구글 로그인 시작\n";
        let section = locate(doc, "// 네이버 로그인 콜백", "// 구글 로그인 시작", 0).unwrap();
        assert_eq!(section.text, "// 네이버 로그인 콜백\n코드\n");
    }
}

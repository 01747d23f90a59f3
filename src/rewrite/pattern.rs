//! Compiling tokens patterns into whitespace-tolerant regexes.

use crate::rewrite::RewriteError;

/// Wildcard token: matches any text, lazily, across lines.
pub const WILDCARD: &str = "$$$";

/// Build the regex source for a tokens pattern.
///
/// The result has three named groups: `lead`, `gap` (the whitespace between
/// lead and anchor) and `anchor`. Dot matches newline so `$$$` can span lines.
/// A side that starts or ends with a word character is anchored at a word
/// boundary there, and the gap is mandatory when it separates two words.
pub fn tokens_regex(lead: &str, anchor: &str) -> Result<String, RewriteError> {
    let lead = lead.trim();
    let anchor = anchor.trim();
    let lead_re = side_regex(lead);
    let anchor_re = side_regex(anchor);
    if lead_re.is_empty() && anchor_re.is_empty() {
        return Err(RewriteError::EmptyPattern);
    }

    let joins_words = lead.chars().next_back().is_some_and(is_word)
        && anchor.chars().next().is_some_and(is_word);
    let gap = if joins_words { r"\s+" } else { r"\s*" };

    Ok(format!(
        r"(?s)(?P<lead>{lead_re})(?P<gap>{gap})(?P<anchor>{anchor_re})"
    ))
}

/// Escape `$` so text is inserted literally by `Captures::expand`.
pub fn escape_template(text: &str) -> String {
    text.replace('$', "$$")
}

fn side_regex(side: &str) -> String {
    let side = side.trim();
    let body = side
        .split(WILDCARD)
        .map(|piece| flexible_literal(piece.trim()))
        .collect::<Vec<_>>()
        .join(".*?");
    if body.is_empty() {
        return body;
    }

    let open = if side.chars().next().is_some_and(is_word) { r"\b" } else { "" };
    let close = if side.chars().next_back().is_some_and(is_word) { r"\b" } else { "" };
    format!("{open}{body}{close}")
}

/// Escape a literal, turning each interior whitespace run into `\s+` between
/// two word characters and `\s*` anywhere else.
fn flexible_literal(piece: &str) -> String {
    let mut out = String::with_capacity(piece.len() * 2);
    let mut prev: Option<char> = None;
    let mut chars = piece.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_whitespace() {
            while chars.peek().is_some_and(|n| n.is_whitespace()) {
                chars.next();
            }
            let next = chars.peek().copied();
            match (prev, next) {
                (Some(p), Some(n)) if is_word(p) && is_word(n) => out.push_str(r"\s+"),
                _ => out.push_str(r"\s*"),
            }
            continue;
        }
        let mut buf = [0u8; 4];
        out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
        prev = Some(c);
    }

    out
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

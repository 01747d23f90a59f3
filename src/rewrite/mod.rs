//! Pattern rewriter - whitespace-tolerant locate and insert.
//!
//! Rules locate an anchor with a regex and rebuild each match from a template
//! that echoes the captured groups around newly inserted text. Two pattern
//! forms are supported:
//!
//! - **tokens**: literal source split into a `lead` and an `anchor`. Whitespace
//!   runs are flexible and `$$$` matches anything. The insertion goes between
//!   the lead and the whitespace gap before the anchor.
//! - **regex**: a raw pattern plus a `$1`/`${name}` template.
//!
//! Every rewritten match is turned into an [`Edit`] and the batch is applied
//! bottom-to-top, so a failed rewrite never leaves partial edits behind.

pub mod errors;
pub mod pattern;

pub use errors::RewriteError;
pub use pattern::{escape_template, tokens_regex};

use crate::cache;
use crate::edit::Edit;
use regex::{Captures, Regex};

/// Output of a rewrite pass.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Rewrite carries the new text and the match count"]
pub struct Rewrite {
    pub text: String,
    /// Number of matches rewritten (bounded by `max_replacements`)
    pub count: usize,
    /// Bytes added across all matches
    pub inserted: usize,
}

/// Rewrite up to `max_replacements` non-overlapping matches of `pattern`.
///
/// `max_replacements == 0` rewrites every match. When nothing matches the
/// input is returned unchanged with `count == 0`; that is not an error here.
pub fn rewrite(
    text: &str,
    pattern: &Regex,
    template: &str,
    max_replacements: usize,
) -> Result<Rewrite, RewriteError> {
    let limit = if max_replacements == 0 {
        usize::MAX
    } else {
        max_replacements
    };

    let mut edits = Vec::new();
    let mut inserted = 0;
    for caps in pattern.captures_iter(text).take(limit) {
        let Some(whole) = caps.get(0) else {
            continue;
        };

        let mut expansion = String::new();
        caps.expand(template, &mut expansion);
        check_preserved(pattern, &caps, &expansion)?;
        inserted += expansion.len().saturating_sub(whole.len());

        edits.push(Edit::new(
            whole.start(),
            whole.end(),
            expansion,
            whole.as_str(),
        ));
    }

    let count = edits.len();
    tracing::debug!(pattern = pattern.as_str(), count, inserted, "rewrite pass");
    if count == 0 {
        return Ok(Rewrite {
            text: text.to_string(),
            count,
            inserted,
        });
    }

    let text = Edit::apply_batch(text, edits)?;
    Ok(Rewrite {
        text,
        count,
        inserted,
    })
}

/// Every non-empty capture must reappear, unmodified and in order, in the
/// expansion, and the match may hold nothing but whitespace outside its
/// captures. Rules may only add text around what they matched.
fn check_preserved(
    pattern: &Regex,
    caps: &Captures<'_>,
    expansion: &str,
) -> Result<(), RewriteError> {
    let Some(whole) = caps.get(0) else {
        return Ok(());
    };

    let mut cursor = 0;
    // End of the last outermost group; nested groups are covered by it.
    let mut covered = whole.start();
    for (idx, name) in pattern.capture_names().enumerate().skip(1) {
        let Some(group) = caps.get(idx) else {
            continue;
        };
        if group.start() < covered {
            covered = covered.max(group.end());
            continue;
        }
        let between = &whole.as_str()[covered - whole.start()..group.start() - whole.start()];
        check_uncaptured(between)?;
        covered = group.end();

        if group.is_empty() {
            continue;
        }
        match expansion[cursor..].find(group.as_str()) {
            Some(pos) => cursor += pos + group.len(),
            None => {
                return Err(RewriteError::InsertionViolation {
                    group: name.map_or_else(|| idx.to_string(), str::to_string),
                    text: group.as_str().to_string(),
                })
            }
        }
    }
    check_uncaptured(&whole.as_str()[covered - whole.start()..])
}

/// Matched text outside every group is dropped by the expansion.
fn check_uncaptured(span: &str) -> Result<(), RewriteError> {
    if span.trim().is_empty() {
        Ok(())
    } else {
        Err(RewriteError::UncapturedText {
            text: span.to_string(),
        })
    }
}

/// A compiled locate pattern paired with its replacement template.
#[derive(Debug, Clone)]
pub struct Rewriter {
    regex: Regex,
    template: String,
}

impl Rewriter {
    /// Build a rewriter that inserts `insert` between `lead` and `anchor`.
    ///
    /// # Examples
    ///
    /// ```
    /// use anchor_patcher::rewrite::Rewriter;
    ///
    /// let rw = Rewriter::tokens("update(id);", "return", "\nlog(id);").unwrap();
    /// let out = rw.apply("update(id);\n  return", 1).unwrap();
    /// assert_eq!(out.text, "update(id);\nlog(id);\n  return");
    /// ```
    pub fn tokens(lead: &str, anchor: &str, insert: &str) -> Result<Self, RewriteError> {
        let source = tokens_regex(lead, anchor)?;
        let template = format!("${{lead}}{}${{gap}}${{anchor}}", escape_template(insert));
        Self::compile(&source, template)
    }

    /// Build a rewriter from a raw regex and a capture-echoing template.
    ///
    /// The pattern needs at least one capture group: a template can only
    /// reproduce matched text through its groups.
    pub fn regex(pattern: &str, template: &str) -> Result<Self, RewriteError> {
        let rewriter = Self::compile(pattern, template.to_string())?;
        if rewriter.regex.captures_len() < 2 {
            return Err(RewriteError::NoCaptureGroup {
                pattern: pattern.to_string(),
            });
        }
        Ok(rewriter)
    }

    fn compile(source: &str, template: String) -> Result<Self, RewriteError> {
        let regex = cache::get_or_compile(source).map_err(|source_err| {
            RewriteError::InvalidPattern {
                pattern: source.to_string(),
                source: source_err,
            }
        })?;
        Ok(Self { regex, template })
    }

    pub fn apply(&self, text: &str, max_replacements: usize) -> Result<Rewrite, RewriteError> {
        rewrite(text, &self.regex, &self.template, max_replacements)
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// The compiled regex source.
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn template(&self) -> &str {
        &self.template
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN: &str = r#"    // update last login
    await c.env.DB.prepare(
      'UPDATE users SET last_login_at = CURRENT_TIMESTAMP WHERE id = ?'
    ).bind(user.id).run();

    // create JWT
    const token = sign(user);
"#;

    #[test]
    fn test_tokens_insert_before_anchor() {
        let rw = Rewriter::tokens(
            "await c.env.DB.prepare( 'UPDATE users SET last_login_at = CURRENT_TIMESTAMP WHERE id = ?' ).bind(user.id).run();",
            "// create JWT",
            "\n\n    await logUserLogin(user.id);",
        )
        .unwrap();

        let out = rw.apply(LOGIN, 1).unwrap();
        assert_eq!(out.count, 1);
        assert_eq!(out.inserted, "\n\n    await logUserLogin(user.id);".len());
        assert!(out
            .text
            .contains(".run();\n\n    await logUserLogin(user.id);\n\n    // create JWT"));
        assert_eq!(out.text.replace("\n\n    await logUserLogin(user.id);", ""), LOGIN);
    }

    #[test]
    fn test_tokens_whitespace_flexible() {
        let rw = Rewriter::tokens("foo( a, b );", "", "\nbar();").unwrap();
        let out = rw.apply("foo(\n   a,\n   b\n);", 1).unwrap();
        assert_eq!(out.count, 1);
        assert_eq!(out.text, "foo(\n   a,\n   b\n);\nbar();");
    }

    #[test]
    fn test_tokens_word_gap_requires_whitespace() {
        let rw = Rewriter::tokens("} else {", "", " x").unwrap();
        assert!(rw.is_match("}\n  else  {"));
        let keyword = Rewriter::tokens("return value;", "", " x").unwrap();
        assert!(!keyword.is_match("returnvalue;"));
    }

    #[test]
    fn test_tokens_never_insert_mid_identifier() {
        let rw = Rewriter::tokens("let total = count", "", "; log()").unwrap();
        let out = rw.apply("let total = counter;", 1).unwrap();
        assert_eq!(out.count, 0);
        assert_eq!(out.text, "let total = counter;");

        let rw = Rewriter::tokens("return", "value", " X ").unwrap();
        assert!(!rw.is_match("returnvalue;"));
        let out = rw.apply("return value;", 1).unwrap();
        assert_eq!(out.text, "return X  value;");
    }

    #[test]
    fn test_tokens_wildcard_spans_lines() {
        let rw = Rewriter::tokens("// admin lookup $$$ .run();", "// create JWT", "\nlog();")
            .unwrap();
        let doc = "// admin lookup\nconst u = 1;\nawait q.run();\n// create JWT\n";
        let out = rw.apply(doc, 1).unwrap();
        assert_eq!(
            out.text,
            "// admin lookup\nconst u = 1;\nawait q.run();\nlog();\n// create JWT\n"
        );
    }

    #[test]
    fn test_tokens_dollar_in_insert_is_literal() {
        let rw = Rewriter::tokens("a;", "", " cost = `$1 ${x}`;").unwrap();
        let out = rw.apply("a;", 1).unwrap();
        assert_eq!(out.text, "a; cost = `$1 ${x}`;");
    }

    #[test]
    fn test_tokens_regex_metachars_are_literal() {
        let rw = Rewriter::tokens("x.bind(?)", "", "!").unwrap();
        assert!(!rw.is_match("xAbind(?)"));
        assert!(rw.is_match("x.bind(?)"));
    }

    #[test]
    fn test_empty_tokens_rejected() {
        assert!(matches!(
            Rewriter::tokens("  ", "", "x"),
            Err(RewriteError::EmptyPattern)
        ));
    }

    #[test]
    fn test_first_match_only() {
        let rw = Rewriter::tokens("step();", "", "\nlog();").unwrap();
        let out = rw.apply("step();\nstep();\n", 1).unwrap();
        assert_eq!(out.count, 1);
        assert_eq!(out.text, "step();\nlog();\nstep();\n");
    }

    #[test]
    fn test_unbounded_replacements() {
        let rw = Rewriter::tokens("step();", "", "\nlog();").unwrap();
        let out = rw.apply("step();\nstep();\n", 0).unwrap();
        assert_eq!(out.count, 2);
        assert_eq!(out.text, "step();\nlog();\nstep();\nlog();\n");
    }

    #[test]
    fn test_no_match_is_identity() {
        let rw = Rewriter::tokens("missing();", "", "\nlog();").unwrap();
        let out = rw.apply(LOGIN, 1).unwrap();
        assert_eq!(out.count, 0);
        assert_eq!(out.text, LOGIN);
    }

    #[test]
    fn test_regex_template_echoes_groups() {
        let rw = Rewriter::regex(r"(user = load\(\);)\s+(\})", "$1\n  log(user);\n$2").unwrap();
        let out = rw.apply("if (x) {\n  user = load();\n}", 1).unwrap();
        assert_eq!(out.text, "if (x) {\n  user = load();\n  log(user);\n}");
    }

    #[test]
    fn test_regex_template_dropping_group_is_rejected() {
        let rw = Rewriter::regex(r"(a)(b)", "${1}X").unwrap();
        let err = rw.apply("ab", 1).unwrap_err();
        assert!(matches!(err, RewriteError::InsertionViolation { ref group, .. } if group == "2"));
    }

    #[test]
    fn test_regex_template_reordering_is_rejected() {
        let rw = Rewriter::regex(r"(?P<first>a)(?P<second>b)", "${second}${first}").unwrap();
        let err = rw.apply("ab", 1).unwrap_err();
        assert!(matches!(err, RewriteError::InsertionViolation { .. }));
    }

    #[test]
    fn test_regex_without_groups_is_rejected() {
        let err = Rewriter::regex(r"await verifyPassword\(user\);", "log();").unwrap_err();
        assert!(matches!(err, RewriteError::NoCaptureGroup { .. }));
    }

    #[test]
    fn test_uncaptured_code_cannot_be_dropped() {
        let rw = Rewriter::regex(r"await verifyPassword\(user\);\s*(return ok;)", "log();\n$1")
            .unwrap();
        let doc = "await verifyPassword(user);\nreturn ok;\n";
        let err = rw.apply(doc, 1).unwrap_err();
        assert!(matches!(
            err,
            RewriteError::UncapturedText { ref text } if text.starts_with("await verifyPassword")
        ));
    }

    #[test]
    fn test_groupless_pattern_rejected_by_rewrite() {
        let re = Regex::new(r"verify\(\);").unwrap();
        let err = rewrite("verify();", &re, "", 1).unwrap_err();
        assert!(matches!(err, RewriteError::UncapturedText { .. }));
    }

    #[test]
    fn test_uncaptured_whitespace_may_change() {
        let rw = Rewriter::regex(r"(a;)\s+(b;)", "$1 log(); $2").unwrap();
        let out = rw.apply("a;\n\n b;", 1).unwrap();
        assert_eq!(out.text, "a; log(); b;");
    }

    #[test]
    fn test_nested_groups_are_preserved_once() {
        let rw = Rewriter::regex(r"((x)\.run\(\);)", "$1 log();").unwrap();
        let out = rw.apply("x.run();", 1).unwrap();
        assert_eq!(out.text, "x.run(); log();");
    }

    #[test]
    fn test_invalid_regex() {
        assert!(matches!(
            Rewriter::regex("(unclosed", "$1"),
            Err(RewriteError::InvalidPattern { .. })
        ));
    }
}

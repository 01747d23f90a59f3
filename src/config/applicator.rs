//! Rule driver - threads a document through a rule table
//!
//! This module provides the pure transformation that:
//! - Applies whole-document rules first, in table order
//! - Visits each area in table order: locate → rewrite → splice
//! - Parameterizes area-scoped rules with the area's placeholder values
//! - Enforces the required/optional policy for rules that match nothing
//!
//! Offsets are never cached across a splice: each area is located fresh
//! against the document as left by the previous area.

use crate::config::params::{self, Params};
use crate::config::schema::{AreaDefinition, Locate, RuleDefinition, RuleTable};
use crate::edit::EditError;
use crate::rewrite::{escape_template, RewriteError, Rewriter};
use crate::section::{locate, LocateError};
use std::fmt;
use xxhash_rust::xxh3::xxh3_64;

/// What a single rule did in a single scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    /// Rule matched and inserted `count` times
    Applied { count: usize },
    /// Optional rule matched nothing
    Skipped,
}

impl fmt::Display for RuleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleOutcome::Applied { count } => write!(f, "applied ({count} insertion(s))"),
            RuleOutcome::Skipped => write!(f, "skipped (no match, optional)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleReport {
    pub rule: String,
    /// `None` for whole-document rules
    pub area: Option<String>,
    pub outcome: RuleOutcome,
}

/// Result of a successful transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Transformed carries the patched document"]
pub struct Transformed {
    pub document: String,
    /// One entry per (rule, scope), in application order
    pub reports: Vec<RuleReport>,
    /// xxh3 of the input document
    pub input_hash: u64,
    /// xxh3 of the output document
    pub output_hash: u64,
}

impl Transformed {
    pub fn changed(&self) -> bool {
        self.input_hash != self.output_hash
    }

    pub fn insertions(&self) -> usize {
        self.reports
            .iter()
            .map(|report| match report.outcome {
                RuleOutcome::Applied { count } => count,
                RuleOutcome::Skipped => 0,
            })
            .sum()
    }

    pub fn skipped(&self) -> usize {
        self.reports
            .iter()
            .filter(|report| report.outcome == RuleOutcome::Skipped)
            .count()
    }
}

/// Errors that abort a transformation
#[derive(Debug)]
pub enum ApplicationError {
    /// An area's boundary marker is missing from the current document
    Locate { area: String, source: LocateError },
    /// A rule failed to compile or violated the insert-only invariant
    Rewrite {
        rule: String,
        area: Option<String>,
        source: RewriteError,
    },
    /// A rule references a placeholder its scope does not bind
    UnboundPlaceholder {
        rule: String,
        area: Option<String>,
        name: String,
    },
    /// A required rule matched nothing
    RequiredRuleUnmatched { rule: String, area: Option<String> },
    /// A rewritten section could not be spliced back
    Splice { area: String, source: EditError },
}

fn scope_label(area: &Option<String>) -> String {
    match area {
        Some(area) => format!("area '{area}'"),
        None => "document".to_string(),
    }
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationError::Locate { area, source } => {
                write!(f, "cannot locate area '{}': {}", area, source)
            }
            ApplicationError::Rewrite { rule, area, source } => {
                write!(
                    f,
                    "rule '{}' failed in {}: {}",
                    rule,
                    scope_label(area),
                    source
                )
            }
            ApplicationError::UnboundPlaceholder { rule, area, name } => {
                write!(
                    f,
                    "rule '{}' uses unbound placeholder '{}' in {}",
                    rule,
                    name,
                    scope_label(area)
                )
            }
            ApplicationError::RequiredRuleUnmatched { rule, area } => {
                write!(
                    f,
                    "required rule '{}' matched no locations in {}",
                    rule,
                    scope_label(area)
                )
            }
            ApplicationError::Splice { area, source } => {
                write!(f, "failed to splice area '{}': {}", area, source)
            }
        }
    }
}

impl std::error::Error for ApplicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApplicationError::Locate { source, .. } => Some(source),
            ApplicationError::Rewrite { source, .. } => Some(source),
            ApplicationError::Splice { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Apply a rule table to a document.
///
/// Pure: the input is not modified and nothing touches the filesystem. On
/// error no partial document is returned, so callers cannot persist a
/// half-patched result by accident.
///
/// # Examples
///
/// ```
/// use anchor_patcher::config::{load_from_str, transform};
///
/// let table = load_from_str(r#"
/// [[rules]]
/// id = "log-after-update"
///
/// [rules.locate]
/// type = "tokens"
/// lead = "await update(id);"
///
/// [rules.insert]
/// text = "\nawait log(id);"
/// "#).unwrap();
///
/// let out = transform("await update(id);\nreturn;\n", &table).unwrap();
/// assert_eq!(out.document, "await update(id);\nawait log(id);\nreturn;\n");
/// ```
pub fn transform(document: &str, table: &RuleTable) -> Result<Transformed, ApplicationError> {
    let no_params = Params::new();
    let mut current = document.to_string();
    let mut reports = Vec::new();

    for rule in table.global_rules() {
        let (next, outcome) = apply_rule(rule, None, &no_params, &current)?;
        current = next;
        reports.push(RuleReport {
            rule: rule.id.clone(),
            area: None,
            outcome,
        });
    }

    for area in &table.areas {
        current = apply_area(table, area, &current, &mut reports)?;
    }

    let input_hash = xxh3_64(document.as_bytes());
    let output_hash = xxh3_64(current.as_bytes());
    tracing::info!(
        input_hash = format_args!("{input_hash:016x}"),
        output_hash = format_args!("{output_hash:016x}"),
        rules = reports.len(),
        "transform complete"
    );

    Ok(Transformed {
        document: current,
        reports,
        input_hash,
        output_hash,
    })
}

/// Locate one area, run its rules on the section copy, splice it back.
fn apply_area(
    table: &RuleTable,
    area: &AreaDefinition,
    document: &str,
    reports: &mut Vec<RuleReport>,
) -> Result<String, ApplicationError> {
    let section =
        locate(document, &area.start, &area.end, 0).map_err(|source| ApplicationError::Locate {
            area: area.name.clone(),
            source,
        })?;

    tracing::debug!(
        area = %area.name,
        start = section.start,
        end = section.end,
        "processing area"
    );

    let mut text = section.text.clone();
    for rule in table.rules_for(&area.name) {
        let (next, outcome) = apply_rule(rule, Some(&area.name), &area.params, &text)?;
        text = next;
        reports.push(RuleReport {
            rule: rule.id.clone(),
            area: Some(area.name.clone()),
            outcome,
        });
    }

    section
        .splice(document, &text)
        .map_err(|source| ApplicationError::Splice {
            area: area.name.clone(),
            source,
        })
}

fn apply_rule(
    rule: &RuleDefinition,
    area: Option<&str>,
    params: &Params,
    text: &str,
) -> Result<(String, RuleOutcome), ApplicationError> {
    let area_name = area.map(str::to_string);
    let rewriter = compile_rule(rule, area, params)?;
    tracing::trace!(
        rule = %rule.id,
        area = ?area,
        pattern = rewriter.pattern(),
        template = rewriter.template(),
        "compiled rule"
    );

    let rewrite = rewriter
        .apply(text, rule.max_replacements)
        .map_err(|source| ApplicationError::Rewrite {
            rule: rule.id.clone(),
            area: area_name.clone(),
            source,
        })?;

    if rewrite.count == 0 {
        if rule.required {
            return Err(ApplicationError::RequiredRuleUnmatched {
                rule: rule.id.clone(),
                area: area_name,
            });
        }
        tracing::warn!(rule = %rule.id, area = ?area, "optional rule matched nothing");
        return Ok((rewrite.text, RuleOutcome::Skipped));
    }

    tracing::info!(rule = %rule.id, area = ?area, count = rewrite.count, "rule applied");
    Ok((
        rewrite.text,
        RuleOutcome::Applied {
            count: rewrite.count,
        },
    ))
}

/// Substitute the scope's params into the rule and compile it.
pub fn compile_rule(
    rule: &RuleDefinition,
    area: Option<&str>,
    params: &Params,
) -> Result<Rewriter, ApplicationError> {
    let unbound = |name: String| ApplicationError::UnboundPlaceholder {
        rule: rule.id.clone(),
        area: area.map(str::to_string),
        name,
    };
    let rewrite_err = |source: RewriteError| ApplicationError::Rewrite {
        rule: rule.id.clone(),
        area: area.map(str::to_string),
        source,
    };

    match &rule.locate {
        Locate::Tokens { lead, anchor } => {
            let lead = params::substitute_literal(lead, params).map_err(unbound)?;
            let anchor = params::substitute_literal(anchor, params).map_err(unbound)?;
            let insert = params::substitute_literal(
                rule.insert.text.as_deref().unwrap_or_default(),
                params,
            )
            .map_err(unbound)?;
            Rewriter::tokens(&lead, &anchor, &insert).map_err(rewrite_err)
        }
        Locate::Regex { pattern } => {
            let pattern = params::substitute(pattern, params, regex::escape).map_err(unbound)?;
            let template = params::substitute(
                rule.insert.template.as_deref().unwrap_or_default(),
                params,
                escape_template,
            )
            .map_err(unbound)?;
            Rewriter::regex(&pattern, &template).map_err(rewrite_err)
        }
    }
}

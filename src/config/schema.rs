use crate::config::params;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct RuleTable {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub areas: Vec<AreaDefinition>,
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
    /// Directory that relative `meta.source` / `meta.output` resolve against.
    /// Set by the loader, never read from TOML.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl RuleTable {
    /// Rules that run against the whole document, in table order.
    pub fn global_rules(&self) -> impl Iterator<Item = &RuleDefinition> {
        self.rules.iter().filter(|rule| rule.areas.is_empty())
    }

    /// Rules scoped to `area`, in table order.
    pub fn rules_for<'a>(&'a self, area: &'a str) -> impl Iterator<Item = &'a RuleDefinition> {
        self.rules
            .iter()
            .filter(move |rule| rule.areas.iter().any(|name| name == area))
    }

    pub fn area(&self, name: &str) -> Option<&AreaDefinition> {
        self.areas.iter().find(|area| area.name == name)
    }

    /// Append another table's areas and rules. Metadata of `self` wins
    /// field-by-field when both are set.
    pub fn merge(&mut self, other: RuleTable) {
        if self.meta.name.is_empty() {
            self.meta.name = other.meta.name;
        }
        self.meta.description = self.meta.description.take().or(other.meta.description);
        self.meta.source = self.meta.source.take().or(other.meta.source);
        self.meta.output = self.meta.output.take().or(other.meta.output);
        self.areas.extend(other.areas);
        self.rules.extend(other.rules);
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.rules.is_empty() {
            issues.push(ValidationIssue::EmptyRuleList);
        }

        let mut area_names = HashSet::new();
        for area in &self.areas {
            if area.name.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    owner: None,
                    field: "areas.name",
                });
            } else if !area_names.insert(area.name.as_str()) {
                issues.push(ValidationIssue::DuplicateId {
                    kind: "area",
                    id: area.name.clone(),
                });
            }
            if area.start.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    owner: Some(area.name.clone()),
                    field: "start",
                });
            }
            if area.end.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    owner: Some(area.name.clone()),
                    field: "end",
                });
            }
        }

        let mut rule_ids = HashSet::new();
        for rule in &self.rules {
            if rule.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    owner: None,
                    field: "id",
                });
            } else if !rule_ids.insert(rule.id.as_str()) {
                issues.push(ValidationIssue::DuplicateId {
                    kind: "rule",
                    id: rule.id.clone(),
                });
            }

            self.validate_rule(rule, &mut issues);
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    fn validate_rule(&self, rule: &RuleDefinition, issues: &mut Vec<ValidationIssue>) {
        let owner = Some(rule.id.clone());

        match &rule.locate {
            Locate::Tokens { lead, anchor } => {
                if lead.trim().is_empty() && anchor.trim().is_empty() {
                    issues.push(ValidationIssue::MissingField {
                        owner: owner.clone(),
                        field: "locate.lead",
                    });
                }
                if rule.insert.template.is_some() {
                    issues.push(ValidationIssue::InvalidCombo {
                        owner: owner.clone(),
                        message: "tokens locate takes insert.text, not insert.template"
                            .to_string(),
                    });
                }
                if rule.insert.text.as_deref().unwrap_or("").is_empty() {
                    issues.push(ValidationIssue::MissingField {
                        owner: owner.clone(),
                        field: "insert.text",
                    });
                }
            }
            Locate::Regex { pattern } => {
                if pattern.trim().is_empty() {
                    issues.push(ValidationIssue::MissingField {
                        owner: owner.clone(),
                        field: "locate.pattern",
                    });
                } else {
                    check_regex(&rule.id, pattern, issues);
                }
                if rule.insert.text.is_some() {
                    issues.push(ValidationIssue::InvalidCombo {
                        owner: owner.clone(),
                        message: "regex locate takes insert.template, not insert.text"
                            .to_string(),
                    });
                }
                if rule.insert.template.as_deref().unwrap_or("").is_empty() {
                    issues.push(ValidationIssue::MissingField {
                        owner: owner.clone(),
                        field: "insert.template",
                    });
                }
            }
        }

        let placeholders = rule.placeholders();

        if rule.areas.is_empty() {
            for name in placeholders {
                issues.push(ValidationIssue::UnboundPlaceholder {
                    rule: rule.id.clone(),
                    area: None,
                    name,
                });
            }
            return;
        }

        for area_name in &rule.areas {
            let Some(area) = self.area(area_name) else {
                issues.push(ValidationIssue::UnknownArea {
                    rule: rule.id.clone(),
                    area: area_name.clone(),
                });
                continue;
            };
            for name in &placeholders {
                if !area.params.contains_key(name) {
                    issues.push(ValidationIssue::UnboundPlaceholder {
                        rule: rule.id.clone(),
                        area: Some(area.name.clone()),
                        name: name.clone(),
                    });
                }
            }
        }
    }
}

/// Compile a regex locate pattern with every placeholder bound to an empty
/// value. A template can only echo matched text through groups, so a pattern
/// without any would replace what it matched.
fn check_regex(rule: &str, pattern: &str, issues: &mut Vec<ValidationIssue>) {
    let blanks: params::Params = params::placeholders(pattern)
        .into_iter()
        .map(|name| (name, String::new()))
        .collect();
    let Ok(source) = params::substitute_literal(pattern, &blanks) else {
        return;
    };

    match Regex::new(&source) {
        Ok(regex) if regex.captures_len() < 2 => {
            issues.push(ValidationIssue::NoCaptureGroup {
                rule: rule.to_string(),
            });
        }
        Ok(_) => {}
        Err(err) => issues.push(ValidationIssue::InvalidPattern {
            rule: rule.to_string(),
            message: err.to_string(),
        }),
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Source (backup) file, relative to the rule file
    #[serde(default)]
    pub source: Option<String>,
    /// Destination file, relative to the rule file
    #[serde(default)]
    pub output: Option<String>,
}

/// A named region of the document between two literal markers.
#[derive(Debug, Deserialize, Clone)]
pub struct AreaDefinition {
    pub name: String,
    pub start: String,
    pub end: String,
    /// Values substituted for `{{name}}` placeholders in this area's rules
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RuleDefinition {
    pub id: String,
    /// Areas this rule is scoped to; empty means the whole document
    #[serde(default)]
    pub areas: Vec<String>,
    /// Whether zero matches aborts the run
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default = "default_max_replacements")]
    pub max_replacements: usize,
    pub locate: Locate,
    pub insert: Insert,
}

fn default_required() -> bool {
    true
}

fn default_max_replacements() -> usize {
    1
}

impl RuleDefinition {
    /// Placeholder names referenced anywhere in the rule.
    pub fn placeholders(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        let fields = match &self.locate {
            Locate::Tokens { lead, anchor } => vec![lead.as_str(), anchor.as_str()],
            Locate::Regex { pattern } => vec![pattern.as_str()],
        };
        for field in fields
            .into_iter()
            .chain(self.insert.text.as_deref())
            .chain(self.insert.template.as_deref())
        {
            names.extend(params::placeholders(field));
        }
        names
    }

    pub fn scope(&self) -> Scope<'_> {
        if self.areas.is_empty() {
            Scope::Document
        } else {
            Scope::Areas(&self.areas)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope<'a> {
    Document,
    Areas(&'a [String]),
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Locate {
    /// Literal source with flexible whitespace and `$$$` wildcards
    Tokens {
        #[serde(default)]
        lead: String,
        #[serde(default)]
        anchor: String,
    },
    /// Raw regex; pair with `insert.template`
    Regex { pattern: String },
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Insert {
    /// Text inserted between lead and anchor (tokens)
    #[serde(default)]
    pub text: Option<String>,
    /// Replacement template echoing captures (regex)
    #[serde(default)]
    pub template: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptyRuleList,
    MissingField {
        owner: Option<String>,
        field: &'static str,
    },
    InvalidCombo {
        owner: Option<String>,
        message: String,
    },
    DuplicateId {
        kind: &'static str,
        id: String,
    },
    UnknownArea {
        rule: String,
        area: String,
    },
    UnboundPlaceholder {
        rule: String,
        area: Option<String>,
        name: String,
    },
    InvalidPattern {
        rule: String,
        message: String,
    },
    NoCaptureGroup {
        rule: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyRuleList => write!(f, "rule table contains no rules"),
            ValidationIssue::MissingField { owner, field } => match owner {
                Some(id) => write!(f, "'{id}' missing required field '{field}'"),
                None => write!(f, "entry missing required field '{field}'"),
            },
            ValidationIssue::InvalidCombo { owner, message } => match owner {
                Some(id) => write!(f, "rule '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid rule configuration: {message}"),
            },
            ValidationIssue::DuplicateId { kind, id } => {
                write!(f, "duplicate {kind} '{id}'")
            }
            ValidationIssue::UnknownArea { rule, area } => {
                write!(f, "rule '{rule}' targets unknown area '{area}'")
            }
            ValidationIssue::UnboundPlaceholder { rule, area, name } => match area {
                Some(area) => write!(
                    f,
                    "rule '{rule}' uses placeholder '{{{{{name}}}}}' but area '{area}' has no such param"
                ),
                None => write!(
                    f,
                    "rule '{rule}' uses placeholder '{{{{{name}}}}}' but is not scoped to an area"
                ),
            },
            ValidationIssue::InvalidPattern { rule, message } => {
                write!(f, "rule '{rule}' has an invalid regex pattern: {message}")
            }
            ValidationIssue::NoCaptureGroup { rule } => write!(
                f,
                "rule '{rule}' regex pattern has no capture group; the template could only replace the match"
            ),
        }
    }
}

use crate::config::schema::{RuleTable, ValidationError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
    NoRuleFiles {
        path: PathBuf,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(
                    f,
                    "failed to read rule table from {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Walk { path, source } => {
                write!(f, "failed to scan {}: {}", path.display(), source)
            }
            ConfigError::NoRuleFiles { path } => {
                write!(f, "no .toml rule files found in {}", path.display())
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse rule table TOML ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "failed to parse rule table TOML: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid rule table ({}): {}", path.display(), source),
                None => write!(f, "invalid rule table: {}", source),
            },
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Walk { source, .. } => Some(source),
            ConfigError::NoRuleFiles { .. } => None,
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
        }
    }
}

fn parse_str(input: &str) -> Result<RuleTable, ConfigError> {
    toml_edit::de::from_str(input).map_err(|source| ConfigError::Toml { path: None, source })
}

/// Parse and validate a rule table from TOML text.
pub fn load_from_str(input: &str) -> Result<RuleTable, ConfigError> {
    let table = parse_str(input)?;
    table
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(table)
}

/// Load a rule table from a file, or from every `*.toml` directly inside a
/// directory (sorted by file name, merged in that order).
///
/// Relative `meta.source` / `meta.output` resolve against the file's parent
/// directory, or against the directory itself.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RuleTable, ConfigError> {
    let path = path.as_ref();

    if path.is_dir() {
        return load_from_dir(path);
    }

    let mut table = read_table(path)?;
    table
        .validate()
        .map_err(|source| ConfigError::Validation {
            path: Some(path.to_path_buf()),
            source,
        })?;
    table.base_dir = path.parent().map(Path::to_path_buf);
    Ok(table)
}

fn load_from_dir(dir: &Path) -> Result<RuleTable, ConfigError> {
    let files = discover_rule_files(dir)?;
    tracing::debug!(dir = %dir.display(), count = files.len(), "discovered rule files");

    let mut merged = RuleTable::default();
    for file in files {
        merged.merge(read_table(&file)?);
    }

    merged
        .validate()
        .map_err(|source| ConfigError::Validation {
            path: Some(dir.to_path_buf()),
            source,
        })?;
    merged.base_dir = Some(dir.to_path_buf());
    Ok(merged)
}

fn read_table(path: &Path) -> Result<RuleTable, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_str(&contents).map_err(|error| error.with_path(path))
}

/// All `*.toml` files directly inside `dir`, sorted.
pub fn discover_rule_files(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).max_depth(1) {
        let entry = entry.map_err(|source| ConfigError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
        {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort();

    if files.is_empty() {
        return Err(ConfigError::NoRuleFiles {
            path: dir.to_path_buf(),
        });
    }
    Ok(files)
}

impl RuleTable {
    /// Resolve a path from the rule table against its base directory.
    pub fn resolve_path(&self, relative: &str) -> PathBuf {
        let path = Path::new(relative);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    pub fn source_path(&self) -> Option<PathBuf> {
        self.meta.source.as_deref().map(|p| self.resolve_path(p))
    }

    pub fn output_path(&self) -> Option<PathBuf> {
        self.meta.output.as_deref().map(|p| self.resolve_path(p))
    }
}

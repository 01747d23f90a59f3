//! File boundary: read the source once, transform, write the output once.

use crate::config::{transform, ApplicationError, RuleTable, Transformed};
use crate::edit::{atomic_write, EditError};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    /// Transform and report, but never write the output
    pub dry_run: bool,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to read source {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write output {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: EditError,
    },

    #[error(transparent)]
    Apply(#[from] ApplicationError),
}

#[derive(Debug, Clone)]
#[must_use = "PipelineReport records whether the output was written"]
pub struct PipelineReport {
    pub source: PathBuf,
    pub output: PathBuf,
    /// Original source text, kept for diff display
    pub original: String,
    pub transformed: Transformed,
    pub written: bool,
}

/// Patch `source` with `table` and write the result to `output`.
///
/// `source` and `output` may be the same file. Nothing is written unless
/// every rule group completes; the write itself is atomic.
pub fn patch_file(
    source: &Path,
    output: &Path,
    table: &RuleTable,
    options: PipelineOptions,
) -> Result<PipelineReport, PipelineError> {
    let original = fs::read_to_string(source).map_err(|err| PipelineError::Read {
        path: source.to_path_buf(),
        source: err,
    })?;

    let transformed = transform(&original, table)?;

    let written = if options.dry_run {
        tracing::info!(output = %output.display(), "dry run, output not written");
        false
    } else {
        atomic_write(output, transformed.document.as_bytes()).map_err(|err| {
            PipelineError::Write {
                path: output.to_path_buf(),
                source: err,
            }
        })?;
        tracing::info!(
            output = %output.display(),
            bytes = transformed.document.len(),
            "wrote patched document"
        );
        true
    };

    Ok(PipelineReport {
        source: source.to_path_buf(),
        output: output.to_path_buf(),
        original,
        transformed,
        written,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_from_str;

    const RULES: &str = r#"
[[rules]]
id = "log"

[rules.locate]
type = "tokens"
lead = "save();"

[rules.insert]
text = "\nlog();"
"#;

    #[test]
    fn test_patch_to_distinct_output() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("app.ts.backup");
        let output = dir.path().join("app.ts");
        fs::write(&source, "save();\n").unwrap();

        let table = load_from_str(RULES).unwrap();
        let report = patch_file(&source, &output, &table, PipelineOptions::default()).unwrap();

        assert!(report.written);
        assert_eq!(fs::read_to_string(&output).unwrap(), "save();\nlog();\n");
        assert_eq!(fs::read_to_string(&source).unwrap(), "save();\n");
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("app.ts");
        fs::write(&source, "save();\n").unwrap();

        let table = load_from_str(RULES).unwrap();
        let report = patch_file(
            &source,
            &source,
            &table,
            PipelineOptions { dry_run: true },
        )
        .unwrap();

        assert!(!report.written);
        assert_eq!(report.transformed.document, "save();\nlog();\n");
        assert_eq!(fs::read_to_string(&source).unwrap(), "save();\n");
    }

    #[test]
    fn test_failure_leaves_output_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("app.ts.backup");
        let output = dir.path().join("app.ts");
        fs::write(&source, "nothing to see\n").unwrap();
        fs::write(&output, "previous output\n").unwrap();

        let table = load_from_str(RULES).unwrap();
        let err = patch_file(&source, &output, &table, PipelineOptions::default()).unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Apply(ApplicationError::RequiredRuleUnmatched { .. })
        ));
        assert_eq!(fs::read_to_string(&output).unwrap(), "previous output\n");
    }

    #[test]
    fn test_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let table = load_from_str(RULES).unwrap();
        let missing = dir.path().join("missing.ts");
        let err = patch_file(&missing, &missing, &table, PipelineOptions::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Read { .. }));
    }
}

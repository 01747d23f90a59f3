use anchor_patcher::config::{
    load_from_path, transform, ApplicationError, Locate, RuleOutcome, RuleReport, RuleTable, Scope,
};
use anchor_patcher::pipeline::{patch_file, PipelineError, PipelineOptions};
use anchor_patcher::section::LocateError;
use anchor_patcher::telemetry;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "anchor-patcher")]
#[command(about = "Insert statements at pattern-located anchors in source text", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a rule table to a source file
    Apply {
        /// Rule table: a .toml file or a directory of them
        #[arg(short, long)]
        rules: PathBuf,

        /// Source (backup) file; defaults to meta.source in the rule table
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Destination file; defaults to meta.output, then to the source
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Dry run - show what would be changed without writing
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Transform in memory and report whether the output is up to date
    Check {
        /// Rule table: a .toml file or a directory of them
        #[arg(short, long)]
        rules: PathBuf,

        /// Source (backup) file; defaults to meta.source in the rule table
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Destination file to compare against; defaults to meta.output
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the areas and rules in a rule table
    List {
        /// Rule table: a .toml file or a directory of them
        #[arg(short, long)]
        rules: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.verbose)?;

    match cli.command {
        Commands::Apply {
            rules,
            source,
            output,
            dry_run,
            diff,
        } => cmd_apply(&rules, source, output, dry_run, diff),

        Commands::Check {
            rules,
            source,
            output,
        } => cmd_check(&rules, source, output),

        Commands::List { rules } => cmd_list(&rules),
    }
}

/// Resolve source and output paths.
///
/// Priority order:
/// 1. Explicit flag
/// 2. `meta.source` / `meta.output`, relative to the rule table
/// 3. Output falls back to the source (patch in place)
fn resolve_paths(
    table: &RuleTable,
    source: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<(PathBuf, PathBuf)> {
    let Some(source) = source.or_else(|| table.source_path()) else {
        anyhow::bail!(
            "{}\n  {}",
            "No source file given.".red(),
            "Pass --source or set meta.source in the rule table"
        );
    };
    let output = output
        .or_else(|| table.output_path())
        .unwrap_or_else(|| source.clone());
    Ok((source, output))
}

fn scope_name(area: &Option<String>) -> String {
    match area {
        Some(area) => area.clone(),
        None => "document".to_string(),
    }
}

fn print_reports(reports: &[RuleReport]) {
    for report in reports {
        match report.outcome {
            RuleOutcome::Applied { count } => println!(
                "{} {} [{}]: {} insertion(s)",
                "✓".green(),
                report.rule,
                scope_name(&report.area),
                count
            ),
            RuleOutcome::Skipped => println!(
                "{} {} [{}]: Skipped (optional rule matched nothing)",
                "⊘".cyan(),
                report.rule,
                scope_name(&report.area)
            ),
        }
    }
}

/// Print conflict diagnostics for a failed transformation.
fn explain_failure(error: &ApplicationError) {
    eprintln!("{} {}", "✗".red(), error);

    match error {
        ApplicationError::Locate {
            source:
                LocateError::MarkerNotFound {
                    marker, suggestion, ..
                },
            ..
        } => {
            eprintln!("  {}", "CONFLICT: boundary marker not found".red());
            eprintln!("  Marker: {marker:?}");
            if let Some(line) = suggestion {
                eprintln!("  Closest line: {line:?}");
            }
            eprintln!("  The document's shape differs from what the rule table assumes.");
        }
        ApplicationError::RequiredRuleUnmatched { .. } => {
            eprintln!("  {}", "CONFLICT: locate pattern matched no locations".red());
            eprintln!("  Possible causes:");
            eprintln!("    - Code at the anchor was renamed or restructured");
            eprintln!("    - The document was already patched (anchor no longer adjacent)");
            eprintln!("    - Mark the rule `required = false` if the insertion is optional");
        }
        ApplicationError::Rewrite { source, .. } => {
            eprintln!("  Rewrite error: {source}");
        }
        _ => {}
    }
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => continue,
        };
        print!("{}", sign);
    }
}

fn cmd_apply(
    rules: &Path,
    source: Option<PathBuf>,
    output: Option<PathBuf>,
    dry_run: bool,
    show_diff: bool,
) -> Result<()> {
    let table = load_from_path(rules)?;
    let (source, output) = resolve_paths(&table, source, output)?;

    println!("Rules: {}", rules.display());
    println!("Source: {}", source.display());
    println!("Output: {}", output.display());
    if dry_run {
        println!("{}", "[DRY RUN - nothing will be written]".cyan());
    }
    println!();

    let report = match patch_file(&source, &output, &table, PipelineOptions { dry_run }) {
        Ok(report) => report,
        Err(PipelineError::Apply(error)) => {
            explain_failure(&error);
            eprintln!("{}", "No output written.".red().bold());
            std::process::exit(1);
        }
        Err(other) => return Err(other.into()),
    };

    print_reports(&report.transformed.reports);

    if show_diff && report.transformed.changed() {
        display_diff(&output, &report.original, &report.transformed.document);
    }

    println!();
    println!("{}", "Summary:".bold());
    println!(
        "  {} insertion(s)",
        format!("{}", report.transformed.insertions()).green()
    );
    println!(
        "  {} skipped",
        format!("{}", report.transformed.skipped()).cyan()
    );

    if report.written {
        println!(
            "{} Patched {} -> {}",
            "✓".green().bold(),
            source.display(),
            output.display()
        );
    } else {
        println!("{} Dry run complete", "⊙".yellow());
    }

    Ok(())
}

fn cmd_check(rules: &Path, source: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    let table = load_from_path(rules)?;
    let (source, output) = resolve_paths(&table, source, output)?;

    println!("{}", "Checking rule table...".bold());
    println!("Source: {}", source.display());
    println!("Output: {}", output.display());
    println!();

    let original = fs::read_to_string(&source)
        .with_context(|| format!("failed to read source {}", source.display()))?;

    let transformed = match transform(&original, &table) {
        Ok(transformed) => transformed,
        Err(error) => {
            explain_failure(&error);
            std::process::exit(1);
        }
    };

    print_reports(&transformed.reports);
    println!();

    let current = match fs::read_to_string(&output) {
        Ok(current) => current,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            println!("{} Output does not exist yet; run `apply`", "✗".red());
            std::process::exit(1);
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read output {}", output.display()))
        }
    };

    if current != transformed.document {
        println!(
            "{} Output differs from a fresh run; re-run `apply`",
            "✗".red()
        );
        std::process::exit(1);
    }

    println!("{} Output is up to date", "✓".green());
    Ok(())
}

fn cmd_list(rules: &Path) -> Result<()> {
    let table = load_from_path(rules)?;

    if !table.meta.name.is_empty() {
        println!("{}", table.meta.name.bold());
    }
    if let Some(description) = &table.meta.description {
        println!("{}", description.dimmed());
    }
    println!();

    println!("{} ({})", "AREAS".bold(), table.areas.len());
    for area in &table.areas {
        println!("  - {}: {:?} .. {:?}", area.name, area.start, area.end);
        for (key, value) in &area.params {
            println!("      {{{{{key}}}}} = {value:?}");
        }
    }
    println!();

    println!("{} ({})", "RULES".bold(), table.rules.len());
    for rule in &table.rules {
        let scope = match rule.scope() {
            Scope::Document => "document".to_string(),
            Scope::Areas(areas) => areas.join(", "),
        };
        let kind = match rule.locate {
            Locate::Tokens { .. } => "tokens",
            Locate::Regex { .. } => "regex",
        };
        let policy = if rule.required {
            "required".normal()
        } else {
            "optional".dimmed()
        };
        println!("  - {} [{}] {} ({})", rule.id, scope, kind, policy);
    }

    Ok(())
}

//! Anchor Patcher: structural text patching by pattern and section
//!
//! Locates code regions by whitespace-tolerant pattern, scopes rules to
//! sections delimited by literal boundary markers, and inserts new statements
//! next to matched anchors. The patched file is treated as opaque text; there
//! is no parsing and no validation of the inserted code.
//!
//! # Architecture
//!
//! All modifications compile down to a single primitive: [`Edit`], a verified
//! byte-span replacement on an in-memory document. Span acquisition lives in
//! [`section`] (marker-delimited regions) and [`rewrite`] (pattern matches).
//! [`config::transform`] threads a document through a [`RuleTable`]; file I/O
//! happens only in [`pipeline`].
//!
//! # Guarantees
//!
//! - Rules only insert: captured text is reproduced unchanged
//! - A rule that matches nothing leaves its text byte-identical
//! - Missing markers and unmatched required rules abort the run
//! - Output is written once, atomically, and only on success
//!
//! # Example
//!
//! ```
//! use anchor_patcher::{load_from_str, transform};
//!
//! let table = load_from_str(r#"
//! [[areas]]
//! name = "first"
//! start = "// begin"
//! end = "// end"
//!
//! [[rules]]
//! id = "log-update"
//! areas = ["first"]
//!
//! [rules.locate]
//! type = "tokens"
//! lead = "update(id);"
//!
//! [rules.insert]
//! text = "\nlog(id);"
//! "#).unwrap();
//!
//! let doc = "update(id);\n// begin\nupdate(id);\n// end\n";
//! let out = transform(doc, &table).unwrap();
//! assert_eq!(out.document, "update(id);\n// begin\nupdate(id);\nlog(id);\n// end\n");
//! ```

pub mod cache;
pub mod config;
pub mod edit;
pub mod pipeline;
pub mod rewrite;
pub mod section;
pub mod telemetry;

// Re-exports
pub use config::{
    load_from_path, load_from_str, transform, ApplicationError, ConfigError, RuleOutcome,
    RuleReport, RuleTable, Transformed,
};
pub use edit::{Edit, EditError, EditVerification};
pub use pipeline::{patch_file, PipelineError, PipelineOptions, PipelineReport};
pub use rewrite::{rewrite, Rewrite, RewriteError, Rewriter};
pub use section::{locate, LocateError, MarkerRole, Section};

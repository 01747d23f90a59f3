use crate::edit::EditError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("invalid locate pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("regex locate pattern {pattern:?} has no capture group")]
    NoCaptureGroup { pattern: String },

    #[error("tokens pattern needs a lead or an anchor")]
    EmptyPattern,

    #[error("replacement drops or alters captured group '{group}' ({text:?})")]
    InsertionViolation { group: String, text: String },

    #[error("replacement drops matched text outside every capture group ({text:?})")]
    UncapturedText { text: String },

    #[error("edit error: {0}")]
    Edit(#[from] EditError),
}

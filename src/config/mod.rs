pub mod applicator;
pub mod loader;
pub mod params;
pub mod schema;

pub use applicator::{transform, ApplicationError, RuleOutcome, RuleReport, Transformed};
pub use loader::{discover_rule_files, load_from_path, load_from_str, ConfigError};
pub use params::Params;
pub use schema::{
    AreaDefinition, Insert, Locate, Metadata, RuleDefinition, RuleTable, Scope, ValidationError,
    ValidationIssue,
};

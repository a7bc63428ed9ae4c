//! Wire types shared by the validator and its consumers.
//!
//! - [`issues`]: the stable issue-code registry and the [`Issue`] shape
//! - [`report`]: the [`ValidationReport`] (or `"Invalid"` sentinel) and [`Summary`]

pub mod issues;
pub mod report;

pub use issues::{
    codes, definition, is_fatal, severity_of, Evidence, Issue, IssueDefinition, IssueFile,
    Severity, ISSUE_DEFINITIONS,
};
pub use report::{Summary, ValidationReport, INVALID_SENTINEL};

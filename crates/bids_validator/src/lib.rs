//! BIDS Validator - Dataset Traversal, Sidecar Inheritance & Rule Checking
//!
//! Walks a dataset, resolves the metadata each data file inherits from its
//! JSON sidecars, runs a fixed set of rule checkers and folds their issues
//! into a report.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌──────────────┐
//! │   Walker    │     │   Content   │     │  Checkers   │     │  Aggregator  │
//! │ (ignore +   │────▶│   Loader    │────▶│ (+ sidecar  │────▶│ (severity,   │
//! │  symlinks)  │     │             │     │  resolver)  │     │  Invalid)    │
//! └─────────────┘     └─────────────┘     └─────────────┘     └──────────────┘
//! ```
//!
//! # Core Concepts
//!
//! - **FileRecord**: a discovered file with its canonical `/`-rooted path
//! - **Sidecar**: JSON metadata inherited by data files sharing its entities
//! - **Issue**: a rule violation with a stable numeric code
//! - **Invalid**: the report a dataset gets when a prerequisite is missing

pub mod aggregate;
pub mod cancel;
pub mod checkers;
pub mod collaborators;
pub mod config;
pub mod content;
pub mod entities;
pub mod error;
pub mod ignore_rules;
pub mod sidecar;
pub mod types;
pub mod validator;
pub mod walker;

// Re-exports for convenience
pub use aggregate::{summarize, IssueAggregator};
pub use cancel::CancellationToken;
pub use checkers::{Checker, DatasetView};
pub use collaborators::{
    AcceptAllAnnotations, AnnotationValidator, AnnotationVerdict, HeaderParser, NiftiHeader,
    NoHeaderParser,
};
pub use config::ValidatorConfig;
pub use content::{ContentLoader, DatasetContent, JsonContentMap};
pub use entities::{EntityFilenameMatcher, EntityKeySet, FilenameMatcher};
pub use error::{Result, ValidatorError};
pub use ignore_rules::{IgnoreRuleSet, DEFAULT_IGNORE_PATTERNS};
pub use sidecar::{merge_sidecars, potential_locations, EffectiveMetadata, SidecarResolver};
pub use types::FileRecord;
pub use validator::{ValidationOutcome, Validator};
pub use walker::{DatasetWalker, WalkOptions, WalkResult};

pub use bids_protocol::{codes, Issue, IssueFile, Severity, Summary, ValidationReport};

//! Validation report and summary types.

use crate::issues::Issue;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};

/// Literal placed in `errors` when a fatal prerequisite failed.
pub const INVALID_SENTINEL: &str = "Invalid";

/// Dataset-level summary. Ordered collections keep serialization stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_files: usize,
    pub size: u64,
    pub subjects: BTreeSet<String>,
    pub sessions: BTreeSet<String>,
    pub tasks: BTreeSet<String>,
    pub modalities: BTreeSet<String>,
    /// Issue totals per code, before warnings are suppressed.
    pub issue_counts: BTreeMap<u16, usize>,
}

/// Final result of a validation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationReport {
    Complete {
        errors: Vec<Issue>,
        warnings: Vec<Issue>,
        summary: Summary,
    },
    /// A fatal prerequisite failed; only the summary is kept.
    Invalid { summary: Summary },
}

impl ValidationReport {
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid { .. })
    }

    pub fn errors(&self) -> &[Issue] {
        match self {
            Self::Complete { errors, .. } => errors,
            Self::Invalid { .. } => &[],
        }
    }

    pub fn warnings(&self) -> &[Issue] {
        match self {
            Self::Complete { warnings, .. } => warnings,
            Self::Invalid { .. } => &[],
        }
    }

    pub fn summary(&self) -> &Summary {
        match self {
            Self::Complete { summary, .. } | Self::Invalid { summary } => summary,
        }
    }

    /// Iterate over every reported issue code (errors then warnings).
    pub fn codes(&self) -> impl Iterator<Item = u16> + '_ {
        self.errors()
            .iter()
            .chain(self.warnings().iter())
            .map(|issue| issue.code)
    }

    pub fn has_code(&self, code: u16) -> bool {
        self.codes().any(|c| c == code)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum ErrorsWire<'a> {
    List(&'a [Issue]),
    Sentinel(&'static str),
}

#[derive(Serialize)]
struct ReportWire<'a> {
    errors: ErrorsWire<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<&'a [Issue]>,
    summary: &'a Summary,
}

impl Serialize for ValidationReport {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let wire = match self {
            Self::Complete {
                errors,
                warnings,
                summary,
            } => ReportWire {
                errors: ErrorsWire::List(errors),
                warnings: Some(warnings),
                summary,
            },
            Self::Invalid { summary } => ReportWire {
                errors: ErrorsWire::Sentinel(INVALID_SENTINEL),
                warnings: None,
                summary,
            },
        };
        wire.serialize(serializer)
    }
}

//! Issue code registry and the issue wire type.
//!
//! Codes are stable: a code is bound to exactly one rule meaning and is never
//! reused. Severity is a property of the code, not of the emitting checker.

use serde::{Deserialize, Serialize};

/// Severity of an issue, fixed per code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "error" => Some(Self::Error),
            "warning" => Some(Self::Warning),
            _ => None,
        }
    }
}

/// Named issue codes.
pub mod codes {
    pub const INTERNAL_ERROR: u16 = 0;
    pub const REPETITION_TIME_GREATER_THAN: u16 = 2;
    pub const ECHO_TIME_GREATER_THAN: u16 = 3;
    pub const NIFTI_HEADER_UNREADABLE: u16 = 26;
    pub const JSON_INVALID: u16 = 27;
    pub const BVAL_MULTIPLE_ROWS: u16 = 30;
    pub const INCONSISTENT_PARAMETERS: u16 = 39;
    pub const NIFTI_DIMENSION: u16 = 40;
    pub const NIFTI_UNIT: u16 = 41;
    pub const FILE_READ: u16 = 44;
    pub const BVAL_NON_NUMERIC: u16 = 47;
    pub const BOLD_NOT_4D: u16 = 54;
    pub const JSON_SCHEMA_VALIDATION_ERROR: u16 = 55;
    pub const DATASET_DESCRIPTION_JSON_MISSING: u16 = 57;
    pub const SLICETIMING_VALUES_GREATER_THAN_REPETITION_TIME: u16 = 66;
    pub const UNUSED_STIMULUS: u16 = 77;
    pub const SUSPICIOUSLY_LONG_EVENT_DESIGN: u16 = 85;
    pub const SUSPICIOUSLY_SHORT_EVENT_DESIGN: u16 = 86;
    pub const MAGNITUDE_FILE_WITH_TOO_MANY_DIMENSIONS: u16 = 94;
    pub const TOO_FEW_AUTHORS: u16 = 102;
    pub const MULTIPLE_COMMAS_IN_AUTHOR_FIELD: u16 = 103;
    pub const NO_AUTHORS: u16 = 113;
    pub const MISSING_GENETIC_DATABASE: u16 = 114;
    pub const HED_ERROR: u16 = 999;
}

/// Static description of one issue code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssueDefinition {
    pub code: u16,
    pub key: &'static str,
    pub severity: Severity,
    pub reason: &'static str,
    /// A fatal code collapses the whole report to `Invalid`.
    pub fatal: bool,
}

const fn def(
    code: u16,
    key: &'static str,
    severity: Severity,
    reason: &'static str,
) -> IssueDefinition {
    IssueDefinition {
        code,
        key,
        severity,
        reason,
        fatal: false,
    }
}

/// The registry, sorted by code.
pub static ISSUE_DEFINITIONS: &[IssueDefinition] = &[
    def(
        codes::INTERNAL_ERROR,
        "INTERNAL_ERROR",
        Severity::Error,
        "Internal error. Some validation steps may not have run.",
    ),
    def(
        codes::REPETITION_TIME_GREATER_THAN,
        "REPETITION_TIME_GREATER_THAN",
        Severity::Warning,
        "'RepetitionTime' is greater than 100. Are you sure it's expressed in seconds?",
    ),
    def(
        codes::ECHO_TIME_GREATER_THAN,
        "ECHO_TIME_GREATER_THAN",
        Severity::Warning,
        "'EchoTime' is greater than 1. Are you sure it's expressed in seconds?",
    ),
    def(
        codes::NIFTI_HEADER_UNREADABLE,
        "NIFTI_HEADER_UNREADABLE",
        Severity::Error,
        "We were unable to parse the header data from this NIfTI file.",
    ),
    def(
        codes::JSON_INVALID,
        "JSON_INVALID",
        Severity::Error,
        "Not a valid JSON file.",
    ),
    def(
        codes::BVAL_MULTIPLE_ROWS,
        "BVAL_MULTIPLE_ROWS",
        Severity::Error,
        "'.bval' files should contain exactly one row of values.",
    ),
    def(
        codes::INCONSISTENT_PARAMETERS,
        "INCONSISTENT_PARAMETERS",
        Severity::Warning,
        "Paired acquisitions do not share the same voxel size.",
    ),
    def(
        codes::NIFTI_DIMENSION,
        "NIFTI_DIMENSION",
        Severity::Warning,
        "NIfTI header field for dimension information is blank.",
    ),
    def(
        codes::NIFTI_UNIT,
        "NIFTI_UNIT",
        Severity::Warning,
        "NIfTI header field for unit information for x, y, z and t dimensions is empty.",
    ),
    def(
        codes::FILE_READ,
        "FILE_READ",
        Severity::Error,
        "We were unable to read this file.",
    ),
    def(
        codes::BVAL_NON_NUMERIC,
        "BVAL_NON_NUMERIC",
        Severity::Error,
        "'.bval' files should contain only space separated numeric values.",
    ),
    def(
        codes::BOLD_NOT_4D,
        "BOLD_NOT_4D",
        Severity::Error,
        "BOLD scans must be 4 dimensional.",
    ),
    def(
        codes::JSON_SCHEMA_VALIDATION_ERROR,
        "JSON_SCHEMA_VALIDATION_ERROR",
        Severity::Error,
        "Invalid JSON sidecar file. The sidecar is not formatted according to the schema.",
    ),
    IssueDefinition {
        code: codes::DATASET_DESCRIPTION_JSON_MISSING,
        key: "DATASET_DESCRIPTION_JSON_MISSING",
        severity: Severity::Error,
        reason: "The compulsory file /dataset_description.json is missing.",
        fatal: true,
    },
    def(
        codes::SLICETIMING_VALUES_GREATER_THAN_REPETITION_TIME,
        "SLICETIMING_VALUES_GREATER_THAN_REPETITION_TIME",
        Severity::Error,
        "'SliceTiming' contains a value greater than 'RepetitionTime'.",
    ),
    def(
        codes::UNUSED_STIMULUS,
        "UNUSED_STIMULUS",
        Severity::Warning,
        "There are files in the /stimuli folder that are not cited by any _events.tsv file.",
    ),
    def(
        codes::SUSPICIOUSLY_LONG_EVENT_DESIGN,
        "SUSPICIOUSLY_LONG_EVENT_DESIGN",
        Severity::Warning,
        "The onset of the last event is after the total duration of the corresponding scan.",
    ),
    def(
        codes::SUSPICIOUSLY_SHORT_EVENT_DESIGN,
        "SUSPICIOUSLY_SHORT_EVENT_DESIGN",
        Severity::Warning,
        "The onset of the last event is less than half the total duration of the corresponding scan.",
    ),
    def(
        codes::MAGNITUDE_FILE_WITH_TOO_MANY_DIMENSIONS,
        "MAGNITUDE_FILE_WITH_TOO_MANY_DIMENSIONS",
        Severity::Error,
        "_magnitude1 and _magnitude2 files must have exactly three dimensions.",
    ),
    def(
        codes::TOO_FEW_AUTHORS,
        "TOO_FEW_AUTHORS",
        Severity::Warning,
        "The Authors field of dataset_description.json should contain an array of fields, with one author per field.",
    ),
    def(
        codes::MULTIPLE_COMMAS_IN_AUTHOR_FIELD,
        "MULTIPLE_COMMAS_IN_AUTHOR_FIELD",
        Severity::Warning,
        "An author in the Authors field of dataset_description.json seems to contain more than one name.",
    ),
    def(
        codes::NO_AUTHORS,
        "NO_AUTHORS",
        Severity::Warning,
        "The Authors field of dataset_description.json should contain an array of fields, with one author per field. This was found empty.",
    ),
    def(
        codes::MISSING_GENETIC_DATABASE,
        "MISSING_GENETIC_DATABASE",
        Severity::Warning,
        "A genetic_info.json file is present but no GeneticDatabase field is declared in dataset_description.json.",
    ),
    def(
        codes::HED_ERROR,
        "HED_ERROR",
        Severity::Error,
        "The validation on this HED string returned an error.",
    ),
];

/// Look up the definition of a code.
pub fn definition(code: u16) -> Option<&'static IssueDefinition> {
    ISSUE_DEFINITIONS
        .binary_search_by_key(&code, |d| d.code)
        .ok()
        .map(|idx| &ISSUE_DEFINITIONS[idx])
}

/// Severity for a code. Unregistered codes are treated as errors.
pub fn severity_of(code: u16) -> Severity {
    definition(code)
        .map(|d| d.severity)
        .unwrap_or(Severity::Error)
}

pub fn is_fatal(code: u16) -> bool {
    definition(code).is_some_and(|d| d.fatal)
}

/// File reference carried by an issue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueFile {
    pub relative_path: String,
    pub name: String,
}

impl IssueFile {
    /// Build a reference from a canonical relative path (`/a/b.json`).
    pub fn from_relative_path(relative_path: &str) -> Self {
        let name = relative_path
            .rsplit('/')
            .next()
            .unwrap_or(relative_path)
            .to_string();
        Self {
            relative_path: relative_path.to_string(),
            name,
        }
    }
}

/// Structured detail attached to an issue in verbose mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// A single rule violation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Issue {
    pub code: u16,
    pub severity: Severity,
    pub file: IssueFile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Evidence>,
}

impl Issue {
    /// New issue with the registry's severity and default reason.
    pub fn new(code: u16, file: IssueFile) -> Self {
        Self {
            code,
            severity: severity_of(code),
            file,
            reason: definition(code).map(|d| d.reason.to_string()),
            line: None,
            evidence: None,
        }
    }

    pub fn at(code: u16, relative_path: &str) -> Self {
        Self::new(code, IssueFile::from_relative_path(relative_path))
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_evidence(mut self, field: Option<&str>, value: Option<String>) -> Self {
        self.evidence = Some(Evidence {
            field: field.map(str::to_string),
            value,
        });
        self
    }

    pub fn key(&self) -> &'static str {
        definition(self.code).map(|d| d.key).unwrap_or("UNKNOWN")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_sorted_and_unique() {
        for pair in ISSUE_DEFINITIONS.windows(2) {
            assert!(
                pair[0].code < pair[1].code,
                "registry out of order at code {}",
                pair[1].code
            );
        }
    }

    #[test]
    fn severity_follows_registry() {
        assert_eq!(severity_of(codes::BVAL_MULTIPLE_ROWS), Severity::Error);
        assert_eq!(severity_of(codes::TOO_FEW_AUTHORS), Severity::Warning);
        assert_eq!(severity_of(4242), Severity::Error);
        assert!(is_fatal(codes::DATASET_DESCRIPTION_JSON_MISSING));
        assert!(!is_fatal(codes::NO_AUTHORS));
    }

    #[test]
    fn issue_wire_shape() {
        let issue = Issue::at(codes::BVAL_NON_NUMERIC, "/sub-01/dwi/sub-01_dwi.bval").with_line(1);
        let value = serde_json::to_value(&issue).unwrap();
        assert_eq!(value["code"], 47);
        assert_eq!(value["severity"], "error");
        assert_eq!(value["file"]["name"], "sub-01_dwi.bval");
        assert_eq!(value["file"]["relativePath"], "/sub-01/dwi/sub-01_dwi.bval");
        assert_eq!(value["line"], 1);
        assert!(value.get("evidence").is_none());
        assert_eq!(issue.key(), "BVAL_NON_NUMERIC");
    }

    #[test]
    fn severity_parse_roundtrip() {
        assert_eq!(Severity::parse("Warning"), Some(Severity::Warning));
        assert_eq!(Severity::Error.as_str(), "error");
        assert_eq!(Severity::parse("fatal"), None);
    }
}

//! JSON sidecar key and value rules.
//!
//! Every sidecar is checked with its inherited metadata merged in, so a key
//! supplied by a more general sidecar satisfies a requirement.

use super::DatasetView;
use crate::sidecar::EffectiveMetadata;
use bids_protocol::{codes, Issue, IssueFile};
use serde_json::Value;

/// `RepetitionTime` is in seconds; larger values are almost certainly milliseconds.
const MAX_REPETITION_TIME: f64 = 100.0;
/// `EchoTime` is in seconds.
const MAX_ECHO_TIME: f64 = 1.0;
/// Arrays of acquisition times, none of which may be negative.
const TIMING_ARRAY_KEYS: &[&str] = &["SliceTiming", "VolumeTiming"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Number,
    Text,
    Boolean,
    TextOrObject,
}

impl ValueKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            ValueKind::Number => value.is_number(),
            ValueKind::Text => value.as_str().is_some_and(|s| !s.is_empty()),
            ValueKind::Boolean => value.is_boolean(),
            ValueKind::TextOrObject => {
                value.is_object() || value.as_str().is_some_and(|s| !s.is_empty())
            }
        }
    }

    fn describe(self) -> &'static str {
        match self {
            ValueKind::Number => "a number",
            ValueKind::Text => "a non-empty string",
            ValueKind::Boolean => "a boolean",
            ValueKind::TextOrObject => "a non-empty string or an object",
        }
    }
}

#[derive(Debug)]
struct KeyRule {
    key: &'static str,
    kind: ValueKind,
    required: bool,
}

const fn required(key: &'static str, kind: ValueKind) -> KeyRule {
    KeyRule {
        key,
        kind,
        required: true,
    }
}

const fn optional(key: &'static str, kind: ValueKind) -> KeyRule {
    KeyRule {
        key,
        kind,
        required: false,
    }
}

#[derive(Debug)]
struct SuffixRules {
    suffix: &'static str,
    keys: &'static [KeyRule],
    /// Keys that must not appear together
    exclusive: &'static [(&'static str, &'static str)],
}

const SUFFIX_RULES: &[SuffixRules] = &[
    SuffixRules {
        suffix: "bold",
        keys: &[
            required("RepetitionTime", ValueKind::Number),
            required("TaskName", ValueKind::Text),
        ],
        exclusive: &[("RepetitionTime", "VolumeTiming")],
    },
    SuffixRules {
        suffix: "meg",
        keys: &[
            required("TaskName", ValueKind::Text),
            required("SamplingFrequency", ValueKind::Number),
            required("PowerLineFrequency", ValueKind::Number),
            required("DewarPosition", ValueKind::Text),
            required("SoftwareFilters", ValueKind::TextOrObject),
            required("DigitizedLandmarks", ValueKind::Boolean),
            required("DigitizedHeadPoints", ValueKind::Boolean),
        ],
        exclusive: &[],
    },
    SuffixRules {
        suffix: "ieeg",
        keys: &[
            required("TaskName", ValueKind::Text),
            required("PowerLineFrequency", ValueKind::Number),
            required("SamplingFrequency", ValueKind::Number),
            required("iEEGReference", ValueKind::Text),
            optional("Manufacturer", ValueKind::Text),
        ],
        exclusive: &[],
    },
    SuffixRules {
        suffix: "eeg",
        keys: &[
            required("TaskName", ValueKind::Text),
            required("SamplingFrequency", ValueKind::Number),
            required("PowerLineFrequency", ValueKind::Number),
            required("EEGReference", ValueKind::Text),
            required("SoftwareFilters", ValueKind::TextOrObject),
            optional("Manufacturer", ValueKind::Text),
        ],
        exclusive: &[],
    },
];

pub fn check(view: &DatasetView) -> anyhow::Result<Vec<Issue>> {
    let json = &view.content().json;
    let mut issues = Vec::new();
    for path in json.keys() {
        let Some(keys) = view.entities_of(path) else {
            continue;
        };
        let metadata = view.resolver().resolve_target(path, json);
        issues.extend(check_sidecar(view.issue_file(path), keys.suffix(), &metadata));
    }
    Ok(issues)
}

/// Rules for one sidecar given its merged metadata.
pub fn check_sidecar(file: IssueFile, suffix: Option<&str>, metadata: &EffectiveMetadata) -> Vec<Issue> {
    let mut issues = check_values(&file, metadata);

    let Some(rules) = suffix.and_then(|s| SUFFIX_RULES.iter().find(|r| r.suffix == s)) else {
        return issues;
    };

    for rule in rules.keys {
        match metadata.get(rule.key) {
            None if rule.required => issues.push(
                Issue::new(codes::JSON_SCHEMA_VALIDATION_ERROR, file.clone())
                    .with_reason(format!("Missing required key '{}'", rule.key))
                    .with_evidence(Some(rule.key), None),
            ),
            Some(value) if !rule.kind.accepts(value) => issues.push(
                Issue::new(codes::JSON_SCHEMA_VALIDATION_ERROR, file.clone())
                    .with_reason(format!("'{}' should be {}", rule.key, rule.kind.describe()))
                    .with_evidence(Some(rule.key), Some(value.to_string())),
            ),
            _ => {}
        }
    }

    for (a, b) in rules.exclusive {
        if metadata.contains_key(a) && metadata.contains_key(b) {
            issues.push(
                Issue::new(codes::JSON_SCHEMA_VALIDATION_ERROR, file.clone())
                    .with_reason(format!("'{}' and '{}' are mutually exclusive", a, b))
                    .with_evidence(Some(*b), None),
            );
        }
    }

    issues
}

fn check_values(file: &IssueFile, metadata: &EffectiveMetadata) -> Vec<Issue> {
    let mut issues = Vec::new();
    let repetition_time = metadata.get_f64("RepetitionTime");

    if let Some(tr) = repetition_time.filter(|tr| *tr > MAX_REPETITION_TIME) {
        issues.push(
            Issue::new(codes::REPETITION_TIME_GREATER_THAN, file.clone())
                .with_evidence(Some("RepetitionTime"), Some(tr.to_string())),
        );
    }
    if let Some(te) = metadata.get_f64("EchoTime").filter(|te| *te > MAX_ECHO_TIME) {
        issues.push(
            Issue::new(codes::ECHO_TIME_GREATER_THAN, file.clone())
                .with_evidence(Some("EchoTime"), Some(te.to_string())),
        );
    }

    for key in TIMING_ARRAY_KEYS {
        if let Some(negative) = timing_values(metadata, key).into_iter().find(|t| *t < 0.0) {
            issues.push(
                Issue::new(codes::JSON_SCHEMA_VALIDATION_ERROR, file.clone())
                    .with_reason(format!("'{}' entries must not be negative", key))
                    .with_evidence(Some(*key), Some(negative.to_string())),
            );
        }
    }

    let slice_timing = timing_values(metadata, "SliceTiming");
    if let Some(tr) = repetition_time {
        if let Some(late) = slice_timing.iter().find(|t| **t > tr) {
            issues.push(
                Issue::new(codes::SLICETIMING_VALUES_GREATER_THAN_REPETITION_TIME, file.clone())
                    .with_evidence(Some("SliceTiming"), Some(late.to_string())),
            );
        }
    }

    issues
}

fn timing_values(metadata: &EffectiveMetadata, key: &str) -> Vec<f64> {
    metadata
        .get(key)
        .and_then(Value::as_array)
        .map(|values| values.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::DatasetContent;
    use crate::entities::EntityFilenameMatcher;
    use crate::types::FileRecord;
    use serde_json::json;
    use std::sync::Arc;

    fn run(path: &str, sidecar: Value) -> Vec<Issue> {
        let content = DatasetContent::default().with_json(path, sidecar);
        let view = DatasetView::new(
            vec![FileRecord::listed(path, 0)],
            content,
            Arc::new(EntityFilenameMatcher),
        );
        check(&view).unwrap()
    }

    #[test]
    fn repetition_time_in_seconds_is_clean() {
        let issues = run(
            "/task-rest_bold.json",
            json!({"RepetitionTime": 1.2, "echo_time": 0.005, "flip_angle": 90, "TaskName": "Rest"}),
        );
        assert!(issues.is_empty());
    }

    #[test]
    fn repetition_time_in_milliseconds_is_flagged() {
        let issues = run(
            "/task-rest_bold.json",
            json!({"RepetitionTime": 1200, "echo_time": 0.005, "flip_angle": 90, "TaskName": "Rest"}),
        );
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, codes::REPETITION_TIME_GREATER_THAN);
    }

    #[test]
    fn negative_slice_timing_is_flagged() {
        let issues = run(
            "/task-rest_bold.json",
            json!({"RepetitionTime": 1.2, "SliceTiming": [-1.0, 0.0, 1.0], "TaskName": "Rest"}),
        );
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, codes::JSON_SCHEMA_VALIDATION_ERROR);
    }

    #[test]
    fn negative_volume_timing_is_flagged() {
        let issues = run(
            "/sub-01/func/sub-01_task-rest_sbref.json",
            json!({"VolumeTiming": [0.0, -2.0, 4.0], "SliceTiming": [0.0, 0.5]}),
        );
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, codes::JSON_SCHEMA_VALIDATION_ERROR);
        let evidence = issues[0].evidence.as_ref().unwrap();
        assert_eq!(evidence.field.as_deref(), Some("VolumeTiming"));
        assert_eq!(evidence.value.as_deref(), Some("-2"));
    }

    #[test]
    fn slice_timing_beyond_repetition_time_is_flagged() {
        let issues = run(
            "/task-rest_bold.json",
            json!({"RepetitionTime": 1.0, "SliceTiming": [0.0, 0.5, 1.5], "TaskName": "Rest"}),
        );
        let found: Vec<u16> = issues.iter().map(|i| i.code).collect();
        assert_eq!(found, vec![codes::SLICETIMING_VALUES_GREATER_THAN_REPETITION_TIME]);
    }

    #[test]
    fn meg_sidecar_requires_typed_keys() {
        let mut sidecar = json!({
            "TaskName": "Audiovis",
            "SamplingFrequency": 1000,
            "PowerLineFrequency": 50,
            "DewarPosition": "Upright",
            "SoftwareFilters": "n/a",
            "DigitizedLandmarks": true,
            "DigitizedHeadPoints": false
        });
        assert!(run("/sub-01_run-01_meg.json", sidecar.clone()).is_empty());

        sidecar["SamplingFrequency"] = json!("");
        let issues = run("/sub-01_run-01_meg.json", sidecar);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, codes::JSON_SCHEMA_VALIDATION_ERROR);
    }

    #[test]
    fn ieeg_manufacturer_must_not_be_empty() {
        let mut sidecar = json!({
            "TaskName": "Audiovis",
            "Manufacturer": "TDT",
            "PowerLineFrequency": 50,
            "SamplingFrequency": 10,
            "iEEGReference": "reference"
        });
        assert!(run("/sub-01_run-01_ieeg.json", sidecar.clone()).is_empty());

        sidecar["Manufacturer"] = json!("");
        assert_eq!(run("/sub-01_run-01_ieeg.json", sidecar).len(), 1);
    }

    #[test]
    fn volume_timing_excludes_repetition_time() {
        let issues = run(
            "/task-rest_bold.json",
            json!({"RepetitionTime": 2.0, "VolumeTiming": [0, 2, 4], "TaskName": "rest"}),
        );
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].evidence.as_ref().unwrap().field.as_deref(), Some("VolumeTiming"));
    }

    #[test]
    fn inherited_keys_satisfy_requirements() {
        let content = DatasetContent::default()
            .with_json("/task-rest_bold.json", json!({"TaskName": "rest", "RepetitionTime": 2.0}))
            .with_json("/sub-01/func/sub-01_task-rest_bold.json", json!({"EchoTime": 0.03}));
        let view = DatasetView::new(Vec::new(), content, Arc::new(EntityFilenameMatcher));
        assert!(check(&view).unwrap().is_empty());
    }

    #[test]
    fn unparseable_names_are_skipped() {
        assert!(run("/dataset_description.json", json!({"RepetitionTime": 5000})).is_empty());
    }
}

//! Top-level dataset description rules.

use super::DatasetView;
use crate::content::JsonContentMap;
use bids_protocol::{codes, Issue};
use serde_json::Value;

pub const DATASET_DESCRIPTION_PATH: &str = "/dataset_description.json";
pub const GENETIC_INFO_PATH: &str = "/genetic_info.json";

pub fn check(view: &DatasetView) -> anyhow::Result<Vec<Issue>> {
    Ok(check_description(&view.content().json))
}

/// Rules over `/dataset_description.json` and its companions.
///
/// A missing description is the fatal prerequisite and suppresses the
/// remaining rules.
pub fn check_description(json: &JsonContentMap) -> Vec<Issue> {
    let Some(description) = json.get(DATASET_DESCRIPTION_PATH) else {
        return vec![Issue::at(codes::DATASET_DESCRIPTION_JSON_MISSING, DATASET_DESCRIPTION_PATH)];
    };

    let mut issues = check_authors(description);

    if json.contains_key(GENETIC_INFO_PATH) && description.get("GeneticDatabase").is_none() {
        issues.push(Issue::at(codes::MISSING_GENETIC_DATABASE, DATASET_DESCRIPTION_PATH));
    }
    issues
}

fn check_authors(description: &Value) -> Vec<Issue> {
    let authors = match description.get("Authors").and_then(Value::as_array) {
        Some(authors) if !authors.is_empty() => authors,
        _ => return vec![Issue::at(codes::NO_AUTHORS, DATASET_DESCRIPTION_PATH)],
    };

    let mut issues = Vec::new();
    if authors.len() == 1 {
        issues.push(Issue::at(codes::TOO_FEW_AUTHORS, DATASET_DESCRIPTION_PATH));
    }
    for author in authors.iter().filter_map(Value::as_str) {
        if author.matches(',').count() > 1 {
            issues.push(
                Issue::at(codes::MULTIPLE_COMMAS_IN_AUTHOR_FIELD, DATASET_DESCRIPTION_PATH)
                    .with_evidence(Some("Authors"), Some(author.to_string())),
            );
        }
    }
    issues
}

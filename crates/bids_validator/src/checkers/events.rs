//! Events tables: stimulus usage, design length and annotations.
//!
//! Design length is checked per task acquisition. Acquisitions are checked
//! as separate tasks under a semaphore, each filling its own buffer; buffers
//! are concatenated in acquisition order.

use super::DatasetView;
use crate::collaborators::NiftiHeader;
use crate::sidecar::{potential_locations, sidecar_target};
use bids_protocol::{codes, Issue};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

pub const STIMULI_DIR: &str = "/stimuli/";
const EVENTS_TABLE_SUFFIX: &str = "_events.tsv";
const ONSET_COLUMN: &str = "onset";
const STIM_FILE_COLUMN: &str = "stim_file";
const ANNOTATION_COLUMN: &str = "HED";
const ANNOTATION_KEY: &str = "HED";
const MISSING_VALUE: &str = "n/a";

/// A tab-separated table with 1-based source line numbers per row.
#[derive(Debug)]
struct Table<'a> {
    columns: Vec<&'a str>,
    rows: Vec<(usize, Vec<&'a str>)>,
}

impl<'a> Table<'a> {
    fn parse(text: &'a str) -> Option<Self> {
        let mut lines = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty());
        let (_, header) = lines.next()?;
        let columns = header.split('\t').map(str::trim).collect();
        let rows = lines
            .map(|(idx, line)| (idx + 1, line.split('\t').collect()))
            .collect();
        Some(Self { columns, rows })
    }

    fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| *c == name)
    }

    /// Trimmed cell value, `None` when empty or `n/a`.
    fn cell(row: &[&'a str], idx: usize) -> Option<&'a str> {
        row.get(idx)
            .copied()
            .map(str::trim)
            .filter(|c| !c.is_empty() && *c != MISSING_VALUE)
    }
}

pub async fn check(view: Arc<DatasetView>) -> anyhow::Result<Vec<Issue>> {
    let mut issues = check_stimuli(&view);

    let acquisitions = task_acquisitions(&view);
    let permits = Arc::new(Semaphore::new(view.max_concurrency()));
    let mut tasks = JoinSet::new();
    for (idx, bold) in acquisitions.iter().cloned().enumerate() {
        let view = view.clone();
        let permits = permits.clone();
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await?;
            anyhow::Ok((idx, check_design_length(&view, &bold)))
        });
    }

    let mut buffers: Vec<Vec<Issue>> = vec![Vec::new(); acquisitions.len()];
    while let Some(joined) = tasks.join_next().await {
        let (idx, found) = joined??;
        buffers[idx] = found;
    }
    debug!(acquisitions = acquisitions.len(), "Checked event design lengths");
    issues.extend(buffers.into_iter().flatten());

    issues.extend(check_annotations(&view));
    Ok(issues)
}

/// Bold runs with a task entity and a decoded header
fn task_acquisitions(view: &DatasetView) -> Vec<String> {
    view.content()
        .headers
        .keys()
        .filter(|path| {
            view.entities_of(path)
                .is_some_and(|keys| keys.get("task").is_some() && keys.suffix() == Some("bold"))
        })
        .cloned()
        .collect()
}

/// Events tables that apply to a data file, least specific first
fn associated_tables(view: &DatasetView, data_path: &str) -> Vec<String> {
    let target = sidecar_target(data_path, Some("events"), ".tsv", view.matcher());
    potential_locations(&target, view.matcher())
        .into_iter()
        .filter(|path| view.content().tables.contains_key(path))
        .collect()
}

/// Stimulus files never cited by a `stim_file` column
pub fn check_stimuli(view: &DatasetView) -> Vec<Issue> {
    let mut cited = BTreeSet::new();
    for (path, text) in &view.content().tables {
        if !path.ends_with(EVENTS_TABLE_SUFFIX) {
            continue;
        }
        let Some(table) = Table::parse(text) else {
            continue;
        };
        let Some(idx) = table.column(STIM_FILE_COLUMN) else {
            continue;
        };
        for (_, row) in &table.rows {
            if let Some(value) = Table::cell(row, idx) {
                cited.insert(format!("{}{}", STIMULI_DIR, value.trim_start_matches('/')));
            }
        }
    }

    view.files()
        .filter(|f| f.relative_path.starts_with(STIMULI_DIR))
        .filter(|f| !cited.contains(&f.relative_path))
        .map(|f| Issue::new(codes::UNUSED_STIMULUS, f.issue_file()))
        .collect()
}

/// Compare the latest onset of each associated events table with the
/// acquisition length `RepetitionTime * volumes`.
fn check_design_length(view: &DatasetView, bold: &str) -> Vec<Issue> {
    let Some(volumes) = view.content().headers.get(bold).and_then(NiftiHeader::volumes) else {
        return Vec::new();
    };
    let Some(repetition_time) = view.effective_metadata(bold).get_f64("RepetitionTime") else {
        return Vec::new();
    };

    let long_threshold = (repetition_time * volumes as f64).floor();
    let short_threshold = (0.5 * long_threshold).floor();

    let mut issues = Vec::new();
    for events_path in associated_tables(view, bold) {
        let Some(table) = view.content().tables.get(&events_path).and_then(|t| Table::parse(t))
        else {
            continue;
        };
        let Some(onset) = last_onset(&table) else {
            continue;
        };

        let code = if onset > long_threshold {
            codes::SUSPICIOUSLY_LONG_EVENT_DESIGN
        } else if onset < short_threshold {
            codes::SUSPICIOUSLY_SHORT_EVENT_DESIGN
        } else {
            continue;
        };
        issues.push(
            view.issue(code, &events_path)
                .with_evidence(Some(ONSET_COLUMN), Some(onset.to_string())),
        );
    }
    issues
}

/// Largest numeric onset in the table. Cells are trimmed before parsing.
fn last_onset(table: &Table<'_>) -> Option<f64> {
    let idx = table.column(ONSET_COLUMN).unwrap_or(0);
    table
        .rows
        .iter()
        .filter_map(|(_, row)| Table::cell(row, idx))
        .filter_map(|cell| cell.parse::<f64>().ok())
        .filter(|onset| onset.is_finite())
        .reduce(f64::max)
}

/// Per-row annotation strings from the `HED` column and sidecar column maps
pub fn check_annotations(view: &DatasetView) -> Vec<Issue> {
    let json = &view.content().json;
    let mut issues = Vec::new();

    for (path, text) in &view.content().tables {
        if !path.ends_with(EVENTS_TABLE_SUFFIX) {
            continue;
        }
        let Some(table) = Table::parse(text) else {
            continue;
        };

        let sidecar = view.resolver().resolve_with(path, None, json);
        let mut mapped: Vec<(usize, &Value)> = sidecar
            .values()
            .iter()
            .filter_map(|(column, definition)| {
                let annotation = definition.get(ANNOTATION_KEY)?;
                Some((table.column(column)?, annotation))
            })
            .collect();
        mapped.sort_by_key(|(idx, _)| *idx);

        let annotation_column = table.column(ANNOTATION_COLUMN);
        if annotation_column.is_none() && mapped.is_empty() {
            continue;
        }

        for (line, row) in &table.rows {
            let mut parts: Vec<String> = Vec::new();
            if let Some(value) = annotation_column.and_then(|idx| Table::cell(row, idx)) {
                parts.push(value.to_string());
            }
            for (idx, annotation) in &mapped {
                let Some(value) = Table::cell(row, *idx) else {
                    continue;
                };
                match annotation {
                    Value::String(template) => parts.push(template.replace('#', value)),
                    Value::Object(levels) => {
                        if let Some(tag) = levels.get(value).and_then(Value::as_str) {
                            parts.push(tag.to_string());
                        }
                    }
                    _ => {}
                }
            }
            if parts.is_empty() {
                continue;
            }

            let annotation = parts.join(",");
            let verdict = view.annotations().validate(&annotation);
            if !verdict.valid {
                let mut issue = view
                    .issue(codes::HED_ERROR, path)
                    .with_line(*line)
                    .with_evidence(Some(ANNOTATION_COLUMN), Some(annotation));
                if !verdict.diagnostics.is_empty() {
                    issue = issue.with_reason(verdict.diagnostics.join("; "));
                }
                issues.push(issue);
            }
        }
    }
    issues
}

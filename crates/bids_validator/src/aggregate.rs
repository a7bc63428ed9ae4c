//! Issue aggregation into the final report.

use crate::config::ValidatorConfig;
use crate::entities::FilenameMatcher;
use crate::types::FileRecord;
use bids_protocol::{is_fatal, severity_of, Issue, Severity, Summary, ValidationReport};
use tracing::info;

/// Dataset summary over non-ignored files.
///
/// Subjects, sessions and tasks come from filename entities; modalities are
/// the suffixes of files inside a subject directory.
pub fn summarize(files: &[FileRecord], matcher: &dyn FilenameMatcher) -> Summary {
    let mut summary = Summary::default();
    for file in files.iter().filter(|f| !f.is_ignored) {
        summary.total_files += 1;
        summary.size += file.size;

        let Some(keys) = matcher.parse(&file.name) else {
            continue;
        };
        if let Some(subject) = keys.get("sub") {
            summary.subjects.insert(subject.to_string());
            if let Some(suffix) = keys.suffix() {
                summary.modalities.insert(suffix.to_string());
            }
        }
        if let Some(session) = keys.get("ses") {
            summary.sessions.insert(session.to_string());
        }
        if let Some(task) = keys.get("task") {
            summary.tasks.insert(task.to_string());
        }
    }
    summary
}

/// Partitions issues by severity and applies report options
#[derive(Debug, Clone, Copy, Default)]
pub struct IssueAggregator {
    ignore_warnings: bool,
    verbose: bool,
}

impl IssueAggregator {
    pub fn new(config: &ValidatorConfig) -> Self {
        Self {
            ignore_warnings: config.ignore_warnings,
            verbose: config.verbose,
        }
    }

    /// Build the report. Severity comes from the code registry, never from
    /// the issue itself. A fatal code collapses the report to `Invalid`.
    pub fn aggregate(&self, issues: Vec<Issue>, mut summary: Summary) -> ValidationReport {
        for issue in &issues {
            *summary.issue_counts.entry(issue.code).or_default() += 1;
        }

        if let Some(fatal) = issues.iter().find(|i| is_fatal(i.code)) {
            info!(code = fatal.code, path = %fatal.file.relative_path, "Fatal dataset issue, report is Invalid");
            return ValidationReport::Invalid { summary };
        }

        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        for mut issue in issues {
            issue.severity = severity_of(issue.code);
            if !self.verbose {
                issue.evidence = None;
            }
            match issue.severity {
                Severity::Error => errors.push(issue),
                Severity::Warning if !self.ignore_warnings => warnings.push(issue),
                Severity::Warning => {}
            }
        }
        errors.sort();
        warnings.sort();

        info!(errors = errors.len(), warnings = warnings.len(), "Validation report assembled");
        ValidationReport::Complete {
            errors,
            warnings,
            summary,
        }
    }
}

//! Validation entry point
//!
//! Runs the stages in order: ignore rules, traversal, content loading,
//! checkers, aggregation. The cancellation token is checked between stages
//! and while checker results are collected.

use crate::aggregate::{summarize, IssueAggregator};
use crate::cancel::CancellationToken;
use crate::checkers::{Checker, DatasetView};
use crate::collaborators::{AcceptAllAnnotations, AnnotationValidator, HeaderParser, NoHeaderParser};
use crate::config::ValidatorConfig;
use crate::content::{ContentLoader, DatasetContent};
use crate::entities::{EntityFilenameMatcher, FilenameMatcher};
use crate::error::Result;
use crate::ignore_rules::IgnoreRuleSet;
use crate::types::FileRecord;
use crate::walker::{records_from_listing, DatasetWalker, WalkOptions};
use bids_protocol::{codes, Issue, ValidationReport};
use std::any::Any;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Result of a validation run that was not aborted by a structural fault
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Report(ValidationReport),
    /// The caller cancelled the run; no partial report is produced.
    Cancelled,
}

impl ValidationOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn report(&self) -> Option<&ValidationReport> {
        match self {
            Self::Report(report) => Some(report),
            Self::Cancelled => None,
        }
    }

    pub fn into_report(self) -> Option<ValidationReport> {
        match self {
            Self::Report(report) => Some(report),
            Self::Cancelled => None,
        }
    }
}

/// Dataset validator
#[derive(Debug, Clone)]
pub struct Validator {
    config: ValidatorConfig,
    matcher: Arc<dyn FilenameMatcher>,
    header_parser: Arc<dyn HeaderParser>,
    annotations: Arc<dyn AnnotationValidator>,
    cancel: CancellationToken,
}

impl Validator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            config,
            matcher: Arc::new(EntityFilenameMatcher),
            header_parser: Arc::new(NoHeaderParser),
            annotations: Arc::new(AcceptAllAnnotations),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_filename_matcher(mut self, matcher: Arc<dyn FilenameMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_header_parser(mut self, parser: Arc<dyn HeaderParser>) -> Self {
        self.header_parser = parser;
        self
    }

    pub fn with_annotation_validator(mut self, annotations: Arc<dyn AnnotationValidator>) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that aborts runs of this validator when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate a dataset directory on disk.
    ///
    /// # Errors
    ///
    /// Fails only on structural faults: a missing root, a root that is not a
    /// directory, or a directory that cannot be read.
    pub async fn validate_dir(&self, root: &Path) -> Result<ValidationOutcome> {
        let start = Instant::now();
        info!(root = %root.display(), "Starting validation");

        let ignore = IgnoreRuleSet::load(root, &self.config.ignore_file_name).await?;
        let options = WalkOptions {
            follow_symbolic_directories: self.config.follow_symbolic_directories,
            max_concurrency: self.config.concurrency(),
        };
        let walked = DatasetWalker::with_cancel(ignore, options, self.cancel.clone())
            .traverse(root)
            .await?;
        if self.cancel.is_cancelled() {
            return Ok(self.cancelled("traversal"));
        }

        let mut loader = ContentLoader::new(self.header_parser.clone(), self.config.concurrency())
            .with_cancel(self.cancel.clone());
        if self.config.ignore_nifti_headers {
            loader = loader.without_headers();
        }
        let loaded = loader.load(&walked.files).await?;
        if self.cancel.is_cancelled() {
            return Ok(self.cancelled("content loading"));
        }

        let outcome = self.check(walked.files, loaded.content, loaded.issues).await;
        info!(
            root = %root.display(),
            cancelled = outcome.is_cancelled(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Validation finished"
        );
        Ok(outcome)
    }

    /// Validate a pre-enumerated listing with caller-supplied content.
    ///
    /// Listing paths may be prefixed with the dataset folder name
    /// (`ds001/sub-01/...`); content is keyed by canonical relative path.
    pub async fn validate_listing<I>(
        &self,
        entries: I,
        mut content: DatasetContent,
        ignore_file_text: Option<&str>,
    ) -> Result<ValidationOutcome>
    where
        I: IntoIterator<Item = (String, u64)>,
    {
        let ignore = IgnoreRuleSet::with_defaults(ignore_file_text);
        let files = records_from_listing(entries, &ignore);
        if self.config.ignore_nifti_headers {
            content.headers.clear();
        }
        Ok(self.check(files, content, Vec::new()).await)
    }

    async fn check(
        &self,
        files: Vec<FileRecord>,
        content: DatasetContent,
        mut issues: Vec<Issue>,
    ) -> ValidationOutcome {
        let summary = summarize(&files, self.matcher.as_ref());
        let view = DatasetView::new(files, content, self.matcher.clone())
            .with_annotation_validator(self.annotations.clone())
            .with_max_concurrency(self.config.concurrency());

        let checkers = Checker::enabled(&self.config);
        let Some(found) = run_checkers(Arc::new(view), &checkers, &self.cancel).await else {
            return self.cancelled("checkers");
        };
        issues.extend(found);

        ValidationOutcome::Report(IssueAggregator::new(&self.config).aggregate(issues, summary))
    }

    fn cancelled(&self, stage: &str) -> ValidationOutcome {
        info!(stage, "Validation cancelled");
        ValidationOutcome::Cancelled
    }
}

/// Run every checker as its own task.
///
/// Results are collected in checker order. A checker that errors or panics
/// contributes a single internal-error issue instead of its output. Returns
/// `None` if cancelled while waiting.
pub async fn run_checkers(
    view: Arc<DatasetView>,
    checkers: &[Checker],
    cancel: &CancellationToken,
) -> Option<Vec<Issue>> {
    let handles: Vec<(Checker, JoinHandle<anyhow::Result<Vec<Issue>>>)> = checkers
        .iter()
        .map(|checker| {
            let checker = *checker;
            let view = view.clone();
            (checker, tokio::spawn(async move { checker.check(view).await }))
        })
        .collect();

    let mut issues = Vec::new();
    let mut pending = handles.into_iter();
    while let Some((checker, mut handle)) = pending.next() {
        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            joined = &mut handle => Some(joined),
        };
        let Some(result) = joined else {
            handle.abort();
            pending.for_each(|(_, h)| h.abort());
            return None;
        };
        match result {
            Ok(Ok(found)) => {
                debug!(checker = checker.name(), issues = found.len(), "Checker finished");
                issues.extend(found);
            }
            Ok(Err(e)) => {
                warn!(checker = checker.name(), error = %e, "Checker failed");
                issues.push(fault_issue(checker, format!("{:#}", e)));
            }
            Err(e) if e.is_panic() => {
                let detail = panic_message(e.into_panic());
                warn!(checker = checker.name(), panic = %detail, "Checker panicked");
                issues.push(fault_issue(checker, detail));
            }
            Err(e) => {
                warn!(checker = checker.name(), error = %e, "Checker task aborted");
                issues.push(fault_issue(checker, e.to_string()));
            }
        }
    }
    Some(issues)
}

fn fault_issue(checker: Checker, detail: String) -> Issue {
    Issue::at(codes::INTERNAL_ERROR, "/")
        .with_reason(format!("Checker '{}' failed: {}", checker.name(), detail))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

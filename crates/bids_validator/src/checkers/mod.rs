//! Rule checkers
//!
//! Each checker consumes the read-only [`DatasetView`] and produces issues.
//! The set is closed: [`Checker`] dispatches statically and the pipeline runs
//! every enabled variant as an isolated task.

pub mod bval;
pub mod dataset_description;
pub mod events;
pub mod header;
pub mod json_sidecar;

use crate::collaborators::{AcceptAllAnnotations, AnnotationValidator};
use crate::config::ValidatorConfig;
use crate::content::DatasetContent;
use crate::entities::{EntityKeySet, FilenameMatcher};
use crate::sidecar::{EffectiveMetadata, SidecarResolver};
use crate::types::FileRecord;
use bids_protocol::{Issue, IssueFile};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Everything a checker may read. Immutable for the run.
#[derive(Debug)]
pub struct DatasetView {
    files: Vec<FileRecord>,
    by_path: BTreeMap<String, usize>,
    content: DatasetContent,
    resolver: SidecarResolver,
    annotations: Arc<dyn AnnotationValidator>,
    max_concurrency: usize,
}

impl DatasetView {
    /// Build a view, dropping content that belongs to ignored files.
    pub fn new(
        files: Vec<FileRecord>,
        mut content: DatasetContent,
        matcher: Arc<dyn FilenameMatcher>,
    ) -> Self {
        let ignored: BTreeSet<&str> = files
            .iter()
            .filter(|f| f.is_ignored)
            .map(|f| f.relative_path.as_str())
            .collect();
        if !ignored.is_empty() {
            content.json.retain(|k, _| !ignored.contains(k.as_str()));
            content.tables.retain(|k, _| !ignored.contains(k.as_str()));
            content.bvals.retain(|k, _| !ignored.contains(k.as_str()));
            content.headers.retain(|k, _| !ignored.contains(k.as_str()));
        }

        let by_path = files
            .iter()
            .enumerate()
            .map(|(i, f)| (f.relative_path.clone(), i))
            .collect();

        Self {
            files,
            by_path,
            content,
            resolver: SidecarResolver::new(matcher),
            annotations: Arc::new(AcceptAllAnnotations),
            max_concurrency: 200,
        }
    }

    pub fn with_annotation_validator(mut self, annotations: Arc<dyn AnnotationValidator>) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Non-ignored file records
    pub fn files(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.iter().filter(|f| !f.is_ignored)
    }

    pub fn all_files(&self) -> &[FileRecord] {
        &self.files
    }

    pub fn file(&self, relative_path: &str) -> Option<&FileRecord> {
        self.by_path.get(relative_path).map(|i| &self.files[*i])
    }

    pub fn content(&self) -> &DatasetContent {
        &self.content
    }

    pub fn resolver(&self) -> &SidecarResolver {
        &self.resolver
    }

    pub fn matcher(&self) -> &dyn FilenameMatcher {
        self.resolver.matcher()
    }

    pub fn annotations(&self) -> &dyn AnnotationValidator {
        self.annotations.as_ref()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Parse the file name at the end of `relative_path`.
    pub fn entities_of(&self, relative_path: &str) -> Option<EntityKeySet> {
        self.matcher().parse(crate::types::file_name_of(relative_path))
    }

    /// Effective sidecar metadata for a data file.
    pub fn effective_metadata(&self, data_path: &str) -> Arc<EffectiveMetadata> {
        self.resolver.resolve(data_path, &self.content.json)
    }

    /// Issue file reference for a path, whether or not a record exists.
    pub fn issue_file(&self, relative_path: &str) -> IssueFile {
        match self.file(relative_path) {
            Some(record) => record.issue_file(),
            None => IssueFile::from_relative_path(relative_path),
        }
    }

    pub fn issue(&self, code: u16, relative_path: &str) -> Issue {
        Issue::new(code, self.issue_file(relative_path))
    }
}

/// The closed set of rule checkers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Checker {
    DatasetDescription,
    HeaderConsistency,
    Events,
    JsonSidecar,
    Bval,
}

impl Checker {
    pub const ALL: [Checker; 5] = [
        Checker::DatasetDescription,
        Checker::HeaderConsistency,
        Checker::Events,
        Checker::JsonSidecar,
        Checker::Bval,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Checker::DatasetDescription => "dataset_description",
            Checker::HeaderConsistency => "header_consistency",
            Checker::Events => "events",
            Checker::JsonSidecar => "json_sidecar",
            Checker::Bval => "bval",
        }
    }

    /// Checkers enabled under `config`, in run order.
    pub fn enabled(config: &ValidatorConfig) -> Vec<Checker> {
        Self::ALL
            .into_iter()
            .filter(|c| !(config.ignore_nifti_headers && *c == Checker::HeaderConsistency))
            .collect()
    }

    pub async fn check(self, view: Arc<DatasetView>) -> anyhow::Result<Vec<Issue>> {
        match self {
            Checker::DatasetDescription => dataset_description::check(&view),
            Checker::HeaderConsistency => header::check(&view),
            Checker::Events => events::check(view).await,
            Checker::JsonSidecar => json_sidecar::check(&view),
            Checker::Bval => bval::check(&view),
        }
    }
}

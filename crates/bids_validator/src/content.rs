//! Content loading for a validation run.
//!
//! Reads JSON sidecars, tabular files and bval vectors for every non-ignored
//! file, and asks the [`HeaderParser`] for scan headers. Reads run as tasks
//! under a semaphore. Unreadable or unparseable content becomes an issue;
//! the run continues.

use crate::cancel::CancellationToken;
use crate::collaborators::{HeaderParser, NiftiHeader};
use crate::error::Result;
use crate::types::FileRecord;
use bids_protocol::{codes, Issue};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Parsed JSON keyed by canonical relative path
pub type JsonContentMap = BTreeMap<String, Value>;

/// All externally read content for a run, keyed by canonical relative path.
///
/// Immutable once loaded; shared by every checker.
#[derive(Debug, Clone, Default)]
pub struct DatasetContent {
    pub json: JsonContentMap,
    /// Raw text of `.tsv` files
    pub tables: BTreeMap<String, String>,
    /// Raw text of `.bval` files
    pub bvals: BTreeMap<String, String>,
    pub headers: BTreeMap<String, NiftiHeader>,
}

impl DatasetContent {
    pub fn with_json(mut self, path: &str, value: Value) -> Self {
        self.json.insert(path.to_string(), value);
        self
    }

    pub fn with_table(mut self, path: &str, text: &str) -> Self {
        self.tables.insert(path.to_string(), text.to_string());
        self
    }

    pub fn with_bval(mut self, path: &str, text: &str) -> Self {
        self.bvals.insert(path.to_string(), text.to_string());
        self
    }

    pub fn with_header(mut self, path: &str, header: NiftiHeader) -> Self {
        self.headers.insert(path.to_string(), header);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentKind {
    Json,
    Table,
    Bval,
    Header,
}

impl ContentKind {
    fn of(file: &FileRecord) -> Option<Self> {
        if file.has_extension(".json") {
            Some(ContentKind::Json)
        } else if file.has_extension(".tsv") {
            Some(ContentKind::Table)
        } else if file.has_extension(".bval") {
            Some(ContentKind::Bval)
        } else if file.has_extension(".nii") || file.has_extension(".nii.gz") {
            Some(ContentKind::Header)
        } else {
            None
        }
    }
}

enum Loaded {
    Json(Value),
    Table(String),
    Bval(String),
    Header(NiftiHeader),
    Nothing,
    Failed(Issue),
}

/// Content plus the issues raised while reading it
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub content: DatasetContent,
    pub issues: Vec<Issue>,
}

/// Loads dataset content from disk
#[derive(Debug, Clone)]
pub struct ContentLoader {
    permits: Arc<Semaphore>,
    header_parser: Arc<dyn HeaderParser>,
    read_headers: bool,
    cancel: CancellationToken,
}

impl ContentLoader {
    pub fn new(header_parser: Arc<dyn HeaderParser>, max_concurrency: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            header_parser,
            read_headers: true,
            cancel: CancellationToken::new(),
        }
    }

    /// Skip header decoding entirely.
    pub fn without_headers(mut self) -> Self {
        self.read_headers = false;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn load(&self, files: &[FileRecord]) -> Result<LoadOutcome> {
        let start = Instant::now();
        let mut tasks: JoinSet<(String, ContentKind, Loaded)> = JoinSet::new();

        for file in files.iter().filter(|f| !f.is_ignored && !f.is_directory) {
            let Some(kind) = ContentKind::of(file) else {
                continue;
            };
            if kind == ContentKind::Header && !self.read_headers {
                continue;
            }

            let file = file.clone();
            let permits = self.permits.clone();
            let parser = self.header_parser.clone();
            let cancel = self.cancel.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                if cancel.is_cancelled() {
                    return (file.relative_path, kind, Loaded::Nothing);
                }
                let loaded = load_one(&file, kind, parser).await;
                (file.relative_path, kind, loaded)
            });
        }

        let mut outcome = LoadOutcome::default();
        while let Some(joined) = tasks.join_next().await {
            let (path, kind, loaded) = joined?;
            let content = &mut outcome.content;
            match loaded {
                Loaded::Json(value) => {
                    content.json.insert(path, value);
                }
                Loaded::Table(text) => {
                    content.tables.insert(path, text);
                }
                Loaded::Bval(text) => {
                    content.bvals.insert(path, text);
                }
                Loaded::Header(header) => {
                    content.headers.insert(path, header);
                }
                Loaded::Nothing => {}
                Loaded::Failed(issue) => {
                    debug!(path = %path, kind = ?kind, code = issue.code, "Content not loaded");
                    outcome.issues.push(issue);
                }
            }
        }
        outcome.issues.sort();

        info!(
            json = outcome.content.json.len(),
            tables = outcome.content.tables.len(),
            bvals = outcome.content.bvals.len(),
            headers = outcome.content.headers.len(),
            issues = outcome.issues.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Content loaded"
        );
        Ok(outcome)
    }
}

async fn load_one(file: &FileRecord, kind: ContentKind, parser: Arc<dyn HeaderParser>) -> Loaded {
    if kind == ContentKind::Header {
        let path = file.absolute_path.clone();
        return match tokio::task::spawn_blocking(move || parser.parse(&path)).await {
            Ok(Ok(Some(header))) => Loaded::Header(header),
            Ok(Ok(None)) => Loaded::Nothing,
            Ok(Err(e)) => Loaded::Failed(
                Issue::new(codes::NIFTI_HEADER_UNREADABLE, file.issue_file())
                    .with_reason(format!("{:#}", e)),
            ),
            Err(e) => Loaded::Failed(
                Issue::new(codes::NIFTI_HEADER_UNREADABLE, file.issue_file())
                    .with_reason(e.to_string()),
            ),
        };
    }

    let text = match tokio::fs::read_to_string(&file.absolute_path).await {
        Ok(text) => text,
        Err(e) => {
            return Loaded::Failed(
                Issue::new(codes::FILE_READ, file.issue_file()).with_reason(e.to_string()),
            )
        }
    };

    match kind {
        ContentKind::Json => match serde_json::from_str::<Value>(&text) {
            Ok(value) => Loaded::Json(value),
            Err(e) => Loaded::Failed(
                Issue::new(codes::JSON_INVALID, file.issue_file())
                    .with_reason(e.to_string())
                    .with_line(e.line()),
            ),
        },
        ContentKind::Table => Loaded::Table(text),
        ContentKind::Bval => Loaded::Bval(text),
        ContentKind::Header => Loaded::Nothing,
    }
}

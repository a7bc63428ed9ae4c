//! Async dataset traversal
//!
//! Produces the flat list of [`FileRecord`]s for a dataset root.
//!
//! # Design
//!
//! - Sibling subdirectories are walked as concurrent tasks; directory reads
//!   are bounded by a semaphore that is held only while a directory is read
//! - Entries are sorted by name and child results are slotted back by index,
//!   so output order does not depend on task scheduling
//! - Ignored directories are pruned; ignored files are emitted flagged
//! - Symlinks are resolved when following is enabled; dangling links are
//!   skipped and a link back into its own ancestry is not descended

use crate::cancel::CancellationToken;
use crate::error::{Result, ValidatorError};
use crate::ignore_rules::IgnoreRuleSet;
use crate::types::{join_relative, FileRecord};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Traversal options
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Resolve symlinks and descend into symlinked directories
    pub follow_symbolic_directories: bool,
    /// Maximum concurrent directory reads
    pub max_concurrency: usize,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            follow_symbolic_directories: true,
            max_concurrency: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Directory,
    File,
    Symlink,
}

#[derive(Debug)]
struct DirEntryInfo {
    name: String,
    path: PathBuf,
    kind: EntryKind,
    size: u64,
}

/// Statistics from a traversal
#[derive(Debug, Clone, Default)]
pub struct WalkStats {
    pub dirs_read: u64,
    pub files_emitted: u64,
    pub files_ignored: u64,
    pub dirs_pruned: u64,
    pub links_skipped: u64,
}

#[derive(Debug, Default)]
struct WalkCounters {
    dirs_read: AtomicU64,
    files_emitted: AtomicU64,
    files_ignored: AtomicU64,
    dirs_pruned: AtomicU64,
    links_skipped: AtomicU64,
}

impl WalkCounters {
    fn snapshot(&self) -> WalkStats {
        WalkStats {
            dirs_read: self.dirs_read.load(Ordering::Relaxed),
            files_emitted: self.files_emitted.load(Ordering::Relaxed),
            files_ignored: self.files_ignored.load(Ordering::Relaxed),
            dirs_pruned: self.dirs_pruned.load(Ordering::Relaxed),
            links_skipped: self.links_skipped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
struct WalkContext {
    ignore: IgnoreRuleSet,
    follow_links: bool,
    permits: Semaphore,
    cancel: CancellationToken,
    counters: WalkCounters,
}

/// Result of walking one directory
#[derive(Debug)]
pub struct WalkResult {
    pub files: Vec<FileRecord>,
    pub stats: WalkStats,
}

type WalkFuture = Pin<Box<dyn Future<Output = Result<Vec<FileRecord>>> + Send>>;

/// Walks a dataset directory tree
#[derive(Debug, Clone)]
pub struct DatasetWalker {
    ctx: Arc<WalkContext>,
}

impl DatasetWalker {
    pub fn new(ignore: IgnoreRuleSet, options: WalkOptions) -> Self {
        Self::with_cancel(ignore, options, CancellationToken::new())
    }

    pub fn with_cancel(ignore: IgnoreRuleSet, options: WalkOptions, cancel: CancellationToken) -> Self {
        Self {
            ctx: Arc::new(WalkContext {
                ignore,
                follow_links: options.follow_symbolic_directories,
                permits: Semaphore::new(options.max_concurrency.max(1)),
                cancel,
                counters: WalkCounters::default(),
            }),
        }
    }

    /// Walk `root` and return every non-pruned file.
    ///
    /// Returns an empty list if cancelled part way; callers must check the
    /// token before using the result.
    pub async fn traverse(&self, root: &Path) -> Result<WalkResult> {
        let start = Instant::now();

        let metadata = match tokio::fs::metadata(root).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ValidatorError::RootNotFound(root.to_path_buf()));
            }
            Err(source) => {
                return Err(ValidatorError::Traversal {
                    path: root.to_path_buf(),
                    source,
                })
            }
        };
        if !metadata.is_dir() {
            return Err(ValidatorError::NotADirectory(root.to_path_buf()));
        }

        let canonical_root = tokio::fs::canonicalize(root)
            .await
            .map_err(|source| ValidatorError::Traversal {
                path: root.to_path_buf(),
                source,
            })?;

        let files = walk_dir(
            self.ctx.clone(),
            canonical_root,
            String::new(),
            Arc::new(Vec::new()),
        )
        .await?;

        if self.ctx.cancel.is_cancelled() {
            debug!(root = %root.display(), "Traversal cancelled, discarding partial output");
            return Ok(WalkResult {
                files: Vec::new(),
                stats: self.ctx.counters.snapshot(),
            });
        }

        let stats = self.ctx.counters.snapshot();
        info!(
            root = %root.display(),
            files = files.len(),
            dirs = stats.dirs_read,
            ignored = stats.files_ignored,
            pruned = stats.dirs_pruned,
            duration_ms = start.elapsed().as_millis() as u64,
            "Dataset traversal complete"
        );

        Ok(WalkResult { files, stats })
    }
}

/// Canonicalize a pre-enumerated listing, applying ignore rules.
///
/// Output is sorted by relative path.
pub fn records_from_listing<I>(entries: I, ignore: &IgnoreRuleSet) -> Vec<FileRecord>
where
    I: IntoIterator<Item = (String, u64)>,
{
    let mut records: Vec<FileRecord> = entries
        .into_iter()
        .map(|(path, size)| {
            let record = FileRecord::listed(&path, size);
            let ignored = ignore.ignores(&record.relative_path);
            record.with_ignored(ignored)
        })
        .collect();
    records.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    records
}

/// Recursively walk `dir`, which is reached at canonical `rel_prefix`.
///
/// `link_tips` holds the real directories from which a symlink was followed
/// on the way here; together with `dir` they bound the ancestry used for
/// cycle detection.
fn walk_dir(
    ctx: Arc<WalkContext>,
    dir: PathBuf,
    rel_prefix: String,
    link_tips: Arc<Vec<PathBuf>>,
) -> WalkFuture {
    Box::pin(async move {
        if ctx.cancel.is_cancelled() {
            return Ok(Vec::new());
        }

        let entries = read_sorted_entries(&ctx, &dir).await?;
        let mut slots: Vec<Option<Vec<FileRecord>>> = Vec::with_capacity(entries.len());
        let mut children: JoinSet<(usize, Result<Vec<FileRecord>>)> = JoinSet::new();

        for entry in entries {
            let relative_path = join_relative(&rel_prefix, &entry.name);
            match entry.kind {
                EntryKind::Directory => {
                    if ctx.ignore.ignores_dir(&relative_path) {
                        ctx.counters.dirs_pruned.fetch_add(1, Ordering::Relaxed);
                        debug!(path = %relative_path, "Pruning ignored directory");
                        continue;
                    }
                    let idx = slots.len();
                    slots.push(None);
                    let child = walk_dir(ctx.clone(), entry.path, relative_path, link_tips.clone());
                    children.spawn(async move { (idx, child.await) });
                }
                EntryKind::File => {
                    let record = FileRecord::file(entry.path, relative_path, entry.size);
                    slots.push(Some(vec![emit(&ctx, record)]));
                }
                EntryKind::Symlink if !ctx.follow_links => {
                    let record = FileRecord::file(entry.path, relative_path, entry.size)
                        .with_symlink(true);
                    slots.push(Some(vec![emit(&ctx, record)]));
                }
                EntryKind::Symlink => {
                    let target = match tokio::fs::canonicalize(&entry.path).await {
                        Ok(t) => t,
                        Err(e) => {
                            ctx.counters.links_skipped.fetch_add(1, Ordering::Relaxed);
                            debug!(path = %relative_path, error = %e, "Skipping dangling symlink");
                            continue;
                        }
                    };
                    let metadata = match tokio::fs::metadata(&target).await {
                        Ok(m) => m,
                        Err(e) => {
                            ctx.counters.links_skipped.fetch_add(1, Ordering::Relaxed);
                            debug!(path = %relative_path, error = %e, "Skipping unreadable symlink target");
                            continue;
                        }
                    };

                    if !metadata.is_dir() {
                        let record = FileRecord::file(entry.path, relative_path, metadata.len())
                            .with_symlink(true);
                        slots.push(Some(vec![emit(&ctx, record)]));
                        continue;
                    }

                    if ctx.ignore.ignores_dir(&relative_path) {
                        ctx.counters.dirs_pruned.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                    if is_ancestor(&target, &dir, &link_tips) {
                        ctx.counters.links_skipped.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            path = %relative_path,
                            target = %target.display(),
                            "Symlink points into its own ancestry, not descending"
                        );
                        continue;
                    }

                    let mut tips = link_tips.as_ref().clone();
                    tips.push(dir.clone());
                    let idx = slots.len();
                    slots.push(None);
                    let child = walk_dir(ctx.clone(), target, relative_path, Arc::new(tips));
                    children.spawn(async move { (idx, child.await) });
                }
            }
        }

        while let Some(joined) = children.join_next().await {
            let (idx, result) = joined?;
            slots[idx] = Some(result?);
        }

        Ok(slots.into_iter().flatten().flatten().collect())
    })
}

fn emit(ctx: &WalkContext, record: FileRecord) -> FileRecord {
    let ignored = ctx.ignore.ignores(&record.relative_path);
    if ignored {
        ctx.counters.files_ignored.fetch_add(1, Ordering::Relaxed);
    }
    ctx.counters.files_emitted.fetch_add(1, Ordering::Relaxed);
    record.with_ignored(ignored)
}

fn is_ancestor(target: &Path, dir: &Path, link_tips: &[PathBuf]) -> bool {
    dir.starts_with(target) || link_tips.iter().any(|tip| tip.starts_with(target))
}

async fn read_sorted_entries(ctx: &WalkContext, dir: &Path) -> Result<Vec<DirEntryInfo>> {
    let traversal_err = |source: std::io::Error| ValidatorError::Traversal {
        path: dir.to_path_buf(),
        source,
    };

    let _permit = ctx
        .permits
        .acquire()
        .await
        .map_err(|e| ValidatorError::Task(e.to_string()))?;

    let mut read_dir = tokio::fs::read_dir(dir).await.map_err(traversal_err)?;
    let mut entries = Vec::new();
    while let Some(entry) = read_dir.next_entry().await.map_err(traversal_err)? {
        let file_type = entry.file_type().await.map_err(traversal_err)?;
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        let size = match kind {
            EntryKind::File => entry.metadata().await.map(|m| m.len()).unwrap_or(0),
            _ => 0,
        };
        entries.push(DirEntryInfo {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: entry.path(),
            kind,
            size,
        });
    }
    ctx.counters.dirs_read.fetch_add(1, Ordering::Relaxed);

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

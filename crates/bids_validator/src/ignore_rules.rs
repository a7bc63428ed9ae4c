//! Gitignore-style exclusion rules for dataset traversal.
//!
//! Rules are evaluated in order; later rules override earlier ones and a
//! `!pattern` re-includes a path. Paths are matched with their leading `/`
//! stripped, so `/derivatives` is anchored at the dataset root.

use crate::error::Result;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::Path;
use tracing::{debug, warn};

/// Exclusions applied to every dataset before user patterns.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] =
    &[".*", "!*.icloud", "/derivatives", "/sourcedata", "/code"];

/// Compiled, immutable ignore predicate.
#[derive(Debug, Clone)]
pub struct IgnoreRuleSet {
    matcher: Gitignore,
    patterns: Vec<String>,
}

impl IgnoreRuleSet {
    /// Compile default patterns followed by the content of a user pattern file.
    ///
    /// Lines that fail to compile are kept out of the matcher, so they never match.
    pub fn compile(default_patterns: &[&str], user_pattern_text: Option<&str>) -> Self {
        let mut builder = GitignoreBuilder::new("/");
        let mut patterns = Vec::new();

        let user_lines = user_pattern_text.into_iter().flat_map(str::lines);
        for line in default_patterns.iter().copied().chain(user_lines) {
            match builder.add_line(None, line) {
                Ok(_) => {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() && !trimmed.starts_with('#') {
                        patterns.push(trimmed.to_string());
                    }
                }
                Err(e) => {
                    debug!(pattern = %line, error = %e, "Skipping malformed ignore pattern");
                }
            }
        }

        let matcher = builder.build().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to build ignore matcher, nothing will be ignored");
            Gitignore::empty()
        });

        Self { matcher, patterns }
    }

    /// Default rule set plus optional user pattern file content.
    pub fn with_defaults(user_pattern_text: Option<&str>) -> Self {
        Self::compile(DEFAULT_IGNORE_PATTERNS, user_pattern_text)
    }

    /// Default rule set plus the dataset's own pattern file, if it has one.
    pub async fn load(root: &Path, file_name: &str) -> Result<Self> {
        let path = root.join(file_name);
        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Ok(Self::default());
        }

        let bytes = tokio::fs::read(&path).await?;
        let text = String::from_utf8_lossy(&bytes);
        let rules = Self::with_defaults(Some(&text));
        debug!(path = %path.display(), patterns = rules.patterns.len(), "Loaded ignore file");
        Ok(rules)
    }

    /// Is this file path (or any of its parent directories) ignored?
    pub fn ignores(&self, relative_path: &str) -> bool {
        self.is_match(relative_path, false)
    }

    /// Is this directory path (or any of its parents) ignored?
    pub fn ignores_dir(&self, relative_path: &str) -> bool {
        self.is_match(relative_path, true)
    }

    /// Patterns that compiled, in evaluation order.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    fn is_match(&self, relative_path: &str, is_dir: bool) -> bool {
        let candidate = relative_path.trim_start_matches('/');
        if candidate.is_empty() {
            return false;
        }
        self.matcher
            .matched_path_or_any_parents(candidate, is_dir)
            .is_ignore()
    }
}

impl Default for IgnoreRuleSet {
    fn default() -> Self {
        Self::with_defaults(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rules_hide_dotfiles_and_reserved_roots() {
        let rules = IgnoreRuleSet::default();
        assert!(rules.ignores("/.DS_Store"));
        assert!(rules.ignores_dir("/.git"));
        assert!(rules.ignores("/.git/config"));
        assert!(rules.ignores("/sub-01/anat/.hidden.nii"));
        assert!(rules.ignores_dir("/derivatives"));
        assert!(rules.ignores("/derivatives/fmriprep/sub-01_bold.nii.gz"));
        assert!(rules.ignores("/sourcedata/raw.dcm"));
        assert!(rules.ignores_dir("/code"));
    }

    #[test]
    fn icloud_placeholders_are_reincluded() {
        let rules = IgnoreRuleSet::default();
        assert!(!rules.ignores("/sub-01/.sub-01_T1w.nii.icloud"));
    }

    #[test]
    fn reserved_roots_are_anchored() {
        let rules = IgnoreRuleSet::default();
        assert!(!rules.ignores("/sub-01/code/script.py"));
        assert!(!rules.ignores("/sub-01/anat/sub-01_T1w.nii.gz"));
        assert!(!rules.ignores("/dataset_description.json"));
    }

    #[test]
    fn user_patterns_apply_after_defaults() {
        let rules = IgnoreRuleSet::with_defaults(Some("*.log\n!keep.log\n# comment\n\nextra/\n"));
        assert!(rules.ignores("/run.log"));
        assert!(!rules.ignores("/keep.log"));
        assert!(rules.ignores_dir("/sub-01/extra"));
        assert!(rules.ignores("/sub-01/extra/file.txt"));
        assert_eq!(
            rules.patterns().last().map(String::as_str),
            Some("extra/")
        );
    }

    #[test]
    fn user_negation_can_reinclude_default_exclusion() {
        let rules = IgnoreRuleSet::with_defaults(Some("!/code"));
        assert!(!rules.ignores_dir("/code"));
    }

    #[test]
    fn malformed_patterns_never_match() {
        let rules = IgnoreRuleSet::with_defaults(Some("[\n*.tmp"));
        assert!(!rules.ignores("/["));
        assert!(rules.ignores("/scratch.tmp"));
        assert!(!rules.patterns().iter().any(|p| p == "["));
    }

    #[tokio::test]
    async fn load_reads_pattern_file_when_present() {
        let dir = tempfile::TempDir::new().unwrap();
        let rules = IgnoreRuleSet::load(dir.path(), ".bidsignore").await.unwrap();
        assert_eq!(rules.patterns().len(), DEFAULT_IGNORE_PATTERNS.len());

        std::fs::write(dir.path().join(".bidsignore"), "*_physio.tsv.gz\n").unwrap();
        let rules = IgnoreRuleSet::load(dir.path(), ".bidsignore").await.unwrap();
        assert!(rules.ignores("/sub-01/func/sub-01_task-rest_physio.tsv.gz"));
    }

    #[tokio::test]
    async fn load_tolerates_invalid_utf8() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join(".bidsignore"), b"\xff\xfe[bad\n*.log\n").unwrap();
        let rules = IgnoreRuleSet::load(dir.path(), ".bidsignore").await.unwrap();
        assert!(rules.ignores("/run.log"));
        assert!(!rules.ignores("/sub-01/anat/sub-01_T1w.nii.gz"));
    }

    #[test]
    fn root_itself_is_never_ignored() {
        let rules = IgnoreRuleSet::default();
        assert!(!rules.ignores("/"));
        assert!(!rules.ignores(""));
    }
}

//! Configuration for a validation run

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the dataset-supplied ignore pattern file.
pub const DEFAULT_IGNORE_FILE_NAME: &str = ".bidsignore";

/// Options recognized by the validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Drop warning-severity issues from the final report
    #[serde(default, alias = "ignoreWarnings")]
    pub ignore_warnings: bool,

    /// Skip the header consistency checker
    #[serde(default, alias = "ignoreNiftiHeaders")]
    pub ignore_nifti_headers: bool,

    /// Attach field/value evidence to issues
    #[serde(default)]
    pub verbose: bool,

    /// Resolve symlinks and descend into symlinked directories
    #[serde(
        default = "default_follow_symbolic_directories",
        alias = "followSymbolicDirectories"
    )]
    pub follow_symbolic_directories: bool,

    /// Upper bound on concurrent directory reads, file reads and per-acquisition checks
    #[serde(default = "default_max_concurrency", alias = "maxConcurrency")]
    pub max_concurrency: usize,

    /// Ignore pattern file read from the dataset root
    #[serde(default = "default_ignore_file_name", alias = "ignoreFileName")]
    pub ignore_file_name: String,
}

fn default_follow_symbolic_directories() -> bool {
    true
}

fn default_max_concurrency() -> usize {
    200
}

fn default_ignore_file_name() -> String {
    DEFAULT_IGNORE_FILE_NAME.to_string()
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            ignore_warnings: false,
            ignore_nifti_headers: false,
            verbose: false,
            follow_symbolic_directories: default_follow_symbolic_directories(),
            max_concurrency: default_max_concurrency(),
            ignore_file_name: default_ignore_file_name(),
        }
    }
}

impl ValidatorConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let config: ValidatorConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::ValidatorError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Concurrency limit, never zero.
    pub fn concurrency(&self) -> usize {
        self.max_concurrency.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ValidatorConfig::default();
        assert!(!config.ignore_warnings);
        assert!(!config.ignore_nifti_headers);
        assert!(config.follow_symbolic_directories);
        assert_eq!(config.max_concurrency, 200);
        assert_eq!(config.ignore_file_name, ".bidsignore");
    }

    #[test]
    fn test_config_accepts_option_record_names() {
        let config = ValidatorConfig::from_toml_str(
            r#"
ignoreWarnings = true
ignoreNiftiHeaders = true
verbose = true
max_concurrency = 0
"#,
        )
        .unwrap();
        assert!(config.ignore_warnings);
        assert!(config.ignore_nifti_headers);
        assert!(config.verbose);
        assert!(config.follow_symbolic_directories);
        assert_eq!(config.concurrency(), 1);
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("validator.toml");
        let config = ValidatorConfig {
            verbose: true,
            follow_symbolic_directories: false,
            ..ValidatorConfig::default()
        };
        config.save(&path).unwrap();
        let loaded = ValidatorConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_rejects_bad_toml() {
        let err = ValidatorConfig::from_toml_str("verbose = \"sometimes\"").unwrap_err();
        assert!(matches!(err, crate::ValidatorError::Config(_)));
    }
}

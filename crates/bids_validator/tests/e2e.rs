//! End-to-end tests for the validator
//!
//! Datasets are written to a temp directory and validated through
//! `Validator::validate_dir`. Scan headers are stored as JSON in the image
//! files and decoded by a test parser.

use bids_validator::{
    codes, HeaderParser, NiftiHeader, Severity, ValidationOutcome, ValidationReport, Validator,
    ValidatorConfig, ValidatorError,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bids_validator=debug".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

/// Header parser reading `{"dim": [...], "pixdim": [...], "xyzt_units": [...]}`
#[derive(Debug)]
struct JsonHeaderParser;

impl HeaderParser for JsonHeaderParser {
    fn parse(&self, path: &Path) -> anyhow::Result<Option<NiftiHeader>> {
        let text = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&text)?))
    }
}

/// Create a test environment with temp directories
struct TestEnv {
    /// Temp directory (cleaned up on drop)
    _temp: TempDir,
    /// Dataset root
    pub root: PathBuf,
}

impl TestEnv {
    fn new() -> Self {
        init_tracing();
        let temp = TempDir::new().expect("Failed to create temp dir");
        let root = temp.path().join("ds001");
        fs::create_dir_all(&root).expect("Failed to create dataset root");
        Self { _temp: temp, root }
    }

    fn write_file(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).ok();
        }
        fs::write(&path, content).expect("Failed to write file");
        path
    }

    fn write_header(&self, rel: &str, dim: &[i64]) {
        let header = serde_json::json!({
            "dim": dim,
            "pixdim": [1.0, 3.0, 3.0, 3.0, 2.0],
            "xyzt_units": [2, 8],
        });
        self.write_file(rel, &header.to_string());
    }

    /// A small dataset that validates with one error and one warning
    fn populate(&self) {
        self.write_file(
            "dataset_description.json",
            r#"{"Name": "Test", "BIDSVersion": "1.4.0", "Authors": ["Benny", "the Jets"]}"#,
        );
        self.write_file("participants.tsv", "participant_id\nsub-01\n");
        self.write_file(
            "task-rest_bold.json",
            r#"{"RepetitionTime": 2.0, "TaskName": "rest"}"#,
        );
        self.write_header("sub-01/anat/sub-01_T1w.nii.gz", &[3, 176, 256, 256]);
        self.write_header("sub-01/func/sub-01_task-rest_bold.nii.gz", &[4, 64, 64, 32, 10]);
        self.write_file(
            "sub-01/func/sub-01_task-rest_events.tsv",
            "onset\tduration\tstim_file\n0.0\t1.0\tface.png\n12.0\t1.0\tn/a\n",
        );
        self.write_file("sub-01/dwi/sub-01_dwi.bval", "0 1000\n1000 0\n");
        self.write_file("stimuli/face.png", "png");
        self.write_file("stimuli/house.png", "png");

        // Never inspected
        self.write_file("derivatives/sub-01_dwi.bval", "not numbers");
        self.write_file(".hidden.json", "{broken");
        self.write_file("sub-01/scratch/notes.json", "{broken");
        self.write_file(".bidsignore", "scratch/\n");
    }

    fn validator(&self, config: ValidatorConfig) -> Validator {
        Validator::new(config).with_header_parser(Arc::new(JsonHeaderParser))
    }
}

async fn report(validator: &Validator, root: &Path) -> ValidationReport {
    validator
        .validate_dir(root)
        .await
        .expect("validation failed")
        .into_report()
        .expect("run was cancelled")
}

fn codes_of(issues: &[bids_validator::Issue]) -> Vec<u16> {
    issues.iter().map(|i| i.code).collect()
}

// ============================================================================
// Report Tests
// ============================================================================

#[tokio::test]
async fn test_dataset_report() {
    let env = TestEnv::new();
    env.populate();

    let report = report(&env.validator(ValidatorConfig::default()), &env.root).await;

    assert_eq!(codes_of(report.errors()), vec![codes::BVAL_MULTIPLE_ROWS]);
    assert_eq!(codes_of(report.warnings()), vec![codes::UNUSED_STIMULUS]);
    assert_eq!(report.errors()[0].file.relative_path, "/sub-01/dwi/sub-01_dwi.bval");
    assert_eq!(report.errors()[0].severity, Severity::Error);
    assert_eq!(report.warnings()[0].file.relative_path, "/stimuli/house.png");

    let summary = report.summary();
    assert_eq!(summary.subjects.iter().collect::<Vec<_>>(), vec!["01"]);
    assert_eq!(summary.tasks.iter().collect::<Vec<_>>(), vec!["rest"]);
    assert!(summary.modalities.contains("bold"));
    assert!(summary.modalities.contains("T1w"));
}

#[tokio::test]
async fn test_ignored_files_never_appear_in_issues() {
    let env = TestEnv::new();
    env.populate();

    let report = report(&env.validator(ValidatorConfig::default()), &env.root).await;
    for issue in report.errors().iter().chain(report.warnings()) {
        let path = &issue.file.relative_path;
        assert!(!path.starts_with("/derivatives"), "ignored file reported: {}", path);
        assert!(!path.contains("scratch"), "ignored file reported: {}", path);
        assert!(!path.starts_with("/."), "ignored file reported: {}", path);
    }
    assert!(!report.has_code(codes::JSON_INVALID));
}

#[tokio::test]
async fn test_missing_description_is_invalid() {
    let env = TestEnv::new();
    env.populate();
    fs::remove_file(env.root.join("dataset_description.json")).unwrap();

    let report = report(&env.validator(ValidatorConfig::default()), &env.root).await;
    assert!(report.is_invalid());

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["errors"], "Invalid");
    assert!(json.get("warnings").is_none());
    assert_eq!(json["summary"]["totalFiles"], 8);
}

#[tokio::test]
async fn test_runs_are_byte_identical() {
    let env = TestEnv::new();
    env.populate();
    env.write_file("sub-02/func/sub-02_task-rest_events.tsv", "onset\n100\n");
    env.write_header("sub-02/func/sub-02_task-rest_bold.nii.gz", &[4, 64, 64, 32, 10]);

    let validator = env.validator(ValidatorConfig {
        verbose: true,
        ..ValidatorConfig::default()
    });
    let first = report(&validator, &env.root).await.to_json().unwrap();
    let second = report(&validator, &env.root).await.to_json().unwrap();
    assert_eq!(first, second);
    assert!(first.contains("\"code\": 85"));
}

#[tokio::test]
async fn test_concurrency_limit_does_not_change_report() {
    let env = TestEnv::new();
    env.populate();
    for sub in 2..8 {
        env.write_header(
            &format!("sub-0{sub}/func/sub-0{sub}_task-rest_bold.nii.gz"),
            &[4, 64, 64, 32, 10],
        );
        env.write_file(&format!("sub-0{sub}/dwi/sub-0{sub}_dwi.bval"), "0 x");
    }

    let serial = env.validator(ValidatorConfig {
        max_concurrency: 1,
        ..ValidatorConfig::default()
    });
    let parallel = env.validator(ValidatorConfig::default());
    let a = report(&serial, &env.root).await;
    let b = report(&parallel, &env.root).await;
    assert_eq!(a, b);
    assert_eq!(a.errors().iter().filter(|i| i.code == codes::BVAL_NON_NUMERIC).count(), 6);
}

// ============================================================================
// Option Tests
// ============================================================================

#[tokio::test]
async fn test_ignore_warnings() {
    let env = TestEnv::new();
    env.populate();

    let report = report(
        &env.validator(ValidatorConfig {
            ignore_warnings: true,
            ..ValidatorConfig::default()
        }),
        &env.root,
    )
    .await;
    assert!(report.warnings().is_empty());
    assert_eq!(report.errors().len(), 1);
    assert_eq!(report.summary().issue_counts[&codes::UNUSED_STIMULUS], 1);
}

#[tokio::test]
async fn test_ignore_nifti_headers() {
    let env = TestEnv::new();
    env.populate();
    env.write_header("sub-01/func/sub-01_task-rest_bold.nii.gz", &[3, 64, 64, 32]);

    let checked = report(&env.validator(ValidatorConfig::default()), &env.root).await;
    assert!(checked.has_code(codes::BOLD_NOT_4D));

    let skipped = report(
        &env.validator(ValidatorConfig {
            ignore_nifti_headers: true,
            ..ValidatorConfig::default()
        }),
        &env.root,
    )
    .await;
    assert!(!skipped.has_code(codes::BOLD_NOT_4D));
}

#[tokio::test]
async fn test_content_failures_are_issues() {
    let env = TestEnv::new();
    env.populate();
    env.write_file("sub-01/func/sub-01_task-rest_bold.json", "{\"TaskName\": }");
    env.write_file("sub-01/anat/sub-01_T2w.nii.gz", "not a header");

    let report = report(&env.validator(ValidatorConfig::default()), &env.root).await;
    assert!(report.has_code(codes::JSON_INVALID));
    assert!(report.has_code(codes::NIFTI_HEADER_UNREADABLE));
}

// ============================================================================
// Structural Tests
// ============================================================================

#[tokio::test]
async fn test_missing_root_is_structural() {
    let env = TestEnv::new();
    let err = env
        .validator(ValidatorConfig::default())
        .validate_dir(&env.root.join("nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, ValidatorError::RootNotFound(_)));
}

#[cfg(unix)]
#[tokio::test]
async fn test_unreadable_directory_aborts_without_report() {
    use std::os::unix::fs::PermissionsExt;

    let env = TestEnv::new();
    env.populate();
    let locked = env.root.join("sub-01/dwi");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::read_dir(&locked).is_ok() {
        // Permission bits are not enforced for this user
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let result = env
        .validator(ValidatorConfig::default())
        .validate_dir(&env.root)
        .await;
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    assert!(matches!(result, Err(ValidatorError::Traversal { .. })));
}

#[tokio::test]
async fn test_cancelled_run_yields_no_report() {
    let env = TestEnv::new();
    env.populate();

    let validator = env.validator(ValidatorConfig::default());
    validator.cancellation_token().cancel();
    let outcome = validator.validate_dir(&env.root).await.unwrap();
    assert_eq!(outcome, ValidationOutcome::Cancelled);
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlinked_subject_is_validated() {
    let env = TestEnv::new();
    env.populate();

    let elsewhere = TempDir::new().unwrap();
    fs::create_dir_all(elsewhere.path().join("dwi")).unwrap();
    fs::write(elsewhere.path().join("dwi/sub-02_dwi.bval"), "0 1000 abc").unwrap();
    std::os::unix::fs::symlink(elsewhere.path(), env.root.join("sub-02")).unwrap();

    let report = report(&env.validator(ValidatorConfig::default()), &env.root).await;
    let bad = report
        .errors()
        .iter()
        .find(|i| i.code == codes::BVAL_NON_NUMERIC)
        .expect("symlinked bval checked");
    assert_eq!(bad.file.relative_path, "/sub-02/dwi/sub-02_dwi.bval");

    let unfollowed = report_without_links(&env).await;
    assert!(!unfollowed.has_code(codes::BVAL_NON_NUMERIC));
}

#[cfg(unix)]
async fn report_without_links(env: &TestEnv) -> ValidationReport {
    let config = ValidatorConfig {
        follow_symbolic_directories: false,
        ..ValidatorConfig::default()
    };
    report(&env.validator(config), &env.root).await
}

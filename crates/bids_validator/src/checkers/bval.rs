use super::DatasetView;
use bids_protocol::{codes, Issue, IssueFile};

pub fn check(view: &DatasetView) -> anyhow::Result<Vec<Issue>> {
    let mut issues = Vec::new();
    for (path, contents) in &view.content().bvals {
        issues.extend(check_bval(view.issue_file(path), contents));
    }
    Ok(issues)
}

/// A bval file is one line of whitespace-separated numbers.
pub fn check_bval(file: IssueFile, contents: &str) -> Vec<Issue> {
    let trimmed = contents.trim();
    let mut issues = Vec::new();

    if trimmed.lines().count() > 1 {
        issues.push(Issue::new(codes::BVAL_MULTIPLE_ROWS, file.clone()));
    }

    let bad_token = if trimmed.is_empty() {
        Some("")
    } else {
        trimmed
            .split_whitespace()
            .find(|token| !token.parse::<f64>().is_ok_and(f64::is_finite))
    };
    if let Some(token) = bad_token {
        issues.push(
            Issue::new(codes::BVAL_NON_NUMERIC, file).with_evidence(None, Some(token.to_string())),
        );
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes_for(contents: &str) -> Vec<u16> {
        check_bval(IssueFile::from_relative_path("/sub-01/dwi/sub-01_dwi.bval"), contents)
            .iter()
            .map(|i| i.code)
            .collect()
    }

    #[test]
    fn single_numeric_line_is_clean() {
        assert!(codes_for("0 1000 1000 2000\n").is_empty());
        assert!(codes_for("  0\t1e3 1000.0  ").is_empty());
    }

    #[test]
    fn multiple_lines_are_flagged() {
        assert_eq!(codes_for("0 1000\n1000 2000\n"), vec![codes::BVAL_MULTIPLE_ROWS]);
    }

    #[test]
    fn non_numeric_tokens_are_flagged() {
        assert_eq!(codes_for("0 1000 abc"), vec![codes::BVAL_NON_NUMERIC]);
        assert_eq!(codes_for("0,1000,1000"), vec![codes::BVAL_NON_NUMERIC]);
        assert_eq!(codes_for("0 NaN"), vec![codes::BVAL_NON_NUMERIC]);
    }

    #[test]
    fn empty_file_is_non_numeric() {
        assert_eq!(codes_for("  \n"), vec![codes::BVAL_NON_NUMERIC]);
    }
}

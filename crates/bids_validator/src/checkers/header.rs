//! Scan header bounds and paired-acquisition consistency.

use super::DatasetView;
use crate::collaborators::NiftiHeader;
use crate::entities::FilenameMatcher;
use crate::types::{file_name_of, parent_of};
use bids_protocol::{codes, Issue, IssueFile};
use std::collections::BTreeMap;

/// Fieldmap suffixes whose images must not exceed four dimensions.
const FIELDMAP_SUFFIXES: &[&str] = &[
    "magnitude",
    "magnitude1",
    "magnitude2",
    "phase1",
    "phase2",
    "phasediff",
];

const MAX_FIELDMAP_RANK: i64 = 4;
const BOLD_RANK: i64 = 4;
const PIXDIM_TOLERANCE: f64 = 1e-6;

pub fn check(view: &DatasetView) -> anyhow::Result<Vec<Issue>> {
    let headers: Vec<(IssueFile, &NiftiHeader)> = view
        .content()
        .headers
        .iter()
        .map(|(path, header)| (view.issue_file(path), header))
        .collect();
    Ok(check_headers(&headers, view.matcher()))
}

pub fn check_headers(headers: &[(IssueFile, &NiftiHeader)], matcher: &dyn FilenameMatcher) -> Vec<Issue> {
    let mut issues = Vec::new();
    // Fieldmap files grouped by their path with the suffix removed
    let mut pairs: BTreeMap<String, Vec<(&IssueFile, &NiftiHeader)>> = BTreeMap::new();

    for (file, header) in headers {
        if header.dim.is_empty() {
            issues.push(Issue::new(codes::NIFTI_DIMENSION, file.clone()));
        }
        if header.xyzt_units.is_empty() {
            issues.push(Issue::new(codes::NIFTI_UNIT, file.clone()));
        }

        let Some(keys) = matcher.parse(file_name_of(&file.relative_path)) else {
            continue;
        };
        let suffix = keys.suffix().unwrap_or_default();

        if FIELDMAP_SUFFIXES.contains(&suffix) {
            if let Some(rank) = header.rank().filter(|r| *r > MAX_FIELDMAP_RANK) {
                issues.push(
                    Issue::new(codes::MAGNITUDE_FILE_WITH_TOO_MANY_DIMENSIONS, file.clone())
                        .with_evidence(Some("dim"), Some(rank.to_string())),
                );
            }
            let stem: Vec<String> = keys
                .entities
                .iter()
                .map(|(k, v)| format!("{}-{}", k, v))
                .collect();
            let group = format!("{}/{}", parent_of(&file.relative_path), stem.join("_"));
            pairs.entry(group).or_default().push((file, *header));
        } else if suffix == "bold" {
            if let Some(rank) = header.rank().filter(|r| *r != BOLD_RANK) {
                issues.push(
                    Issue::new(codes::BOLD_NOT_4D, file.clone())
                        .with_evidence(Some("dim"), Some(rank.to_string())),
                );
            }
        }
    }

    for members in pairs.values() {
        let Some(((_, reference), rest)) = members.split_first() else {
            continue;
        };
        for (file, header) in rest {
            if !spatial_pixdim_matches(reference, header) {
                issues.push(
                    Issue::new(codes::INCONSISTENT_PARAMETERS, (*file).clone())
                        .with_evidence(Some("pixdim"), Some(format!("{:?}", header.spatial_pixdim()))),
                );
            }
        }
    }

    issues
}

fn spatial_pixdim_matches(a: &NiftiHeader, b: &NiftiHeader) -> bool {
    a.spatial_pixdim()
        .iter()
        .zip(b.spatial_pixdim())
        .all(|(x, y)| (x - y).abs() <= PIXDIM_TOLERANCE)
}

//! External collaborators: scan-header decoding and annotation grammar checks.
//!
//! The validator never decodes binary headers or annotation grammars itself.
//! Callers plug in implementations; the defaults are inert.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parsed scan header, numeric arrays only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NiftiHeader {
    /// `dim[0]` is the rank, `dim[1..=rank]` the extents
    #[serde(default)]
    pub dim: Vec<i64>,
    #[serde(default)]
    pub pixdim: Vec<f64>,
    #[serde(default)]
    pub xyzt_units: Vec<i64>,
}

impl NiftiHeader {
    pub fn rank(&self) -> Option<i64> {
        self.dim.first().copied()
    }

    /// Number of volumes (`dim[4]`), if present.
    pub fn volumes(&self) -> Option<i64> {
        self.dim.get(4).copied()
    }

    /// Voxel sizes along x, y, z.
    pub fn spatial_pixdim(&self) -> &[f64] {
        let end = self.pixdim.len().min(4);
        self.pixdim.get(1..end).unwrap_or(&[])
    }
}

/// Decodes scan headers from files on disk.
///
/// Called from a blocking thread. `Ok(None)` means no header is available.
pub trait HeaderParser: Send + Sync + std::fmt::Debug {
    fn parse(&self, path: &Path) -> anyhow::Result<Option<NiftiHeader>>;
}

/// Parser that never yields a header.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHeaderParser;

impl HeaderParser for NoHeaderParser {
    fn parse(&self, _path: &Path) -> anyhow::Result<Option<NiftiHeader>> {
        Ok(None)
    }
}

/// Outcome of checking one annotation string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationVerdict {
    pub valid: bool,
    pub diagnostics: Vec<String>,
}

impl AnnotationVerdict {
    pub fn valid() -> Self {
        Self {
            valid: true,
            diagnostics: Vec::new(),
        }
    }

    pub fn invalid(diagnostic: impl Into<String>) -> Self {
        Self {
            valid: false,
            diagnostics: vec![diagnostic.into()],
        }
    }
}

/// Grammar checker for event annotation strings.
pub trait AnnotationValidator: Send + Sync + std::fmt::Debug {
    fn validate(&self, annotation: &str) -> AnnotationVerdict;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllAnnotations;

impl AnnotationValidator for AcceptAllAnnotations {
    fn validate(&self, _annotation: &str) -> AnnotationVerdict {
        AnnotationVerdict::valid()
    }
}

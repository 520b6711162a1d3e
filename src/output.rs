//! Results returned by the sorting entry points.

use crate::error::GroupError;
use crate::model::{DocumentGroup, OutputArtifact, PageInfo};
use crate::route::FolderTree;
use serde::{Deserialize, Serialize};

/// Aggregate outcome of writing every group of one source document.
///
/// Partial success is the normal terminal state: `failed > 0` does not make
/// the run an error. Every attempted group has one entry in `details`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteReport {
    pub success: usize,
    pub failed: usize,
    /// One human-readable line per attempted group (plus manifest problems).
    pub details: Vec<String>,
    pub errors: Vec<GroupError>,
    /// Artifacts present in the output set after overwrite resolution.
    pub artifacts: Vec<OutputArtifact>,
    pub manifest_written: bool,
}

impl WriteReport {
    pub(crate) fn record_success(&mut self, detail: String) {
        self.success += 1;
        self.details.push(detail);
    }

    pub(crate) fn record_failure(&mut self, error: GroupError) {
        self.failed += 1;
        self.details.push(format!("FAILED {error}"));
        self.errors.push(error);
    }
}

/// Timing and size statistics for one sorted document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SortStats {
    pub total_pages: usize,
    pub total_groups: usize,
    pub classifier_calls: usize,
    pub render_duration_ms: u64,
    pub classify_duration_ms: u64,
    pub write_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything produced by sorting one source PDF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortOutput {
    pub source_file_name: String,
    /// Smoothed page classifications.
    pub pages: Vec<PageInfo>,
    pub groups: Vec<DocumentGroup>,
    pub report: WriteReport,
    pub stats: SortStats,
}

/// Dry-run result: what a successful write would produce.
#[derive(Debug, Clone, Serialize)]
pub struct SortPreview {
    pub source_file_name: String,
    pub pages: Vec<PageInfo>,
    pub groups: Vec<DocumentGroup>,
    pub artifacts: Vec<OutputArtifact>,
    pub tree: FolderTree,
}

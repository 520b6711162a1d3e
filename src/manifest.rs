//! Run manifest: the JSON record of everything written for one source PDF.
//!
//! The manifest is staged at `{manifest_folder}/{source}.json` in the
//! destination tree once per run. Its field names are a wire contract with
//! downstream sync tools and must not change. [`replay`] is the in-crate
//! consumer: it copies every listed file from one tree into another.

use crate::error::{GroupError, SortError};
use crate::model::{OutputArtifact, PageInfo};
use crate::output::WriteReport;
use crate::pipeline::plan::source_base_name;
use crate::storage::DestinationStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub original_file_name: String,
    pub generated_at: DateTime<Utc>,
    pub documents: Vec<ManifestDocument>,
    pub logs: Vec<ManifestLog>,
    pub analysis: ManifestAnalysis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDocument {
    pub id: String,
    pub filename: String,
    pub code: String,
    pub service_code: Option<String>,
    pub start_page: usize,
    pub end_page: usize,
    pub page_count: usize,
    /// Folder segments joined with `/`.
    pub recommended_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestLog {
    pub filename: String,
    pub page: usize,
    pub recommended_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestAnalysis {
    pub pages: Vec<PageInfo>,
}

/// Split a `recommendedPath` back into folder segments.
pub fn path_segments(recommended_path: &str) -> Vec<String> {
    recommended_path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Manifest file name for a source PDF.
pub fn manifest_file_name(source_file_name: &str) -> String {
    format!("{}.json", source_base_name(source_file_name))
}

impl Manifest {
    /// Build from the artifacts that ended up in the output set.
    pub fn from_artifacts(
        source_file_name: &str,
        artifacts: &[OutputArtifact],
        pages: &[PageInfo],
    ) -> Self {
        let mut documents = Vec::new();
        let mut logs = Vec::new();
        for artifact in artifacts {
            let recommended_path = artifact.destination_path.join("/");
            if artifact.is_log {
                logs.push(ManifestLog {
                    filename: artifact.filename.clone(),
                    page: artifact.page_range.0,
                    recommended_path,
                });
            } else {
                documents.push(ManifestDocument {
                    id: Uuid::new_v4().to_string(),
                    filename: artifact.filename.clone(),
                    code: artifact.code.clone(),
                    service_code: artifact.service_type.map(|s| s.as_str().to_string()),
                    start_page: artifact.page_range.0,
                    end_page: artifact.page_range.1,
                    page_count: artifact.page_count(),
                    recommended_path,
                });
            }
        }

        Self {
            original_file_name: source_file_name.to_string(),
            generated_at: Utc::now(),
            documents,
            logs,
            analysis: ManifestAnalysis {
                pages: pages.to_vec(),
            },
        }
    }

    /// Stage the manifest in the destination tree. Returns the file name.
    pub async fn write(
        &self,
        store: &dyn DestinationStore,
        manifest_folder: &str,
    ) -> Result<String, SortError> {
        let name = manifest_file_name(&self.original_file_name);
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| SortError::Internal(format!("manifest serialisation: {e}")))?;
        store
            .write_file(&[manifest_folder.to_string()], &name, &json)
            .await?;
        Ok(name)
    }

    /// Read a staged manifest by its file name.
    pub async fn load(
        store: &dyn DestinationStore,
        manifest_folder: &str,
        name: &str,
    ) -> Result<Self, SortError> {
        let bytes = store
            .read_file(&[manifest_folder.to_string()], name)
            .await?;
        serde_json::from_slice(&bytes).map_err(|e| SortError::ManifestParse {
            name: name.to_string(),
            detail: e.to_string(),
        })
    }
}

/// Names of every staged manifest.
pub async fn list_manifests(
    store: &dyn DestinationStore,
    manifest_folder: &str,
) -> Result<Vec<String>, SortError> {
    let names = store.list_files(&[manifest_folder.to_string()]).await?;
    Ok(names.into_iter().filter(|n| n.ends_with(".json")).collect())
}

/// Copy every file listed in the manifest of `source_file_name` from
/// `source` into the same folders of `destination`, then stage the manifest
/// there too.
///
/// A missing or unparseable manifest, or an unwritable destination, is
/// fatal; a file that cannot be copied is recorded and skipped.
pub async fn replay(
    source: &dyn DestinationStore,
    destination: &dyn DestinationStore,
    manifest_folder: &str,
    source_file_name: &str,
) -> Result<WriteReport, SortError> {
    let name = manifest_file_name(source_file_name);
    let manifest = Manifest::load(source, manifest_folder, &name).await?;
    destination.check_writable().await?;
    info!(
        "Replaying {} ({} documents, {} logs) into {}",
        name,
        manifest.documents.len(),
        manifest.logs.len(),
        destination.describe()
    );

    let entries = manifest
        .documents
        .iter()
        .map(|d| (d.code.as_str(), d.filename.as_str(), d.recommended_path.as_str()))
        .chain(
            manifest
                .logs
                .iter()
                .map(|l| ("LOG", l.filename.as_str(), l.recommended_path.as_str())),
        );

    let mut report = WriteReport::default();
    for (code, filename, recommended_path) in entries {
        let path = path_segments(recommended_path);
        let copied = match source.read_file(&path, filename).await {
            Ok(bytes) => destination.write_file(&path, filename, &bytes).await,
            Err(e) => Err(e),
        };
        match copied {
            Ok(()) => report.record_success(format!("{code}: copied {recommended_path}/{filename}")),
            Err(e) if e.is_directory_permission() => return Err(e),
            Err(e) => {
                warn!("Replay of {}/{} failed: {}", recommended_path, filename, e);
                report.record_failure(GroupError::WriteFailed {
                    code: code.to_string(),
                    path: format!("{recommended_path}/{filename}"),
                    detail: e.to_string(),
                });
            }
        }
    }

    match manifest.write(destination, manifest_folder).await {
        Ok(_) => report.manifest_written = true,
        Err(e) if e.is_directory_permission() => return Err(e),
        Err(e) => {
            warn!("Replayed manifest not staged: {}", e);
            report.details.push(format!("manifest not staged: {e}"));
        }
    }

    Ok(report)
}

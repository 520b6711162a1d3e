//! Document writing: copy each group's pages into a sub-PDF, file it under
//! its routed folder and stage the run manifest.
//!
//! Groups are planned and written one at a time in page order; the overwrite
//! policy in [`crate::pipeline::plan`] depends on that order. A group that
//! cannot be copied or written is recorded and skipped, and its file name is
//! released for the groups after it. Only an unwritable destination
//! ([`SortError::DirectoryPermission`]) aborts the run.

use crate::config::SortConfig;
use crate::error::{GroupError, SortError};
use crate::manifest::{manifest_file_name, Manifest};
use crate::model::{DocumentGroup, OutputArtifact, PageInfo};
use crate::output::WriteReport;
use crate::pipeline::plan::{surviving_artifacts, ExistingFiles, Planner};
use crate::pipeline::render::{self, PdfBackend};
use crate::route::route_group;
use crate::storage::DestinationStore;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Files already present in every folder the groups route to.
///
/// Folders that cannot be listed are treated as empty; permission problems
/// are fatal.
pub async fn existing_files(
    store: &dyn DestinationStore,
    groups: &[DocumentGroup],
) -> Result<ExistingFiles, SortError> {
    let mut existing = ExistingFiles::new();
    for group in groups {
        let folder = route_group(group);
        if existing.contains_key(&folder) {
            continue;
        }
        let names = match store.list_files(&folder).await {
            Ok(names) => names,
            Err(e) if e.is_directory_permission() => return Err(e),
            Err(e) => {
                warn!("Could not list '{}': {}", folder.join("/"), e);
                Vec::new()
            }
        };
        existing.insert(folder, names.into_iter().collect::<HashSet<_>>());
    }
    Ok(existing)
}

/// Write every group of one source PDF, then stage the manifest.
///
/// `pages` are the smoothed classifications recorded in the manifest.
pub async fn write_groups(
    groups: &[DocumentGroup],
    pages: &[PageInfo],
    source_file_name: &str,
    pdf: &Path,
    backend: &Arc<dyn PdfBackend>,
    store: &dyn DestinationStore,
    config: &SortConfig,
) -> Result<WriteReport, SortError> {
    store.check_writable().await?;

    let existing = existing_files(store, groups).await?;
    let mut planner = Planner::new(source_file_name, &existing);
    let total = groups.len();
    let mut report = WriteReport::default();
    let mut written: Vec<OutputArtifact> = Vec::with_capacity(total);

    for (n, group) in groups.iter().enumerate() {
        let index = n + 1;
        let planned = planner.plan(n, group);
        let artifact = &planned.artifact;
        let (start, end) = artifact.page_range;
        debug!(
            "Group {}/{}: {} pages {}-{} → {}",
            index,
            total,
            artifact.code,
            start,
            end,
            artifact.display_path()
        );

        let outcome = match render::extract_pages(
            backend,
            pdf,
            config.password.as_deref(),
            start,
            end,
        )
        .await
        {
            Err(e) => Err(GroupError::PageCopyFailed {
                code: artifact.code.clone(),
                start_page: start,
                end_page: end,
                detail: e.to_string(),
            }),
            Ok(bytes) => match store
                .write_file(&artifact.destination_path, &artifact.filename, &bytes)
                .await
            {
                Ok(()) => Ok(()),
                Err(e) if e.is_directory_permission() => return Err(e),
                Err(e) => Err(GroupError::WriteFailed {
                    code: artifact.code.clone(),
                    path: artifact.display_path(),
                    detail: e.to_string(),
                }),
            },
        };

        match outcome {
            Ok(()) => {
                let mut detail = format!(
                    "{} (pages {}-{}) → {}",
                    artifact.code,
                    start,
                    end,
                    artifact.display_path()
                );
                if planned.supersedes.is_some() {
                    detail.push_str(" (replaced earlier group)");
                }
                report.record_success(detail);
                written.push(artifact.clone());
                if let Some(ref cb) = config.progress_callback {
                    cb.on_group_written(index, total, &artifact.display_path());
                }
            }
            Err(e) => {
                warn!("Group {}/{} failed: {}", index, total, e);
                planner.release(&planned);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_group_error(index, total, &e.to_string());
                }
                report.record_failure(e);
            }
        }
    }

    report.artifacts = surviving_artifacts(&written);
    stage_manifest(&mut report, pages, source_file_name, store, config).await?;

    info!(
        "Wrote {} of {} groups for {} ({} failed)",
        report.success, total, source_file_name, report.failed
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_sort_complete(report.success, report.failed);
    }
    Ok(report)
}

/// Best-effort: a manifest failure is recorded but never fails the run,
/// except for a permission problem on the destination.
async fn stage_manifest(
    report: &mut WriteReport,
    pages: &[PageInfo],
    source_file_name: &str,
    store: &dyn DestinationStore,
    config: &SortConfig,
) -> Result<(), SortError> {
    let manifest = Manifest::from_artifacts(source_file_name, &report.artifacts, pages);
    match manifest.write(store, &config.manifest_folder).await {
        Ok(name) => {
            debug!("Staged manifest {}/{}", config.manifest_folder, name);
            report.manifest_written = true;
        }
        Err(e) if e.is_directory_permission() => return Err(e),
        Err(e) => {
            let error = GroupError::ManifestWriteFailed {
                name: manifest_file_name(source_file_name),
                detail: e.to_string(),
            };
            warn!("{}", error);
            report.details.push(format!("FAILED {error}"));
            report.errors.push(error);
        }
    }
    Ok(())
}

//! End-to-end entry points: sort a scanned bundle into the filing tree, or
//! preview what sorting would produce.
//!
//! Both paths run the same analysis (classify → smooth → group) and the same
//! planner, so a preview always matches a successful write.

use crate::config::SortConfig;
use crate::error::SortError;
use crate::model::{DocumentGroup, PageInfo};
use crate::output::{SortOutput, SortPreview, SortStats};
use crate::pipeline::classify::{classify_document, PageClassifier, RateGate, VisionClassifier};
use crate::pipeline::group::group_pages;
use crate::pipeline::plan::{plan_outputs, surviving_artifacts};
use crate::pipeline::render::{self, PdfBackend, PdfiumBackend};
use crate::pipeline::smooth::smooth_subtypes;
use crate::pipeline::write::{existing_files, write_groups};
use crate::pipeline::input;
use crate::route::FolderTree;
use crate::storage::{DestinationStore, LocalStore};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Smooth raw classifications and split them into groups.
///
/// The single implementation of the smoothing pass; every consumer goes
/// through here.
pub fn analyse_pages(mut pages: Vec<PageInfo>) -> (Vec<PageInfo>, Vec<DocumentGroup>) {
    let changed = smooth_subtypes(&mut pages);
    debug!("Smoothing changed {} of {} pages", changed, pages.len());
    let groups = group_pages(&pages);
    (pages, groups)
}

/// Everything needed to sort documents: the classifier, the PDF engine, the
/// destination tree and the shared classifier rate gate.
pub struct SortContext {
    config: SortConfig,
    classifier: Arc<dyn PageClassifier>,
    backend: Arc<dyn PdfBackend>,
    store: Arc<dyn DestinationStore>,
    gate: Arc<RateGate>,
}

struct Analysis {
    source_file_name: String,
    pages: Vec<PageInfo>,
    groups: Vec<DocumentGroup>,
    stats: SortStats,
}

impl SortContext {
    pub fn new(
        config: SortConfig,
        classifier: Arc<dyn PageClassifier>,
        backend: Arc<dyn PdfBackend>,
        store: Arc<dyn DestinationStore>,
    ) -> Self {
        Self {
            config,
            classifier,
            backend,
            store,
            gate: Arc::new(RateGate::unlimited()),
        }
    }

    /// Production wiring: vision classifier from the resolved LLM provider,
    /// pdfium, and a [`LocalStore`] at `config.output_dir`.
    pub async fn from_config(config: SortConfig) -> Result<Self, SortError> {
        let provider = resolve_provider(&config).await?;
        let classifier = Arc::new(VisionClassifier::new(provider, &config));
        let store = Arc::new(LocalStore::new(config.output_dir.clone()));
        Ok(Self::new(
            config,
            classifier,
            Arc::new(PdfiumBackend::new()),
            store,
        ))
    }

    /// Share a rate gate with other contexts (or a scheduler).
    pub fn with_rate_gate(mut self, gate: Arc<RateGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_rate_limit(self, interval: Duration) -> Self {
        self.with_rate_gate(Arc::new(RateGate::new(interval)))
    }

    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn DestinationStore> {
        &self.store
    }

    pub fn rate_gate(&self) -> &Arc<RateGate> {
        &self.gate
    }

    /// Classify, group and write one source PDF.
    ///
    /// Returns `Ok` even when some groups failed; check `report.failed`.
    ///
    /// # Errors
    /// Fatal only: unreadable input, classifier failure, unwritable destination.
    pub async fn sort(&self, input_str: &str) -> Result<SortOutput, SortError> {
        let total_start = Instant::now();
        info!("Sorting {}", input_str);
        let resolved = input::resolve_input(input_str, self.config.download_timeout_secs).await?;
        let pdf = resolved.path();

        let Analysis {
            source_file_name,
            pages,
            groups,
            mut stats,
        } = self.analyse(pdf, resolved.file_name()).await?;

        let write_start = Instant::now();
        let report = write_groups(
            &groups,
            &pages,
            &source_file_name,
            pdf,
            &self.backend,
            self.store.as_ref(),
            &self.config,
        )
        .await?;
        stats.write_duration_ms = write_start.elapsed().as_millis() as u64;
        stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

        info!(
            "Sorted {}: {} groups, {} written, {} failed, {}ms",
            source_file_name,
            groups.len(),
            report.success,
            report.failed,
            stats.total_duration_ms
        );

        Ok(SortOutput {
            source_file_name,
            pages,
            groups,
            report,
            stats,
        })
    }

    /// Everything [`Self::sort`] would write, without writing it.
    pub async fn preview(&self, input_str: &str) -> Result<SortPreview, SortError> {
        let resolved = input::resolve_input(input_str, self.config.download_timeout_secs).await?;
        let analysis = self.analyse(resolved.path(), resolved.file_name()).await?;

        let existing = existing_files(self.store.as_ref(), &analysis.groups).await?;
        let plan = plan_outputs(&analysis.groups, &analysis.source_file_name, &existing);
        let artifacts = surviving_artifacts(plan.iter().map(|p| &p.artifact));
        let tree = FolderTree::from_artifacts(&artifacts);

        Ok(SortPreview {
            source_file_name: analysis.source_file_name,
            pages: analysis.pages,
            groups: analysis.groups,
            artifacts,
            tree,
        })
    }

    /// Page count of a PDF. Needs no classifier call.
    pub async fn inspect(&self, input_str: &str) -> Result<usize, SortError> {
        let resolved = input::resolve_input(input_str, self.config.download_timeout_secs).await?;
        render::page_count(&self.backend, resolved.path(), self.config.password.as_deref()).await
    }

    async fn analyse(&self, pdf: &Path, source_file_name: String) -> Result<Analysis, SortError> {
        let total_pages =
            render::page_count(&self.backend, pdf, self.config.password.as_deref()).await?;
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_sort_start(total_pages);
        }

        let classification = classify_document(
            self.classifier.as_ref(),
            &self.backend,
            &self.gate,
            pdf,
            total_pages,
            &self.config,
        )
        .await?;

        let (pages, groups) = analyse_pages(classification.pages);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_grouped(total_pages, groups.len());
        }

        let stats = SortStats {
            total_pages,
            total_groups: groups.len(),
            classifier_calls: classification.calls,
            render_duration_ms: classification.render_duration_ms,
            classify_duration_ms: classification.classify_duration_ms,
            ..Default::default()
        };
        Ok(Analysis {
            source_file_name,
            pages,
            groups,
            stats,
        })
    }
}

/// Sort one PDF file or URL with production wiring built from `config`.
pub async fn sort(input_str: impl AsRef<str>, config: &SortConfig) -> Result<SortOutput, SortError> {
    SortContext::from_config(config.clone())
        .await?
        .sort(input_str.as_ref())
        .await
}

/// Dry-run counterpart of [`sort`].
pub async fn preview(
    input_str: impl AsRef<str>,
    config: &SortConfig,
) -> Result<SortPreview, SortError> {
    SortContext::from_config(config.clone())
        .await?
        .preview(input_str.as_ref())
        .await
}

/// Page count of a PDF via pdfium. Needs no API key.
pub async fn inspect(input_str: impl AsRef<str>, password: Option<&str>) -> Result<usize, SortError> {
    let resolved = input::resolve_input(input_str.as_ref(), 120).await?;
    let backend: Arc<dyn PdfBackend> = Arc::new(PdfiumBackend::new());
    render::page_count(&backend, resolved.path(), password).await
}

// ── Provider resolution ──────────────────────────────────────────────────

const DEFAULT_MODEL: &str = "gpt-4.1-nano";

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, SortError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        SortError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, most specific first:
///
/// 1. `config.provider`, used as-is
/// 2. `config.provider_name` (+ `config.model`)
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set
/// 4. OpenAI when `OPENAI_API_KEY` is set
/// 5. `ProviderFactory::from_env` auto-detection
pub async fn resolve_provider(config: &SortConfig) -> Result<Arc<dyn LLMProvider>, SortError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider("openai", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| SortError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PageType, SubType};

    #[test]
    fn analyse_pages_smooths_before_grouping() {
        let pages = vec![
            PageInfo::new(1).with_form_code("QT.MSI-BM.01").form_header(),
            PageInfo::new(2)
                .with_form_code("QT.MSI-BM.02")
                .form_header()
                .with_sub_type(SubType::Nav),
            PageInfo::new(3).with_page_type(PageType::Log),
        ];
        let (pages, groups) = analyse_pages(pages);
        assert_eq!(pages[0].sub_type, Some(SubType::Nav));
        assert_eq!(pages[2].sub_type, Some(SubType::Nav));
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].sub_type, Some(SubType::Nav));
    }

    #[test]
    fn analyse_pages_is_stable() {
        let pages = vec![
            PageInfo::new(1).form_header(),
            PageInfo::new(2).source_header().with_sub_type(SubType::Met),
        ];
        let (once, groups_once) = analyse_pages(pages);
        let (twice, groups_twice) = analyse_pages(once.clone());
        assert_eq!(once, twice);
        assert_eq!(groups_once, groups_twice);
    }
}

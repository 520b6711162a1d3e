//! Page classification: render pages in batches, ask the classifier about
//! each batch, and normalise its best-effort answers into [`PageInfo`].
//!
//! The classifier is an untrusted oracle behind the [`PageClassifier`] trait.
//! [`VisionClassifier`] drives a vision LLM; tests inject a deterministic
//! stub. A document is classified entirely or not at all: any batch that
//! still fails after retries, or any page left without a record, aborts the
//! document with [`SortError::Classifier`].
//!
//! ## Retry Strategy
//!
//! Each call first passes the shared [`RateGate`], then is retried with
//! exponential backoff (`retry_backoff_ms * 2^attempt`). Unparseable output
//! counts as a failed attempt because a second sample usually parses.

use crate::config::SortConfig;
use crate::error::SortError;
use crate::model::{normalise_label, PageInfo, PageType, ServiceType, SubType};
use crate::pipeline::encode::encode_page;
use crate::pipeline::render::{self, PdfBackend, RasterSize};
use crate::prompts::{batch_instruction, DEFAULT_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant as StdInstant;
use tokio::sync::Mutex;
use tokio::time::{sleep, sleep_until, timeout, Duration, Instant};
use tracing::{debug, info, warn};

// ── Boundary types ───────────────────────────────────────────────────────

/// One rendered page handed to the classifier.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 1-based page number.
    pub page: usize,
    pub image: DynamicImage,
}

/// Raw per-page record as returned by the classifier. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedPage {
    pub page: Option<usize>,
    pub form_code: Option<String>,
    pub is_form_header: Option<bool>,
    pub page_type: Option<String>,
    pub service_type: Option<String>,
    pub sub_type: Option<String>,
    pub broadcast_code_hint: Option<String>,
    pub service_hint: Option<String>,
}

impl ClassifiedPage {
    /// Lenient extraction from one JSON object: numbers may arrive as
    /// strings, booleans as `"true"`, and blank strings mean absent.
    pub fn from_json(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let text = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
                .map(str::to_string)
        };
        let page = obj.get("page").and_then(|v| match v {
            Value::Number(n) => n.as_u64().map(|n| n as usize),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });
        let is_form_header = obj.get("isFormHeader").and_then(|v| match v {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });

        Some(Self {
            page,
            form_code: text("formCode"),
            is_form_header,
            page_type: text("pageType"),
            service_type: text("serviceType"),
            sub_type: text("subType"),
            broadcast_code_hint: text("broadcastCodeHint"),
            service_hint: text("serviceHint"),
        })
    }
}

/// Anything that can label a batch of page images.
#[async_trait]
pub trait PageClassifier: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str {
        "classifier"
    }

    /// Classify `batch` (pages in ascending order). Records may come back in
    /// any order and with any field missing.
    async fn classify(&self, batch: &[PageImage]) -> Result<Vec<ClassifiedPage>, SortError>;
}

// ── Vision LLM classifier ────────────────────────────────────────────────

/// [`PageClassifier`] backed by an `edgequake_llm` vision provider.
pub struct VisionClassifier {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    options: CompletionOptions,
}

impl VisionClassifier {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &SortConfig) -> Self {
        Self {
            provider,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            options: build_options(config),
        }
    }
}

fn build_options(config: &SortConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

#[async_trait]
impl PageClassifier for VisionClassifier {
    fn name(&self) -> &str {
        "vision"
    }

    async fn classify(&self, batch: &[PageImage]) -> Result<Vec<ClassifiedPage>, SortError> {
        let images = batch
            .iter()
            .map(|p| encode_page(p.page, &p.image))
            .collect::<Result<Vec<_>, _>>()?;
        let numbers: Vec<usize> = batch.iter().map(|p| p.page).collect();

        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user_with_images(batch_instruction(&numbers), images),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| SortError::Classifier {
                detail: format!("provider call failed: {e}"),
            })?;
        debug!(
            "Classified {} pages: {} input tokens, {} output tokens",
            batch.len(),
            response.prompt_tokens,
            response.completion_tokens
        );

        parse_response(&response.content)
    }
}

static RE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)\s*```").unwrap());

/// Parse classifier text into records. Accepts a bare array, a fenced
/// array, a `{"pages": [...]}` wrapper, or a single object.
pub fn parse_response(text: &str) -> Result<Vec<ClassifiedPage>, SortError> {
    let body = RE_FENCE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text);
    let start = body.find(['[', '{']).ok_or_else(|| SortError::Classifier {
        detail: format!("no JSON in classifier output: {}", preview(text)),
    })?;

    let value: Value = serde_json::from_str(body[start..].trim()).map_err(|e| {
        SortError::Classifier {
            detail: format!("unparseable classifier output ({e}): {}", preview(text)),
        }
    })?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("pages") {
            Some(Value::Array(items)) => items,
            _ => vec![Value::Object(obj)],
        },
        _ => Vec::new(),
    };
    Ok(items.iter().filter_map(ClassifiedPage::from_json).collect())
}

fn preview(text: &str) -> String {
    text.chars().take(120).collect()
}

// ── Normalisation ────────────────────────────────────────────────────────

/// Turn raw records into one [`PageInfo`] per expected page.
///
/// Records are matched by `page`; a record without a page number is matched
/// by position. Any expected page left without a record is fatal.
pub fn normalize_records(
    records: &[ClassifiedPage],
    expected_pages: &[usize],
) -> Result<Vec<PageInfo>, SortError> {
    expected_pages
        .iter()
        .enumerate()
        .map(|(pos, &page)| {
            records
                .iter()
                .find(|r| r.page == Some(page))
                .or_else(|| records.get(pos).filter(|r| r.page.is_none()))
                .map(|r| normalize_record(page, r))
                .ok_or_else(|| SortError::Classifier {
                    detail: format!("no classification returned for page {page}"),
                })
        })
        .collect()
}

fn normalize_record(page: usize, record: &ClassifiedPage) -> PageInfo {
    let marker = record.page_type.as_deref().map(normalise_label);
    let marker = marker.as_deref();
    let page_type = record.page_type.as_deref().and_then(PageType::from_label);
    let sub_type = record
        .sub_type
        .as_deref()
        .and_then(SubType::from_label)
        .or_else(|| record.broadcast_code_hint.as_deref().and_then(SubType::from_label));

    PageInfo {
        page,
        form_code: record.form_code.clone(),
        is_form_header: record.is_form_header.unwrap_or(false) || marker == Some("FORM_HEADER"),
        page_type,
        service_type: record
            .service_type
            .as_deref()
            .and_then(ServiceType::from_label)
            .or_else(|| record.service_hint.as_deref().and_then(ServiceType::from_label)),
        sub_type,
        detected_sub_type: sub_type,
        is_source_message_header: marker == Some("SOURCE_HEADER"),
        is_log_page: page_type == Some(PageType::Log),
    }
}

// ── Rate gate ────────────────────────────────────────────────────────────

/// Minimum interval between the *starts* of two classifier calls.
///
/// One gate is shared by every document a scheduler processes, so the limit
/// holds across the whole queue.
#[derive(Debug)]
pub struct RateGate {
    interval: Duration,
    last_start: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_start: Mutex::new(None),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until a call may start, then record the start.
    pub async fn wait(&self) {
        let mut last = self.last_start.lock().await;
        if let Some(prev) = *last {
            let ready = prev + self.interval;
            if ready > Instant::now() {
                debug!("Rate gate: waiting {:?}", ready - Instant::now());
                sleep_until(ready).await;
            }
        }
        *last = Some(Instant::now());
    }
}

// ── Driver ───────────────────────────────────────────────────────────────

/// Result of classifying every page of one document.
#[derive(Debug, Clone)]
pub struct Classification {
    /// Raw (unsmoothed) pages, in page order.
    pub pages: Vec<PageInfo>,
    pub calls: usize,
    pub render_duration_ms: u64,
    pub classify_duration_ms: u64,
}

/// Classify pages `1..=total_pages` of `pdf`.
pub async fn classify_document(
    classifier: &dyn PageClassifier,
    backend: &Arc<dyn PdfBackend>,
    gate: &RateGate,
    pdf: &Path,
    total_pages: usize,
    config: &SortConfig,
) -> Result<Classification, SortError> {
    let batch_size = config.pages_per_request.max(1);
    let numbers: Vec<usize> = (1..=total_pages).collect();
    let mut out = Classification {
        pages: Vec::with_capacity(total_pages),
        calls: 0,
        render_duration_ms: 0,
        classify_duration_ms: 0,
    };

    for chunk in numbers.chunks(batch_size) {
        let render_start = StdInstant::now();
        let rendered = render::render_pages(
            backend,
            pdf,
            config.password.as_deref(),
            RasterSize::from_config(config),
            chunk,
        )
        .await?;
        out.render_duration_ms += render_start.elapsed().as_millis() as u64;

        if let Some(&missing) = chunk.iter().find(|n| !rendered.iter().any(|(p, _)| p == *n)) {
            return Err(SortError::RasterisationFailed {
                page: missing,
                detail: "page was not rendered".into(),
            });
        }
        let batch: Vec<PageImage> = rendered
            .into_iter()
            .map(|(page, image)| PageImage { page, image })
            .collect();

        let classify_start = StdInstant::now();
        let (records, attempts) = classify_with_retry(classifier, gate, &batch, config).await?;
        out.classify_duration_ms += classify_start.elapsed().as_millis() as u64;
        out.calls += attempts;

        out.pages.extend(normalize_records(&records, chunk)?);
    }

    info!(
        "Classified {} pages with {} in {} calls",
        total_pages,
        classifier.name(),
        out.calls
    );
    Ok(out)
}

/// Delay before retry `attempt` (1-based): `base * 2^(attempt-1)`, saturating.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    2u64.checked_pow(attempt.saturating_sub(1))
        .map_or(u64::MAX, |factor| base.saturating_mul(factor))
}

async fn classify_with_retry(
    classifier: &dyn PageClassifier,
    gate: &RateGate,
    batch: &[PageImage],
    config: &SortConfig,
) -> Result<(Vec<ClassifiedPage>, usize), SortError> {
    let first = batch.first().map(|p| p.page).unwrap_or(0);
    let last = batch.last().map(|p| p.page).unwrap_or(0);
    let call_timeout = Duration::from_secs(config.api_timeout_secs.max(1));
    let mut last_err = String::new();

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "Pages {}-{}: retry {}/{} after {}ms",
                first, last, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        gate.wait().await;
        let result = match timeout(call_timeout, classifier.classify(batch)).await {
            Ok(result) => result,
            Err(_) => Err(SortError::Classifier {
                detail: format!("timed out after {}s", call_timeout.as_secs()),
            }),
        };

        match result {
            Ok(records) => return Ok((records, attempt as usize + 1)),
            Err(e) => {
                warn!("Pages {}-{}: attempt {} failed: {}", first, last, attempt + 1, e);
                last_err = e.to_string();
            }
        }
    }

    Err(SortError::Classifier {
        detail: format!(
            "pages {first}-{last} failed after {} attempts: {last_err}",
            config.max_retries + 1
        ),
    })
}

//! Configuration types for sorting a scanned bundle.
//!
//! Per-document behaviour is controlled through [`SortConfig`], built via its
//! [`SortConfigBuilder`]. Queue behaviour (retries between whole-document
//! attempts, the global classifier rate limit) lives in [`SchedulerConfig`].

use crate::error::SortError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for sorting one source PDF.
///
/// # Example
/// ```rust
/// use edgequake_pdfsort::SortConfig;
///
/// let config = SortConfig::builder()
///     .dpi(120)
///     .pages_per_request(6)
///     .output_dir("/srv/filing")
///     .build()
///     .unwrap();
/// assert_eq!(config.pages_per_request, 6);
/// ```
#[derive(Clone)]
pub struct SortConfig {
    /// Rendering DPI for the classifier images. Range: 72–400. Default: 150.
    ///
    /// A page is rendered at `points × dpi / 72` pixels, then scaled down to
    /// fit `max_rendered_pixels`.
    pub dpi: u32,

    /// Upper bound on the longest edge of a rendered page in pixels. Default: 1600.
    ///
    /// Classification only needs the header block and form code to be
    /// legible, so the cap is lower than a full transcription would need.
    pub max_rendered_pixels: u32,

    /// Page images sent per classifier call. Default: 8.
    pub pages_per_request: usize,

    /// LLM model identifier. If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens the classifier may generate per call. Default: 4096.
    pub max_tokens: usize,

    /// Retries per classifier call. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Custom classification prompt. If None, uses the built-in one.
    pub system_prompt: Option<String>,

    /// Root of the filing tree. Default: `./sorted`.
    pub output_dir: PathBuf,

    /// Folder (relative to the root) holding staged manifests. Default: `_MANIFESTS`.
    pub manifest_folder: String,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-classifier-call timeout in seconds. Default: 90.
    pub api_timeout_secs: u64,

    /// Receives per-group events during the write stage.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_rendered_pixels: 1600,
            pages_per_request: 8,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            password: None,
            system_prompt: None,
            output_dir: PathBuf::from("./sorted"),
            manifest_folder: "_MANIFESTS".to_string(),
            download_timeout_secs: 120,
            api_timeout_secs: 90,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for SortConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("pages_per_request", &self.pages_per_request)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("output_dir", &self.output_dir)
            .field("manifest_folder", &self.manifest_folder)
            .finish()
    }
}

impl SortConfig {
    /// Create a new builder for `SortConfig`.
    pub fn builder() -> SortConfigBuilder {
        SortConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`SortConfig`].
pub struct SortConfigBuilder {
    config: SortConfig,
}

impl SortConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn pages_per_request(mut self, n: usize) -> Self {
        self.config.pages_per_request = n;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn manifest_folder(mut self, folder: impl Into<String>) -> Self {
        self.config.manifest_folder = folder.into();
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<SortConfig, SortError> {
        let c = &self.config;
        if c.pages_per_request == 0 {
            return Err(SortError::InvalidConfig(
                "pages per request must be ≥ 1".into(),
            ));
        }
        if c.manifest_folder.trim().is_empty() || c.manifest_folder.contains(['/', '\\']) {
            return Err(SortError::InvalidConfig(format!(
                "manifest folder must be a single folder name, got '{}'",
                c.manifest_folder
            )));
        }
        Ok(self.config)
    }
}

/// Queue behaviour for [`crate::scheduler::JobScheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Jobs processed at once. Only `1` is accepted: collision and overwrite
    /// order depends on a single writer.
    pub max_concurrency: usize,

    /// Minimum gap between the start of two classifier calls, across the
    /// whole queue. Default: 4000.
    pub rate_limit_interval_ms: u64,

    /// Attempts per job before it is marked failed. Default: 3.
    pub max_attempts: u32,

    /// Fixed pause between attempts. Default: 5000.
    pub retry_delay_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 1,
            rate_limit_interval_ms: 4000,
            max_attempts: 3,
            retry_delay_ms: 5000,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), SortError> {
        if self.max_concurrency != 1 {
            return Err(SortError::InvalidConfig(format!(
                "scheduler concurrency must be 1, got {}",
                self.max_concurrency
            )));
        }
        if self.max_attempts == 0 {
            return Err(SortError::InvalidConfig(
                "max attempts must be ≥ 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_clamps_dpi() {
        let c = SortConfig::builder().dpi(20).build().unwrap();
        assert_eq!(c.dpi, 72);
    }

    #[test]
    fn zero_batch_is_rejected() {
        let err = SortConfig::builder().pages_per_request(0).build().unwrap_err();
        assert!(matches!(err, SortError::InvalidConfig(_)));
    }

    #[test]
    fn nested_manifest_folder_is_rejected() {
        assert!(SortConfig::builder().manifest_folder("a/b").build().is_err());
    }

    #[test]
    fn scheduler_requires_single_writer() {
        let cfg = SchedulerConfig {
            max_concurrency: 2,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
        assert!(SchedulerConfig::default().validate().is_ok());
    }
}

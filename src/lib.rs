//! # edgequake-pdfsort
//!
//! Split scanned station bundles into their sub-documents and file each one
//! into the broadcast filing taxonomy, using a Vision Language Model to read
//! the pages.
//!
//! A bundle is one long PDF: cover sheets, BM forms, KTKS check sheets,
//! original broadcast messages and FTP log screenshots, in whatever order
//! the operator scanned them. This crate classifies every page, repairs
//! weak classifications from their neighbours, cuts the bundle at header
//! pages and copies each piece (no re-rendering) into its folder.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     resolve local file or download from URL
//!  ├─ 2. Classify  render batches via pdfium, ask the VLM (rate gate + retry)
//!  ├─ 3. Smooth    propagate strong subtypes onto weak pages
//!  ├─ 4. Group     cut at form / source-message / log headers
//!  ├─ 5. Route     decision table → folder path
//!  ├─ 6. Plan      filenames + collision policy (shared with dry-run)
//!  └─ 7. Write     copy page ranges, persist, stage the JSON manifest
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfsort::{sort, SortConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SortConfig::builder().output_dir("/srv/filing").build()?;
//!     let output = sort("bundle-2024-03-01.pdf", &config).await?;
//!     for line in &output.report.details {
//!         println!("{line}");
//!     }
//!     eprintln!("{} written, {} failed", output.report.success, output.report.failed);
//!     Ok(())
//! }
//! ```
//!
//! ## Testing without pdfium or an API key
//!
//! [`SortContext::new`] takes any [`PageClassifier`], [`PdfBackend`] and
//! [`DestinationStore`], so the whole pipeline runs against stubs.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfsort` binary (clap + anyhow + indicatif + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod manifest;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod route;
pub mod scheduler;
pub mod sort;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{SchedulerConfig, SortConfig, SortConfigBuilder};
pub use error::{GroupError, SortError};
pub use manifest::{replay, Manifest};
pub use model::{DocumentGroup, OutputArtifact, PageInfo, PageType, ServiceType, SubType};
pub use output::{SortOutput, SortPreview, SortStats, WriteReport};
pub use pipeline::classify::{ClassifiedPage, PageClassifier, PageImage, RateGate, VisionClassifier};
pub use pipeline::render::{PdfBackend, PdfiumBackend, RasterSize};
pub use progress::{NoopProgressCallback, ProgressCallback, SortProgressCallback};
pub use route::{route, route_group, FolderTree, RouteKey, TreeNode};
pub use scheduler::{JobEvent, JobHandler, JobId, JobScheduler, JobSnapshot, JobState, RunSummary};
pub use sort::{inspect, preview, sort, SortContext};
pub use storage::{DestinationStore, LocalStore};

//! Progress-callback trait for sorting events.
//!
//! Inject an [`Arc<dyn SortProgressCallback>`] via
//! [`crate::config::SortConfigBuilder::progress_callback`] to receive events
//! as the pipeline classifies the bundle and writes each group.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdfsort::{SortConfig, SortProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl SortProgressCallback for Counter {
//!     fn on_group_written(&self, _index: usize, _total: usize, _path: &str) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = SortConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the sorting pipeline as it progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Groups are written one at a time, in page order.
pub trait SortProgressCallback: Send + Sync {
    /// Called once the page count is known, before classification.
    fn on_sort_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called after classification, smoothing and grouping.
    fn on_grouped(&self, total_pages: usize, total_groups: usize) {
        let _ = (total_pages, total_groups);
    }

    /// Called after a group's sub-PDF is persisted.
    ///
    /// * `index` — 1-based group index
    /// * `path`  — `FOLDER/…/filename.pdf` relative to the output root
    fn on_group_written(&self, index: usize, total_groups: usize, path: &str) {
        let _ = (index, total_groups, path);
    }

    /// Called when a group could not be copied or written.
    fn on_group_error(&self, index: usize, total_groups: usize, error: &str) {
        let _ = (index, total_groups, error);
    }

    /// Called once after every group was attempted.
    fn on_sort_complete(&self, success: usize, failed: usize) {
        let _ = (success, failed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl SortProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::SortConfig`].
pub type ProgressCallback = Arc<dyn SortProgressCallback>;

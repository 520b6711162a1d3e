//! Error types for the edgequake-pdfsort library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`SortError`] — **Fatal**: the source document cannot be sorted at all
//!   (bad input file, classifier failure, unwritable destination). Returned as
//!   `Err(SortError)` from the top-level entry points.
//!
//! * [`GroupError`] — **Non-fatal**: one document group could not be copied or
//!   written, or the manifest could not be staged. Stored in
//!   [`crate::output::WriteReport`] while the remaining groups carry on.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdfsort library.
#[derive(Debug, Error)]
pub enum SortError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Classifier errors ─────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Classification failed or returned output that could not be used.
    /// A document is classified entirely or not at all.
    #[error("Page classification failed: {detail}")]
    Classifier { detail: String },

    // ── Storage errors ────────────────────────────────────────────────────
    /// The destination tree is not writable.
    #[error("No write permission on destination '{path}': {source}")]
    DirectoryPermission {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other destination I/O failure outside a single group's write.
    #[error("Storage error at '{path}': {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A staged manifest could not be parsed.
    #[error("Manifest '{name}' is unreadable: {detail}")]
    ManifestParse { name: String, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SortError {
    /// Map an I/O error on the destination tree, singling out permission
    /// problems which can never be recovered per group.
    pub fn from_storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            SortError::DirectoryPermission { path, source }
        } else {
            SortError::Storage { path, source }
        }
    }

    /// Whether this error must abort the whole run rather than one group.
    pub fn is_directory_permission(&self) -> bool {
        matches!(self, SortError::DirectoryPermission { .. })
    }
}

/// A non-fatal error for a single document group.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum GroupError {
    /// Copying the page range out of the source PDF failed.
    #[error("{code} (pages {start_page}-{end_page}): page copy failed: {detail}")]
    PageCopyFailed {
        code: String,
        start_page: usize,
        end_page: usize,
        detail: String,
    },

    /// Persisting the rendered sub-PDF failed.
    #[error("{code}: write to '{path}' failed: {detail}")]
    WriteFailed {
        code: String,
        path: String,
        detail: String,
    },

    /// The run manifest could not be staged.
    #[error("manifest '{name}' not written: {detail}")]
    ManifestWriteFailed { name: String, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn permission_denied_maps_to_directory_permission() {
        let e = SortError::from_storage(
            "/out",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(e.is_directory_permission());
        assert!(e.to_string().contains("/out"));
    }

    #[test]
    fn other_io_maps_to_storage() {
        let e = SortError::from_storage("/out", io::Error::other("disk full"));
        assert!(!e.is_directory_permission());
        assert!(matches!(e, SortError::Storage { .. }));
    }

    #[test]
    fn page_copy_failure_names_code() {
        let e = GroupError::PageCopyFailed {
            code: "QT.MSI-BM.03".into(),
            start_page: 5,
            end_page: 7,
            detail: "bad xref".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("QT.MSI-BM.03"), "got: {msg}");
        assert!(msg.contains("5-7"));
    }

    #[test]
    fn classifier_display() {
        let e = SortError::Classifier {
            detail: "no record for page 4".into(),
        };
        assert!(e.to_string().contains("page 4"));
    }
}

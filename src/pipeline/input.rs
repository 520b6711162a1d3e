//! Input resolution: turn a user-supplied path or URL into a local PDF file.
//!
//! pdfium opens files by path, so URLs are downloaded into a `TempDir` that
//! lives as long as the [`ResolvedInput`]. The `%PDF` magic is checked up
//! front so callers get [`SortError::NotAPdf`] instead of a pdfium failure.
//!
//! The resolved input also carries the *source file name*, which keys the
//! output filenames and the staged manifest.

use crate::error::SortError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// A source PDF ready for pdfium.
#[derive(Debug)]
pub enum ResolvedInput {
    Local(PathBuf),
    /// The `TempDir` is held so the download survives until sorting ends.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }

    /// File name of the source, e.g. `"Bundle 2024-03-01.pdf"`.
    pub fn file_name(&self) -> String {
        self.path()
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document.pdf".to_string())
    }
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, SortError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

fn resolve_local(path_str: &str) -> Result<ResolvedInput, SortError> {
    if path_str.trim().is_empty() {
        return Err(SortError::InvalidInput {
            input: path_str.to_string(),
        });
    }
    let path = PathBuf::from(path_str);
    if !path.is_file() {
        return Err(SortError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() {
                check_magic(&path, magic)?;
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(SortError::PermissionDenied { path });
        }
        Err(_) => return Err(SortError::FileNotFound { path }),
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

fn check_magic(path: &Path, magic: [u8; 4]) -> Result<(), SortError> {
    if &magic != b"%PDF" {
        return Err(SortError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, SortError> {
    info!("Downloading PDF from: {}", url);
    let failed = |reason: String| SortError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            SortError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;

    let temp_dir = TempDir::new().map_err(|e| SortError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(filename_from_url(url));
    if bytes.len() >= 4 {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        check_magic(&file_path, magic)?;
    }

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| SortError::Internal(format!("Failed to write temp file: {}", e)))?;
    info!("Downloaded to: {}", file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Last path segment of the URL when it looks like a file name.
fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty() && last.contains('.'))
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}

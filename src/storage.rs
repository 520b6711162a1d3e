//! Destination storage: the filing tree sorted documents are written into.
//!
//! Paths are given as folder-name segments relative to the store root so the
//! router never deals with platform separators. [`LocalStore`] maps them onto
//! a directory with `tokio::fs`.

use crate::error::SortError;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// Hierarchical, create-if-absent storage for sorted output.
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Human-readable location, for logs.
    fn describe(&self) -> String;

    /// Fail with [`SortError::DirectoryPermission`] if the root is not writable.
    async fn check_writable(&self) -> Result<(), SortError>;

    /// Create every folder along `path`.
    async fn ensure_dir(&self, path: &[String]) -> Result<(), SortError>;

    /// Create or replace `name` inside `path`, creating folders as needed.
    async fn write_file(&self, path: &[String], name: &str, bytes: &[u8]) -> Result<(), SortError>;

    async fn read_file(&self, path: &[String], name: &str) -> Result<Vec<u8>, SortError>;

    /// File names directly inside `path`; empty when the folder is absent.
    async fn list_files(&self, path: &[String]) -> Result<Vec<String>, SortError>;

    async fn exists(&self, path: &[String], name: &str) -> Result<bool, SortError> {
        Ok(self.list_files(path).await?.iter().any(|n| n == name))
    }
}

/// A [`DestinationStore`] rooted at a local directory.
///
/// Folder creation is serialised behind one lock so two writers never race
/// on the same `create_dir_all`.
pub struct LocalStore {
    root: PathBuf,
    dir_lock: Mutex<()>,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dir_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join segments onto the root, rejecting anything that could escape it.
    fn resolve(&self, path: &[String]) -> Result<PathBuf, SortError> {
        let mut full = self.root.clone();
        for segment in path {
            validate_segment(segment).map_err(|e| SortError::from_storage(&full, e))?;
            full.push(segment);
        }
        Ok(full)
    }
}

fn validate_segment(segment: &str) -> io::Result<()> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\\'])
    {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid path segment '{segment}'"),
        ));
    }
    Ok(())
}

#[async_trait]
impl DestinationStore for LocalStore {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    async fn check_writable(&self) -> Result<(), SortError> {
        self.ensure_dir(&[]).await?;
        let marker = self.root.join(".pdfsort-writable");
        tokio::fs::write(&marker, b"")
            .await
            .map_err(|e| SortError::from_storage(&self.root, e))?;
        tokio::fs::remove_file(&marker)
            .await
            .map_err(|e| SortError::from_storage(&marker, e))
    }

    async fn ensure_dir(&self, path: &[String]) -> Result<(), SortError> {
        let dir = self.resolve(path)?;
        let _guard = self.dir_lock.lock().await;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| SortError::from_storage(&dir, e))
    }

    async fn write_file(&self, path: &[String], name: &str, bytes: &[u8]) -> Result<(), SortError> {
        self.ensure_dir(path).await?;
        let dir = self.resolve(path)?;
        validate_segment(name).map_err(|e| SortError::from_storage(&dir, e))?;
        let target = dir.join(name);

        // Atomic write: temp file in the same folder, then rename.
        let tmp = dir.join(format!(".{name}.tmp"));
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| SortError::from_storage(&tmp, e))?;
        tokio::fs::rename(&tmp, &target)
            .await
            .map_err(|e| SortError::from_storage(&target, e))?;

        debug!("Wrote {} ({} bytes)", target.display(), bytes.len());
        Ok(())
    }

    async fn read_file(&self, path: &[String], name: &str) -> Result<Vec<u8>, SortError> {
        let dir = self.resolve(path)?;
        validate_segment(name).map_err(|e| SortError::from_storage(&dir, e))?;
        let target = dir.join(name);
        tokio::fs::read(&target)
            .await
            .map_err(|e| SortError::from_storage(&target, e))
    }

    async fn list_files(&self, path: &[String]) -> Result<Vec<String>, SortError> {
        let dir = self.resolve(path)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SortError::from_storage(&dir, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SortError::from_storage(&dir, e))?
        {
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if is_file {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

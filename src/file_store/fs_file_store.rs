//! Filesystem-based FileStore implementation.
//!
//! FsFileStore keeps each file directly under a root directory on disk.
//! Writes are atomic: content is written to a temp file in `.fedit/` and
//! then renamed into place.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{debug, warn};

use crate::file_store::{Error, FileEntry, FileStore, Result, StorePath, WORK_DIR_NAME};

/// Counter for generating unique temp file names.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A FileStore backed by the local filesystem.
pub struct FsFileStore {
    /// Root path on the filesystem.
    root: PathBuf,
}

impl FsFileStore {
    /// Create a new FsFileStore rooted at the given path.
    ///
    /// The root directory is created on the first write if it does not exist.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Convert a store path to an absolute filesystem path.
    fn to_absolute(&self, path: &StorePath) -> PathBuf {
        self.root.join(path.to_relative_path())
    }

    /// Get the path to the temp directory.
    fn temp_dir(&self) -> PathBuf {
        self.root.join(WORK_DIR_NAME)
    }

    /// Generate a unique temp file path.
    fn temp_file_path(&self) -> PathBuf {
        let counter = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let pid = std::process::id();
        self.temp_dir().join(format!("tmp.{}.{}", pid, counter))
    }

    fn modified(metadata: &std::fs::Metadata) -> Option<DateTime<Utc>> {
        metadata.modified().ok().map(DateTime::<Utc>::from)
    }

    /// Look up the metadata of a file.
    ///
    /// Returns None if nothing exists at the path, and `Error::NotAFile` if a
    /// directory does.
    async fn file_metadata(&self, path: &StorePath) -> Result<Option<std::fs::Metadata>> {
        match fs::metadata(self.to_absolute(path)).await {
            Ok(m) if m.is_file() => Ok(Some(m)),
            Ok(_) => Err(Error::NotAFile(path.to_string())),
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                Ok(None)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Ensure no parent component of the path is an existing file.
    async fn check_parents(&self, path: &StorePath) -> Result<()> {
        let mut current = self.root.clone();
        for component in path.parent_components() {
            current.push(component);
            match fs::metadata(&current).await {
                Ok(m) if m.is_file() => {
                    return Err(Error::InvalidPath(format!(
                        "parent of {} is a file: {}",
                        path,
                        current.strip_prefix(&self.root).unwrap_or(&current).display()
                    )));
                }
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(())
    }

    /// Write content to the final location through a temp file.
    async fn write_atomic(&self, path: &StorePath, content: &str) -> Result<()> {
        let full_path = self.to_absolute(path);
        let temp_path = self.temp_file_path();

        fs::create_dir_all(self.temp_dir()).await?;
        fs::write(&temp_path, content.as_bytes()).await?;

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        if let Err(e) = fs::rename(&temp_path, &full_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(Error::Io(e));
        }
        Ok(())
    }

    /// Remove directories left empty after a file was moved out of them.
    async fn prune_empty_parents(&self, path: &StorePath) {
        let mut dir = self.to_absolute(path);
        for _ in path.parent_components() {
            if !dir.pop() || dir == self.root {
                break;
            }
            if fs::remove_dir(&dir).await.is_err() {
                break;
            }
            debug!(dir = %dir.display(), "removed empty directory");
        }
    }
}

#[async_trait]
impl FileStore for FsFileStore {
    async fn create(&self, path: &StorePath, content: &str) -> Result<()> {
        if self.file_metadata(path).await?.is_some() {
            return Err(Error::AlreadyExists(path.to_string()));
        }
        self.check_parents(path).await?;
        self.write_atomic(path, content).await
    }

    async fn read(&self, path: &StorePath) -> Result<String> {
        if self.file_metadata(path).await?.is_none() {
            return Err(Error::NotFound(path.to_string()));
        }

        let contents = fs::read(self.to_absolute(path)).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::NotFound(path.to_string())
            } else {
                Error::Io(e)
            }
        })?;
        String::from_utf8(contents).map_err(|_| Error::NotText(path.to_string()))
    }

    async fn update(&self, path: &StorePath, content: &str) -> Result<()> {
        if self.file_metadata(path).await?.is_none() {
            return Err(Error::NotFound(path.to_string()));
        }
        self.write_atomic(path, content).await
    }

    async fn rename(&self, from: &StorePath, to: &StorePath) -> Result<()> {
        if self.file_metadata(from).await?.is_none() {
            return Err(Error::NotFound(from.to_string()));
        }
        if from == to {
            return Err(Error::AlreadyExists(to.to_string()));
        }
        if self.file_metadata(to).await?.is_some() {
            return Err(Error::AlreadyExists(to.to_string()));
        }
        self.check_parents(to).await?;

        let target = self.to_absolute(to);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(self.to_absolute(from), &target).await?;
        self.prune_empty_parents(from).await;
        Ok(())
    }

    async fn delete(&self, path: &StorePath) -> Result<()> {
        if self.file_metadata(path).await?.is_none() {
            return Err(Error::NotFound(path.to_string()));
        }

        fs::remove_file(self.to_absolute(path)).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::NotFound(path.to_string())
            } else {
                Error::Io(e)
            }
        })?;
        self.prune_empty_parents(path).await;
        Ok(())
    }

    async fn get_entry(&self, path: &StorePath) -> Result<Option<FileEntry>> {
        Ok(self
            .file_metadata(path)
            .await?
            .map(|m| FileEntry::new(path, m.len(), Self::modified(&m))))
    }

    async fn list(&self) -> Result<Vec<FileEntry>> {
        let mut entries = Vec::new();
        match fs::metadata(&self.root).await {
            Ok(m) if m.is_dir() => {}
            Ok(_) => {
                return Err(Error::InvalidPath(format!(
                    "store root is not a directory: {}",
                    self.root.display()
                )));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(Error::Io(e)),
        }

        scan_directory(&self.root, "", &mut entries).await?;
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Recursively collect file entries below a directory.
async fn scan_directory(dir_path: &Path, prefix: &str, entries: &mut Vec<FileEntry>) -> Result<()> {
    let mut dir = fs::read_dir(dir_path).await?;
    let mut sorted_entries = Vec::new();

    while let Some(entry) = dir.next_entry().await? {
        sorted_entries.push(entry);
    }
    sorted_entries.sort_by_key(|a| a.file_name());

    for entry in sorted_entries {
        let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
            warn!(path = %entry.path().display(), "skipping entry with non UTF-8 name");
            continue;
        };
        if prefix.is_empty() && file_name == WORK_DIR_NAME {
            continue;
        }

        let relative = if prefix.is_empty() {
            file_name
        } else {
            format!("{}/{}", prefix, file_name)
        };

        let metadata = entry.metadata().await?;
        if metadata.is_dir() {
            Box::pin(scan_directory(&entry.path(), &relative, entries)).await?;
            continue;
        }

        match StorePath::parse(&relative) {
            Ok(path) => entries.push(FileEntry::new(
                &path,
                metadata.len(),
                FsFileStore::modified(&metadata),
            )),
            Err(e) => warn!(path = %relative, error = %e, "skipping unaddressable file"),
        }
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

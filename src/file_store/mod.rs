//! File Store traits and types for reading and writing named text files.
//!
//! A [`FileStore`] is a flat namespace of text files keyed by [`StorePath`].
//! Two implementations are provided:
//! - [`FsFileStore`] - files live directly under a directory on disk
//! - [`MemoryFileStore`] - an in-memory table, intended primarily for testing

mod fs_file_store;
mod memory_file_store;
mod store_path;

pub use fs_file_store::FsFileStore;
pub use memory_file_store::MemoryFileStore;
pub use store_path::{StorePath, MAX_COMPONENT_LEN, MAX_PATH_LEN, WORK_DIR_NAME};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Result type for file store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in file store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("File already exists: {0}")]
    AlreadyExists(String),

    #[error("Path is not a file: {0}")]
    NotAFile(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("File is not valid UTF-8 text: {0}")]
    NotText(String),
}

// =============================================================================
// Entry Types
// =============================================================================

/// A file entry returned by listing or lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    /// Base name of the file.
    pub name: String,
    /// Path relative to the FileStore's root.
    pub path: String,
    /// Size of the file in bytes.
    pub size: u64,
    /// Last modification time, if the store tracks one.
    pub modified: Option<DateTime<Utc>>,
}

impl FileEntry {
    pub(crate) fn new(path: &StorePath, size: u64, modified: Option<DateTime<Utc>>) -> Self {
        Self {
            name: path.file_name().to_string(),
            path: path.as_str().to_string(),
            size,
            modified,
        }
    }
}

/// SHA-256 of the content in lower-case hexadecimal.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

// =============================================================================
// FileStore Trait
// =============================================================================

/// A table of named text files.
///
/// Implementations do no locking: concurrent writers to the same path are
/// last-write-wins.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Write a new file.
    ///
    /// Returns `Error::AlreadyExists` if the path is taken.
    async fn create(&self, path: &StorePath, content: &str) -> Result<()>;

    /// Read a file's content.
    ///
    /// Returns `Error::NotFound` if the path does not exist.
    async fn read(&self, path: &StorePath) -> Result<String>;

    /// Overwrite an existing file's content.
    ///
    /// Returns `Error::NotFound` if the path does not exist.
    async fn update(&self, path: &StorePath, content: &str) -> Result<()>;

    /// Move a file to a new path.
    ///
    /// Returns `Error::NotFound` if `from` does not exist and
    /// `Error::AlreadyExists` if `to` is taken.
    async fn rename(&self, from: &StorePath, to: &StorePath) -> Result<()>;

    /// Remove a file.
    ///
    /// Returns `Error::NotFound` if the path does not exist.
    async fn delete(&self, path: &StorePath) -> Result<()>;

    /// Get information about the file at the given path.
    ///
    /// Returns None if the path does not exist.
    async fn get_entry(&self, path: &StorePath) -> Result<Option<FileEntry>>;

    /// List every file in the store, sorted by path.
    async fn list(&self) -> Result<Vec<FileEntry>>;
}

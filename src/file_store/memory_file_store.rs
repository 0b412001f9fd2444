//! In-memory FileStore implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::file_store::{Error, FileEntry, FileStore, Result, StorePath};

#[derive(Debug, Clone)]
struct MemoryFile {
    content: String,
    modified: DateTime<Utc>,
}

/// An in-memory implementation of `FileStore`, intended primarily for testing.
#[derive(Debug, Default)]
pub struct MemoryFileStore {
    files: RwLock<BTreeMap<StorePath, MemoryFile>>,
}

impl MemoryFileStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with the given files.
    ///
    /// Invalid paths are an error.
    pub fn with_files<I, P, C>(files: I) -> Result<Self>
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: Into<String>,
    {
        let now = Utc::now();
        let mut map = BTreeMap::new();
        for (path, content) in files {
            map.insert(
                StorePath::parse(path.as_ref())?,
                MemoryFile {
                    content: content.into(),
                    modified: now,
                },
            );
        }
        Ok(Self {
            files: RwLock::new(map),
        })
    }

    /// Number of files currently stored.
    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn create(&self, path: &StorePath, content: &str) -> Result<()> {
        let mut files = self.files.write().await;
        if files.contains_key(path) {
            return Err(Error::AlreadyExists(path.to_string()));
        }
        files.insert(
            path.clone(),
            MemoryFile {
                content: content.to_string(),
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn read(&self, path: &StorePath) -> Result<String> {
        let files = self.files.read().await;
        files
            .get(path)
            .map(|f| f.content.clone())
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    async fn update(&self, path: &StorePath, content: &str) -> Result<()> {
        let mut files = self.files.write().await;
        let file = files
            .get_mut(path)
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        file.content = content.to_string();
        file.modified = Utc::now();
        Ok(())
    }

    async fn rename(&self, from: &StorePath, to: &StorePath) -> Result<()> {
        let mut files = self.files.write().await;
        if !files.contains_key(from) {
            return Err(Error::NotFound(from.to_string()));
        }
        if files.contains_key(to) {
            return Err(Error::AlreadyExists(to.to_string()));
        }
        if let Some(mut file) = files.remove(from) {
            file.modified = Utc::now();
            files.insert(to.clone(), file);
        }
        Ok(())
    }

    async fn delete(&self, path: &StorePath) -> Result<()> {
        let mut files = self.files.write().await;
        files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    async fn get_entry(&self, path: &StorePath) -> Result<Option<FileEntry>> {
        let files = self.files.read().await;
        Ok(files
            .get(path)
            .map(|f| FileEntry::new(path, f.content.len() as u64, Some(f.modified))))
    }

    async fn list(&self) -> Result<Vec<FileEntry>> {
        let files = self.files.read().await;
        Ok(files
            .iter()
            .map(|(path, f)| FileEntry::new(path, f.content.len() as u64, Some(f.modified)))
            .collect())
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{RemoteError, RemoteFetcher, RemoteRef, Result};

type Key = (String, String, String);

/// An in-memory implementation of `RemoteFetcher`, intended primarily for testing.
///
/// Files are keyed by (repository, branch, path).
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    files: RwLock<HashMap<Key, String>>,
    unavailable: AtomicBool,
    fetches: AtomicUsize,
}

impl MemoryFetcher {
    /// Create a new fetcher serving no files.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file and return the fetcher.
    pub fn with_file(
        mut self,
        repository: &str,
        branch: &str,
        path: &str,
        content: impl Into<String>,
    ) -> Self {
        self.files.get_mut().insert(key(repository, branch, path), content.into());
        self
    }

    /// Add or replace a file.
    pub async fn insert(&self, repository: &str, branch: &str, path: &str, content: impl Into<String>) {
        self.files
            .write()
            .await
            .insert(key(repository, branch, path), content.into());
    }

    /// Make every subsequent fetch fail as if the host were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of fetch calls made so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

fn key(repository: &str, branch: &str, path: &str) -> Key {
    (
        repository.to_string(),
        branch.to_string(),
        path.trim_matches('/').to_string(),
    )
}

#[async_trait]
impl RemoteFetcher for MemoryFetcher {
    async fn fetch(&self, reference: &RemoteRef) -> Result<String> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable(format!(
                "memory fetcher is offline: {}",
                reference
            )));
        }

        let files = self.files.read().await;
        files
            .get(&key(&reference.repository, &reference.branch, &reference.path))
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(reference.to_string()))
    }
}

//! Fetching file content from a remote source-control host.
//!
//! A [`RemoteFetcher`] resolves a [`RemoteRef`] (repository, path, branch)
//! to the file's current text content. Two implementations are provided:
//! - [`BitbucketFetcher`] - reads through the Bitbucket Cloud REST API
//! - [`MemoryFetcher`] - serves canned content, intended primarily for testing

mod bitbucket_fetcher;
mod memory_fetcher;
mod remote_ref;

pub use bitbucket_fetcher::{BitbucketFetcher, Credentials};
pub use memory_fetcher::MemoryFetcher;
pub use remote_ref::RemoteRef;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while fetching remote content.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote file not found: {0}")]
    NotFound(String),

    #[error("remote host unavailable: {0}")]
    Unavailable(String),

    #[error("invalid remote reference: {0}")]
    InvalidReference(String),

    #[error("remote file is not valid UTF-8 text: {0}")]
    NotText(String),

    #[error("remote file {reference} is larger than {max} bytes")]
    TooLarge { reference: String, max: u64 },
}

/// Result type for remote operations.
pub type Result<T> = std::result::Result<T, RemoteError>;

/// A read-only source of file content keyed by remote reference.
///
/// Implementations make a single attempt per call; there is no retry.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Retrieve the current text content of the referenced file.
    ///
    /// Returns `RemoteError::NotFound` if the path does not exist on that ref
    /// and `RemoteError::Unavailable` on network or API failure.
    async fn fetch(&self, reference: &RemoteRef) -> Result<String>;
}

//! Application-level operations over the file store and remote fetcher.

#[allow(clippy::module_inception)]
mod app;
mod file_policy;

pub use app::{
    App, AppContext, AppError, FetchOutcome, FetchRequest, FileDocument, RemoteSource, Result,
    WriteOutcome,
};
pub use file_policy::{FilePolicy, PolicyError};

//! file-editor-rs - A web-served editor for named text files.
//!
//! Files live in a [`FileStore`]; remote files are pulled from Bitbucket by a
//! [`RemoteFetcher`]. The [`App`] ties both together under a file policy and
//! is exposed over HTTP by [`server`] and on the command line by [`cli`].

pub mod app;
pub mod cli;
pub mod config;
pub mod file_store;
pub mod remote;
pub mod server;

pub use app::{App, AppContext, AppError, FetchRequest, FilePolicy, RemoteSource};
pub use file_store::{FileEntry, FileStore, FsFileStore, MemoryFileStore, StorePath};
pub use remote::{BitbucketFetcher, MemoryFetcher, RemoteError, RemoteFetcher, RemoteRef};

//! Top-level application component.
//!
//! The [`App`] owns configuration, the file store and the remote fetcher, and
//! is the root for every operation the HTTP server and the CLI expose.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::app::file_policy::{FilePolicy, PolicyError};
use crate::config::{read_config, ConfigHelper, ConfigSource};
use crate::file_store::{self, content_hash, FileEntry, FileStore, FsFileStore, StorePath};
use crate::remote::{BitbucketFetcher, RemoteError, RemoteFetcher, RemoteRef};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during App operations.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Bad path, disallowed extension, malformed content or similar.
    #[error("{0}")]
    InvalidInput(String),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("file already exists: {0}")]
    AlreadyExists(String),

    #[error("remote file not found: {0}")]
    RemoteNotFound(String),

    #[error("remote host unavailable: {0}")]
    RemoteUnavailable(String),

    /// Underlying filesystem failure.
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
}

/// Result type for App operations.
pub type Result<T> = std::result::Result<T, AppError>;

impl From<file_store::Error> for AppError {
    fn from(err: file_store::Error) -> Self {
        match err {
            file_store::Error::Io(e) => AppError::Storage(e),
            file_store::Error::NotFound(p) => AppError::NotFound(p),
            file_store::Error::AlreadyExists(p) => AppError::AlreadyExists(p),
            e @ (file_store::Error::NotAFile(_)
            | file_store::Error::InvalidPath(_)
            | file_store::Error::NotText(_)) => AppError::InvalidInput(e.to_string()),
        }
    }
}

impl From<RemoteError> for AppError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::NotFound(r) => AppError::RemoteNotFound(r),
            RemoteError::Unavailable(m) => AppError::RemoteUnavailable(m),
            e @ (RemoteError::InvalidReference(_)
            | RemoteError::NotText(_)
            | RemoteError::TooLarge { .. }) => AppError::InvalidInput(e.to_string()),
        }
    }
}

impl From<PolicyError> for AppError {
    fn from(err: PolicyError) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}

// =============================================================================
// Context Types
// =============================================================================

/// Context for creating an App.
#[derive(Default)]
pub struct AppContext {
    /// Source for configuration files.
    pub config_source: ConfigSource,
}

/// Where a fetch reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteSource {
    /// A repository (full identifier or configured name), path and optional branch.
    Reference {
        repository: String,
        path: String,
        branch: Option<String>,
    },
    /// A Bitbucket web or API URL.
    Url(String),
}

/// A request to copy a remote file into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub source: RemoteSource,
    /// Store path to write; defaults to the remote file's name.
    pub target: Option<String>,
    /// Overwrite the target if it already exists.
    pub refresh: bool,
}

impl FetchRequest {
    pub fn new(source: RemoteSource) -> Self {
        Self {
            source,
            target: None,
            refresh: false,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }
}

// =============================================================================
// Result Types
// =============================================================================

/// A file's content as returned by a read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDocument {
    pub path: String,
    pub content: String,
    /// Lower-case hex SHA-256 of the content.
    pub hash: String,
}

/// Outcome of writing a file that may or may not have existed before.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    pub path: String,
    /// False when an existing file was overwritten.
    pub created: bool,
}

/// Outcome of a remote fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchOutcome {
    pub path: String,
    pub created: bool,
    /// The remote reference that was read, as `workspace/repo@branch:path`.
    pub source: String,
}

// =============================================================================
// App
// =============================================================================

/// The top-level application component.
pub struct App {
    config: ConfigHelper,
    policy: FilePolicy,
    store: Arc<dyn FileStore>,
    fetcher: Arc<dyn RemoteFetcher>,
}

impl App {
    /// Create a new App with the given context.
    ///
    /// Files live on disk under `storage.path`; remote files come from the
    /// configured Bitbucket API.
    pub fn new(ctx: AppContext) -> Result<Self> {
        let config_result =
            read_config(&ctx.config_source).map_err(|e| AppError::Config(e.to_string()))?;
        for warning in &config_result.warnings {
            warn!("{}", warning);
        }

        let config = ConfigHelper::new(config_result.config);
        let store = Arc::new(FsFileStore::new(&config.config().storage.path));
        let fetcher = Arc::new(
            BitbucketFetcher::from_config(&config.config().remote)
                .map_err(|e| AppError::Config(e.to_string()))?
                .with_max_size(config.config().storage.max_file_size.0),
        );

        Ok(Self::from_parts(config, store, fetcher))
    }

    /// Assemble an App from already-built services.
    pub fn from_parts(
        config: ConfigHelper,
        store: Arc<dyn FileStore>,
        fetcher: Arc<dyn RemoteFetcher>,
    ) -> Self {
        let policy = FilePolicy::from_config(&config.config().storage);
        Self {
            config,
            policy,
            store,
            fetcher,
        }
    }

    /// Get the configuration helper.
    pub fn config(&self) -> &ConfigHelper {
        &self.config
    }

    pub fn policy(&self) -> &FilePolicy {
        &self.policy
    }

    // -------------------------------------------------------------------------
    // File operations
    // -------------------------------------------------------------------------

    pub async fn list_files(&self) -> Result<Vec<FileEntry>> {
        Ok(self.store.list().await?)
    }

    pub async fn read_file(&self, path: &str) -> Result<FileDocument> {
        let path = StorePath::parse(path)?;
        let content = self.store.read(&path).await?;
        Ok(FileDocument {
            path: path.to_string(),
            hash: content_hash(&content),
            content,
        })
    }

    /// Create a new file. Fails with `AlreadyExists` if the path is taken.
    pub async fn create_file(&self, path: &str, content: &str) -> Result<()> {
        let path = StorePath::parse(path)?;
        self.policy.check_extension(&path)?;
        self.policy.check_content(&path, content)?;

        self.store.create(&path, content).await?;
        info!(path = %path, bytes = content.len(), "created file");
        Ok(())
    }

    /// Store an uploaded file under the last component of its client-side name.
    ///
    /// An existing file is replaced only when `overwrite` is set.
    pub async fn upload_file(
        &self,
        file_name: &str,
        data: Bytes,
        overwrite: bool,
    ) -> Result<WriteOutcome> {
        let base_name = upload_base_name(file_name)
            .ok_or_else(|| AppError::InvalidInput("upload has no file name".to_string()))?;
        let path = StorePath::parse(base_name)?;
        self.policy.check_extension(&path)?;

        let max = self.policy.max_file_size();
        if data.len() as u64 > max {
            return Err(PolicyError::TooLarge {
                path: path.to_string(),
                size: data.len() as u64,
                max,
            }
            .into());
        }
        let content = std::str::from_utf8(&data).map_err(|_| {
            AppError::InvalidInput(format!("file is not valid UTF-8 text: {}", path))
        })?;
        self.policy.check_content(&path, content)?;

        let created = self.write(&path, content, overwrite).await?;
        info!(path = %path, bytes = data.len(), created, "uploaded file");
        Ok(WriteOutcome {
            path: path.to_string(),
            created,
        })
    }

    /// Overwrite an existing file's content.
    pub async fn save_file(&self, path: &str, content: &str) -> Result<()> {
        let path = StorePath::parse(path)?;
        self.policy.check_content(&path, content)?;

        self.store.update(&path, content).await?;
        info!(path = %path, bytes = content.len(), "saved file");
        Ok(())
    }

    pub async fn rename_file(&self, from: &str, to: &str) -> Result<()> {
        let from = StorePath::parse(from)?;
        let to = StorePath::parse(to)?;
        self.policy.check_extension(&to)?;

        self.store.rename(&from, &to).await?;
        info!(from = %from, to = %to, "renamed file");
        Ok(())
    }

    pub async fn delete_file(&self, path: &str) -> Result<()> {
        let path = StorePath::parse(path)?;
        self.store.delete(&path).await?;
        info!(path = %path, "deleted file");
        Ok(())
    }

    /// Copy a remote file into the store.
    ///
    /// Nothing is written unless the fetch and content validation both succeed.
    pub async fn fetch_remote(&self, request: &FetchRequest) -> Result<FetchOutcome> {
        let reference = self.resolve_remote(&request.source)?;
        let target = match &request.target {
            Some(target) => target.as_str(),
            None => reference.file_name(),
        };
        let path = StorePath::parse(target)?;
        self.policy.check_extension(&path)?;

        if !request.refresh && self.store.get_entry(&path).await?.is_some() {
            return Err(AppError::AlreadyExists(path.to_string()));
        }

        debug!(source = %reference, target = %path, "fetching remote file");
        let content = self.fetcher.fetch(&reference).await.inspect_err(|e| {
            warn!(source = %reference, error = %e, "remote fetch failed");
        })?;
        self.policy.check_content(&path, &content)?;

        let created = self.write(&path, &content, request.refresh).await?;
        info!(source = %reference, path = %path, created, "fetched remote file");
        Ok(FetchOutcome {
            path: path.to_string(),
            created,
            source: reference.to_string(),
        })
    }

    fn resolve_remote(&self, source: &RemoteSource) -> Result<RemoteRef> {
        match source {
            RemoteSource::Url(url) => Ok(RemoteRef::parse_url(url)?),
            RemoteSource::Reference {
                repository,
                path,
                branch,
            } => {
                let resolved = self
                    .config
                    .resolve_repository(repository.trim(), branch.as_deref())
                    .ok_or_else(|| {
                        AppError::InvalidInput(format!("unknown repository: {}", repository))
                    })?;
                Ok(RemoteRef::new(&resolved.repository, path, &resolved.branch)?)
            }
        }
    }

    /// Create the file, or update it when `overwrite` is set and it exists.
    /// Returns true if the file was created.
    async fn write(&self, path: &StorePath, content: &str, overwrite: bool) -> Result<bool> {
        if !overwrite {
            self.store.create(path, content).await?;
            return Ok(true);
        }
        match self.store.update(path, content).await {
            Ok(()) => Ok(false),
            Err(file_store::Error::NotFound(_)) => {
                self.store.create(path, content).await?;
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Last path component of a client-supplied file name, ignoring either separator.
fn upload_base_name(file_name: &str) -> Option<&str> {
    file_name
        .rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, RepositoryConfig};
    use crate::file_store::MemoryFileStore;
    use crate::remote::MemoryFetcher;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.repositories.insert(
            "infra".to_string(),
            RepositoryConfig {
                repository: "acme/infra".to_string(),
                branch: Some("develop".to_string()),
            },
        );
        config
    }

    fn test_app(fetcher: MemoryFetcher) -> (App, Arc<MemoryFileStore>, Arc<MemoryFetcher>) {
        let store = Arc::new(MemoryFileStore::new());
        let fetcher = Arc::new(fetcher);
        let app = App::from_parts(
            ConfigHelper::new(test_config()),
            store.clone(),
            fetcher.clone(),
        );
        (app, store, fetcher)
    }

    fn reference(repository: &str, path: &str, branch: Option<&str>) -> FetchRequest {
        FetchRequest::new(RemoteSource::Reference {
            repository: repository.to_string(),
            path: path.to_string(),
            branch: branch.map(str::to_string),
        })
    }

    #[tokio::test]
    async fn test_app_creation() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AppContext {
            config_source: ConfigSource {
                overrides: vec![(
                    "storage.path".to_string(),
                    dir.path().to_string_lossy().to_string(),
                )],
                ..Default::default()
            },
        };
        let app = App::new(ctx).unwrap();
        assert_eq!(app.config().config().storage.path, dir.path());
        assert!(app.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_edit_scenario() {
        let (app, _, _) = test_app(MemoryFetcher::new());

        app.create_file("notes.txt", "hello").await.unwrap();
        app.save_file("notes.txt", "hello world").await.unwrap();
        app.rename_file("notes.txt", "notes2.txt").await.unwrap();

        let doc = app.read_file("notes2.txt").await.unwrap();
        assert_eq!(doc.content, "hello world");
        assert_eq!(doc.hash, content_hash("hello world"));
        assert!(matches!(
            app.read_file("notes.txt").await,
            Err(AppError::NotFound(_))
        ));

        app.delete_file("notes2.txt").await.unwrap();
        assert!(app.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overlong_names_are_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::from_parts(
            ConfigHelper::new(test_config()),
            Arc::new(FsFileStore::new(dir.path())),
            Arc::new(MemoryFetcher::new()),
        );
        let long = format!("{}.txt", "a".repeat(300));

        assert!(matches!(
            app.create_file(&long, "x").await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            app.read_file(&long).await,
            Err(AppError::InvalidInput(_))
        ));
        app.create_file("short.txt", "x").await.unwrap();
        assert!(matches!(
            app.rename_file("short.txt", &format!("dir/{}", long)).await,
            Err(AppError::InvalidInput(_))
        ));
        assert_eq!(app.read_file("short.txt").await.unwrap().content, "x");
    }

    #[test]
    fn test_remote_errors_map_to_app_errors() {
        let too_large = RemoteError::TooLarge {
            reference: "acme/infra@main:big.txt".to_string(),
            max: 10,
        };
        assert!(matches!(
            AppError::from(too_large),
            AppError::InvalidInput(m) if m.contains("big.txt")
        ));
        assert!(matches!(
            AppError::from(RemoteError::NotFound("x".to_string())),
            AppError::RemoteNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_list_shows_every_extension() {
        let store = Arc::new(
            MemoryFileStore::with_files([("notes.txt", "n"), ("tool.exe", "x")]).unwrap(),
        );
        let app = App::from_parts(
            ConfigHelper::new(test_config()),
            store,
            Arc::new(MemoryFetcher::new()),
        );

        let paths: Vec<String> = app
            .list_files()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect();
        assert_eq!(paths, ["notes.txt", "tool.exe"]);
        app.rename_file("tool.exe", "tool.txt").await.unwrap();
    }

    #[tokio::test]
    async fn test_create_twice_is_already_exists() {
        let (app, _, _) = test_app(MemoryFetcher::new());
        app.create_file("a.txt", "one").await.unwrap();
        assert!(matches!(
            app.create_file("a.txt", "two").await,
            Err(AppError::AlreadyExists(_))
        ));
        assert_eq!(app.read_file("a.txt").await.unwrap().content, "one");
    }

    #[tokio::test]
    async fn test_policy_rejections() {
        let (app, store, _) = test_app(MemoryFetcher::new());

        for (path, content) in [
            ("", "x"),
            ("../escape.txt", "x"),
            ("tool.exe", "x"),
            ("bad.json", "{oops"),
            ("bad.yaml", "a: [\n"),
        ] {
            assert!(
                matches!(
                    app.create_file(path, content).await,
                    Err(AppError::InvalidInput(_))
                ),
                "{}",
                path
            );
        }
        assert!(store.is_empty().await);

        app.create_file("good.json", "{}").await.unwrap();
        assert!(matches!(
            app.save_file("good.json", "[1,").await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            app.rename_file("good.json", "good.exe").await,
            Err(AppError::InvalidInput(_))
        ));
        assert_eq!(app.read_file("good.json").await.unwrap().content, "{}");
    }

    #[tokio::test]
    async fn test_upload() {
        let (app, _, _) = test_app(MemoryFetcher::new());

        let outcome = app
            .upload_file("C:\\Users\\me\\cfg.yaml", Bytes::from_static(b"a: 1\n"), false)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            WriteOutcome {
                path: "cfg.yaml".to_string(),
                created: true
            }
        );

        assert!(matches!(
            app.upload_file("cfg.yaml", Bytes::from_static(b"a: 2\n"), false).await,
            Err(AppError::AlreadyExists(_))
        ));

        let outcome = app.upload_file("cfg.yaml", Bytes::from_static(b"a: 2\n"), true).await.unwrap();
        assert!(!outcome.created);
        assert_eq!(app.read_file("cfg.yaml").await.unwrap().content, "a: 2\n");

        assert!(matches!(
            app.upload_file("blob.txt", Bytes::from_static(&[0xff, 0x00]), false).await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            app.upload_file("dir/", Bytes::from_static(b"x"), false).await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_size_limit() {
        let mut config = Config::default();
        config.storage.max_file_size = crate::config::ByteSize(3);
        let app = App::from_parts(
            ConfigHelper::new(config),
            Arc::new(MemoryFileStore::new()),
            Arc::new(MemoryFetcher::new()),
        );

        assert!(app.upload_file("a.txt", Bytes::from_static(b"abc"), false).await.is_ok());
        assert!(matches!(
            app.upload_file("b.txt", Bytes::from_static(b"abcd"), false).await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_by_name_and_branch_fallback() {
        let fetcher = MemoryFetcher::new()
            .with_file("acme/infra", "develop", "config/app.yaml", "name: dev\n")
            .with_file("acme/infra", "release", "config/app.yaml", "name: rel\n");
        let (app, _, _) = test_app(fetcher);

        let outcome = app
            .fetch_remote(&reference("infra", "config/app.yaml", None))
            .await
            .unwrap();
        assert_eq!(outcome.path, "app.yaml");
        assert!(outcome.created);
        assert_eq!(outcome.source, "acme/infra@develop:config/app.yaml");
        assert_eq!(app.read_file("app.yaml").await.unwrap().content, "name: dev\n");

        let outcome = app
            .fetch_remote(
                &reference("acme/infra", "config/app.yaml", Some("release"))
                    .with_target("release/app.yaml"),
            )
            .await
            .unwrap();
        assert_eq!(outcome.path, "release/app.yaml");
        assert_eq!(
            app.read_file("release/app.yaml").await.unwrap().content,
            "name: rel\n"
        );
    }

    #[tokio::test]
    async fn test_fetch_by_url() {
        let fetcher = MemoryFetcher::new().with_file("acme/infra", "main", "docs/readme.txt", "hi");
        let (app, _, _) = test_app(fetcher);

        let request = FetchRequest::new(RemoteSource::Url(
            "https://bitbucket.org/acme/infra/src/main/docs/readme.txt".to_string(),
        ));
        let outcome = app.fetch_remote(&request).await.unwrap();
        assert_eq!(outcome.path, "readme.txt");
        assert_eq!(app.read_file("readme.txt").await.unwrap().content, "hi");
    }

    #[tokio::test]
    async fn test_fetch_not_found_leaves_store_unmodified() {
        let (app, store, fetcher) = test_app(MemoryFetcher::new());
        app.create_file("keep.txt", "kept").await.unwrap();

        let result = app
            .fetch_remote(&reference("acme/infra", "missing.txt", None))
            .await;
        assert!(matches!(result, Err(AppError::RemoteNotFound(_))));
        assert_eq!(fetcher.fetch_count(), 1);
        assert_eq!(store.len().await, 1);

        fetcher.set_unavailable(true);
        let result = app
            .fetch_remote(&reference("acme/infra", "keep.txt", None).with_refresh(true))
            .await;
        assert!(matches!(result, Err(AppError::RemoteUnavailable(_))));
        assert_eq!(app.read_file("keep.txt").await.unwrap().content, "kept");
    }

    #[tokio::test]
    async fn test_fetch_existing_target_requires_refresh() {
        let fetcher = MemoryFetcher::new().with_file("acme/infra", "main", "a.json", "{\"v\": 1}");
        let (app, _, fetcher) = test_app(fetcher);
        app.create_file("a.json", "{\"v\": 0}").await.unwrap();

        let result = app.fetch_remote(&reference("acme/infra", "a.json", None)).await;
        assert!(matches!(result, Err(AppError::AlreadyExists(_))));
        // Rejected before any network call.
        assert_eq!(fetcher.fetch_count(), 0);

        let outcome = app
            .fetch_remote(&reference("acme/infra", "a.json", None).with_refresh(true))
            .await
            .unwrap();
        assert!(!outcome.created);
        assert_eq!(app.read_file("a.json").await.unwrap().content, "{\"v\": 1}");
    }

    #[tokio::test]
    async fn test_fetch_invalid_content_is_not_written() {
        let fetcher = MemoryFetcher::new().with_file("acme/infra", "main", "broken.json", "{");
        let (app, store, _) = test_app(fetcher);

        let result = app
            .fetch_remote(&reference("acme/infra", "broken.json", None))
            .await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_fetch_unknown_repository() {
        let (app, _, fetcher) = test_app(MemoryFetcher::new());
        let result = app.fetch_remote(&reference("nope", "a.txt", None)).await;
        assert!(matches!(result, Err(AppError::InvalidInput(m)) if m.contains("nope")));
        assert_eq!(fetcher.fetch_count(), 0);
    }

    #[test]
    fn test_upload_base_name() {
        assert_eq!(upload_base_name("a.txt"), Some("a.txt"));
        assert_eq!(upload_base_name("dir/sub/a.txt"), Some("a.txt"));
        assert_eq!(upload_base_name("C:\\x\\a.txt"), Some("a.txt"));
        assert_eq!(upload_base_name("dir/"), None);
        assert_eq!(upload_base_name(""), None);
    }
}

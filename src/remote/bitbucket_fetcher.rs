use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};

use super::{RemoteError, RemoteFetcher, RemoteRef, Result};
use crate::config::RemoteConfig;

/// Characters left unescaped in a URL path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Credentials sent with every Bitbucket request.
#[derive(Clone)]
pub enum Credentials {
    /// HTTP basic auth with a username and app password.
    Basic { username: String, password: String },
    /// OAuth or repository access token.
    Bearer(String),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .finish_non_exhaustive(),
            Credentials::Bearer(_) => f.write_str("Bearer(..)"),
        }
    }
}

impl Credentials {
    /// Pick credentials from the [remote] config section.
    ///
    /// An access token wins over a username/app password pair.
    pub fn from_config(config: &RemoteConfig) -> Option<Self> {
        if let Some(token) = &config.access_token {
            return Some(Credentials::Bearer(token.clone()));
        }
        match (&config.username, &config.app_password) {
            (Some(username), Some(password)) => Some(Credentials::Basic {
                username: username.clone(),
                password: password.clone(),
            }),
            (Some(_), None) => {
                warn!("remote.username is set without remote.app_password; sending no credentials");
                None
            }
            _ => None,
        }
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Credentials::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
            Credentials::Bearer(token) => request.bearer_auth(token),
        }
    }
}

/// A `RemoteFetcher` reading through the Bitbucket Cloud REST API.
///
/// Files are read with `GET {api_url}/repositories/{workspace}/{repo_slug}/src/{ref}/{path}`.
/// The same endpoint answers a directory path with a JSON listing, which is
/// reported as `NotFound`.
pub struct BitbucketFetcher {
    client: Client,
    api_url: String,
    credentials: Option<Credentials>,
    /// Bodies longer than this are abandoned mid-download.
    max_size: Option<u64>,
}

impl BitbucketFetcher {
    /// Create a new fetcher pointing to the given API base URL.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), api_url)
    }

    /// Create a new fetcher with a custom reqwest client.
    pub fn with_client(client: Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            credentials: None,
            max_size: None,
        }
    }

    /// Create a fetcher from the [remote] config section.
    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("fedit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        let mut fetcher = Self::with_client(client, config.api_url.clone());
        fetcher.credentials = Credentials::from_config(config);
        Ok(fetcher)
    }

    /// Set the credentials sent with each request.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Refuse remote files larger than `max_size` bytes.
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Read the response body, stopping once it passes `max_size`.
    async fn read_body(&self, mut response: Response, reference: &RemoteRef) -> Result<Vec<u8>> {
        let max = self.max_size.unwrap_or(u64::MAX);
        let too_large = || RemoteError::TooLarge {
            reference: reference.to_string(),
            max,
        };

        if response.content_length().is_some_and(|len| len > max) {
            return Err(too_large());
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?
        {
            if (body.len() + chunk.len()) as u64 > max {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    fn file_url(&self, reference: &RemoteRef) -> String {
        let encode = |s: &str| utf8_percent_encode(s, PATH_SEGMENT).to_string();
        let path = reference
            .path
            .split('/')
            .map(encode)
            .collect::<Vec<_>>()
            .join("/");
        format!(
            "{}/repositories/{}/{}/src/{}/{}",
            self.api_url,
            encode(reference.workspace()),
            encode(reference.repo_slug()),
            encode(&reference.branch),
            path
        )
    }
}

#[async_trait]
impl RemoteFetcher for BitbucketFetcher {
    async fn fetch(&self, reference: &RemoteRef) -> Result<String> {
        let url = self.file_url(reference);
        debug!(%url, "fetching remote file");

        let mut request = self.client.get(&url);
        if let Some(credentials) = &self.credentials {
            request = credentials.apply(request);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let is_json = response
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .is_some_and(|v| v.starts_with("application/json"));
                let body = self.read_body(response, reference).await?;
                if is_json && is_directory_listing(&body) {
                    return Err(RemoteError::NotFound(format!("{} is a directory", reference)));
                }
                String::from_utf8(body).map_err(|_| RemoteError::NotText(reference.to_string()))
            }
            StatusCode::NOT_FOUND => Err(RemoteError::NotFound(reference.to_string())),
            status => Err(RemoteError::Unavailable(format!(
                "unexpected status code {} for {}",
                status, reference
            ))),
        }
    }
}

/// Whether a JSON body is a `src` directory listing rather than file content.
///
/// Listings are paginated objects whose `values` are all `commit_file` or
/// `commit_directory` entries.
fn is_directory_listing(body: &[u8]) -> bool {
    let Ok(serde_json::Value::Object(object)) = serde_json::from_slice(body) else {
        return false;
    };
    let Some(serde_json::Value::Array(values)) = object.get("values") else {
        return false;
    };
    object.contains_key("pagelen")
        && values.iter().all(|entry| {
            matches!(
                entry.get("type").and_then(|t| t.as_str()),
                Some("commit_file" | "commit_directory")
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::{header, HeaderMap};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::Router;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const LISTING: &str = r#"{"pagelen": 10, "page": 1, "values": [
        {"type": "commit_file", "path": "config/app.yaml"},
        {"type": "commit_directory", "path": "config/env"}
    ]}"#;

    async fn fake_src(
        Path((workspace, slug, rev, path)): Path<(String, String, String, String)>,
        headers: HeaderMap,
    ) -> Response {
        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let json = |body: &'static str| {
            ([(header::CONTENT_TYPE, "application/json")], body).into_response()
        };

        match (workspace.as_str(), slug.as_str(), rev.as_str(), path.as_str()) {
            ("acme", "infra", "main", "config/app.yaml") => {
                (StatusCode::OK, b"name: app\n".to_vec()).into_response()
            }
            ("acme", "infra", "feature/x", "notes/my file.txt") => {
                (StatusCode::OK, b"spaced".to_vec()).into_response()
            }
            ("acme", "private", "main", "secret.txt") if auth == "Bearer s3cret" => {
                (StatusCode::OK, b"classified".to_vec()).into_response()
            }
            ("acme", "private", _, _) => StatusCode::UNAUTHORIZED.into_response(),
            ("acme", "infra", "main", "blob.bin") => {
                (StatusCode::OK, vec![0xff, 0xfe]).into_response()
            }
            ("acme", "infra", "main", "boom.txt") => {
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
            ("acme", "infra", "main", "big.txt") => {
                (StatusCode::OK, vec![b'a'; 4096]).into_response()
            }
            ("acme", "infra", "main", "config") => json(LISTING),
            ("acme", "infra", "main", "config/data.json") => json(r#"{"values": [1, 2]}"#),
            _ => (StatusCode::NOT_FOUND, b"{\"type\": \"error\"}".to_vec()).into_response(),
        }
    }

    async fn spawn_fake_bitbucket() -> String {
        let app = Router::new().route(
            "/2.0/repositories/{workspace}/{slug}/src/{rev}/{*path}",
            get(fake_src),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/2.0/", addr)
    }

    fn reference(repo: &str, path: &str, branch: &str) -> RemoteRef {
        RemoteRef::new(repo, path, branch).unwrap()
    }

    #[test]
    fn test_file_url_encodes_segments() {
        let fetcher = BitbucketFetcher::new("https://api.bitbucket.org/2.0/");
        let url = fetcher.file_url(&reference("acme/infra", "dir/my file.txt", "feature/x"));
        assert_eq!(
            url,
            "https://api.bitbucket.org/2.0/repositories/acme/infra/src/feature%2Fx/dir/my%20file.txt"
        );
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let fetcher = BitbucketFetcher::new(spawn_fake_bitbucket().await);

        let content = fetcher
            .fetch(&reference("acme/infra", "config/app.yaml", "main"))
            .await
            .unwrap();
        assert_eq!(content, "name: app\n");
    }

    #[tokio::test]
    async fn test_fetch_decodes_on_server() {
        let fetcher = BitbucketFetcher::new(spawn_fake_bitbucket().await);

        let content = fetcher
            .fetch(&reference("acme/infra", "notes/my file.txt", "feature/x"))
            .await
            .unwrap();
        assert_eq!(content, "spaced");
    }

    #[tokio::test]
    async fn test_fetch_not_found() {
        let fetcher = BitbucketFetcher::new(spawn_fake_bitbucket().await);

        let result = fetcher
            .fetch(&reference("acme/infra", "missing.txt", "main"))
            .await;
        assert!(matches!(result, Err(RemoteError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_fetch_with_credentials() {
        let base = spawn_fake_bitbucket().await;
        let secret = reference("acme/private", "secret.txt", "main");

        let anonymous = BitbucketFetcher::new(base.clone());
        assert!(matches!(
            anonymous.fetch(&secret).await,
            Err(RemoteError::Unavailable(_))
        ));

        let authed =
            BitbucketFetcher::new(base).with_credentials(Credentials::Bearer("s3cret".to_string()));
        assert_eq!(authed.fetch(&secret).await.unwrap(), "classified");
    }

    #[tokio::test]
    async fn test_fetch_binary_is_not_text() {
        let fetcher = BitbucketFetcher::new(spawn_fake_bitbucket().await);

        let result = fetcher
            .fetch(&reference("acme/infra", "blob.bin", "main"))
            .await;
        assert!(matches!(result, Err(RemoteError::NotText(_))));
    }

    #[tokio::test]
    async fn test_fetch_server_error_is_unavailable() {
        let fetcher = BitbucketFetcher::new(spawn_fake_bitbucket().await);

        let result = fetcher
            .fetch(&reference("acme/infra", "boom.txt", "main"))
            .await;
        assert!(matches!(result, Err(RemoteError::Unavailable(m)) if m.contains("500")));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = BitbucketFetcher::new(format!("http://{}/2.0", addr));
        let result = fetcher
            .fetch(&reference("acme/infra", "config/app.yaml", "main"))
            .await;
        assert!(matches!(result, Err(RemoteError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_fetch_over_max_size_is_rejected() {
        let fetcher = BitbucketFetcher::new(spawn_fake_bitbucket().await).with_max_size(1024);

        let result = fetcher
            .fetch(&reference("acme/infra", "big.txt", "main"))
            .await;
        assert!(matches!(result, Err(RemoteError::TooLarge { max: 1024, .. })));

        let exact = BitbucketFetcher::new(spawn_fake_bitbucket().await).with_max_size(4096);
        let content = exact
            .fetch(&reference("acme/infra", "big.txt", "main"))
            .await
            .unwrap();
        assert_eq!(content.len(), 4096);
    }

    /// A server that answers any request with an unsized body and then closes.
    async fn spawn_unsized_body(size: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nconnection: close\r\n\r\n")
                .await;
            let _ = socket.write_all(&vec![b'z'; size]).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{}/2.0", addr)
    }

    #[tokio::test]
    async fn test_fetch_unsized_body_stops_at_max_size() {
        let fetcher =
            BitbucketFetcher::new(spawn_unsized_body(64 * 1024).await).with_max_size(1024);

        let result = fetcher
            .fetch(&reference("acme/infra", "stream.txt", "main"))
            .await;
        assert!(matches!(result, Err(RemoteError::TooLarge { .. })));
    }

    #[tokio::test]
    async fn test_fetch_directory_is_not_found() {
        let fetcher = BitbucketFetcher::new(spawn_fake_bitbucket().await);

        let result = fetcher
            .fetch(&reference("acme/infra", "config", "main"))
            .await;
        assert!(matches!(result, Err(RemoteError::NotFound(m)) if m.contains("directory")));

        // JSON files are still returned as content.
        let content = fetcher
            .fetch(&reference("acme/infra", "config/data.json", "main"))
            .await
            .unwrap();
        assert_eq!(content, r#"{"values": [1, 2]}"#);
    }

    #[test]
    fn test_is_directory_listing() {
        assert!(is_directory_listing(LISTING.as_bytes()));
        assert!(is_directory_listing(br#"{"pagelen": 10, "values": []}"#));
        assert!(!is_directory_listing(br#"{"pagelen": 10, "values": [{"type": "user"}]}"#));
        assert!(!is_directory_listing(br#"{"values": []}"#));
        assert!(!is_directory_listing(b"[1, 2]"));
        assert!(!is_directory_listing(b"name: app"));
    }

    #[test]
    fn test_credentials_from_config() {
        let mut config = crate::config::Config::default().remote;
        assert!(Credentials::from_config(&config).is_none());

        config.username = Some("bob".to_string());
        assert!(Credentials::from_config(&config).is_none());

        config.app_password = Some("pw".to_string());
        assert!(matches!(
            Credentials::from_config(&config),
            Some(Credentials::Basic { ref username, .. }) if username == "bob"
        ));

        config.access_token = Some("tok".to_string());
        assert!(matches!(
            Credentials::from_config(&config),
            Some(Credentials::Bearer(ref t)) if t == "tok"
        ));
    }
}

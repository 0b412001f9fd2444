use std::fmt;

use percent_encoding::percent_decode_str;

use super::{RemoteError, Result};

/// A (repository, path, branch) triple identifying a file on the remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    /// `workspace/repo_slug`.
    pub repository: String,
    /// `/`-separated path within the repository, without a leading slash.
    pub path: String,
    /// Branch name, tag or commit hash.
    pub branch: String,
}

impl RemoteRef {
    /// Create a validated reference.
    ///
    /// Leading and trailing slashes on the path are ignored.
    pub fn new(
        repository: impl Into<String>,
        path: impl Into<String>,
        branch: impl Into<String>,
    ) -> Result<Self> {
        let repository = repository.into().trim().trim_matches('/').to_string();
        let path = path.into().trim().trim_matches('/').to_string();
        let branch = branch.into().trim().to_string();

        match repository.split('/').collect::<Vec<_>>().as_slice() {
            [workspace, slug] if !workspace.is_empty() && !slug.is_empty() => {}
            _ => {
                return Err(RemoteError::InvalidReference(format!(
                    "repository must be 'workspace/repo_slug': '{}'",
                    repository
                )));
            }
        }

        if path.is_empty() {
            return Err(RemoteError::InvalidReference("path is empty".to_string()));
        }
        if path.split('/').any(|s| s.is_empty() || s == "." || s == "..") {
            return Err(RemoteError::InvalidReference(format!(
                "path contains an empty, '.' or '..' component: '{}'",
                path
            )));
        }

        if branch.is_empty() {
            return Err(RemoteError::InvalidReference("branch is empty".to_string()));
        }

        Ok(Self {
            repository,
            path,
            branch,
        })
    }

    /// Parse a Bitbucket file URL.
    ///
    /// Accepts web URLs (`https://bitbucket.org/{ws}/{repo}/raw/{ref}/{path}`,
    /// also with `src` instead of `raw`) and API URLs
    /// (`{api}/repositories/{ws}/{repo}/src/{ref}/{path}`). The ref is the
    /// single segment after `raw`/`src`. Query strings and fragments are
    /// ignored.
    pub fn parse_url(url: &str) -> Result<Self> {
        let invalid = |message: &str| {
            RemoteError::InvalidReference(format!("{}: '{}'", message, url))
        };

        let without_scheme = url
            .trim()
            .strip_prefix("https://")
            .or_else(|| url.trim().strip_prefix("http://"))
            .ok_or_else(|| invalid("URL must start with http:// or https://"))?;

        let without_query = without_scheme
            .split(['?', '#'])
            .next()
            .unwrap_or(without_scheme);

        let (_host, path) = without_query
            .split_once('/')
            .ok_or_else(|| invalid("URL has no path"))?;

        let segments = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                percent_decode_str(s)
                    .decode_utf8()
                    .map(|decoded| decoded.into_owned())
                    .map_err(|_| invalid("URL contains invalid percent-encoding"))
            })
            .collect::<Result<Vec<String>>>()?;

        let api_start = segments
            .iter()
            .position(|s| s == "repositories")
            .filter(|i| segments.get(i + 3).map(String::as_str) == Some("src"));

        let (workspace, slug, rev, rest) = match api_start {
            Some(i) if segments.len() > i + 5 => (
                &segments[i + 1],
                &segments[i + 2],
                &segments[i + 4],
                &segments[i + 5..],
            ),
            None if segments.len() >= 5 && matches!(segments[2].as_str(), "raw" | "src") => {
                (&segments[0], &segments[1], &segments[3], &segments[4..])
            }
            _ => return Err(invalid("not a Bitbucket file URL")),
        };

        Self::new(format!("{}/{}", workspace, slug), rest.join("/"), rev.as_str())
    }

    pub fn workspace(&self) -> &str {
        self.repository.split('/').next().unwrap_or_default()
    }

    pub fn repo_slug(&self) -> &str {
        self.repository.split('/').nth(1).unwrap_or_default()
    }

    /// The last component of the path.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

impl fmt::Display for RemoteRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.repository, self.branch, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes() {
        let r = RemoteRef::new(" acme/infra ", "/config/app.yaml", "main").unwrap();
        assert_eq!(r.repository, "acme/infra");
        assert_eq!(r.path, "config/app.yaml");
        assert_eq!(r.workspace(), "acme");
        assert_eq!(r.repo_slug(), "infra");
        assert_eq!(r.file_name(), "app.yaml");
        assert_eq!(r.to_string(), "acme/infra@main:config/app.yaml");
    }

    #[test]
    fn test_new_rejects_invalid() {
        assert!(RemoteRef::new("acme", "a.txt", "main").is_err());
        assert!(RemoteRef::new("acme/infra/extra", "a.txt", "main").is_err());
        assert!(RemoteRef::new("/infra", "a.txt", "main").is_err());
        assert!(RemoteRef::new("acme/infra", "", "main").is_err());
        assert!(RemoteRef::new("acme/infra", "a/../b.txt", "main").is_err());
        assert!(RemoteRef::new("acme/infra", "a//b.txt", "main").is_err());
        assert!(RemoteRef::new("acme/infra", "a.txt", " ").is_err());
    }

    #[test]
    fn test_parse_web_raw_url() {
        let r = RemoteRef::parse_url("https://bitbucket.org/acme/infra/raw/main/deploy/values.yaml")
            .unwrap();
        assert_eq!(r.repository, "acme/infra");
        assert_eq!(r.branch, "main");
        assert_eq!(r.path, "deploy/values.yaml");
    }

    #[test]
    fn test_parse_web_src_url_ignores_query() {
        let r = RemoteRef::parse_url(
            "https://bitbucket.org/acme/infra/src/3f2a9c1/README%20notes.txt?at=main#lines-4",
        )
        .unwrap();
        assert_eq!(r.branch, "3f2a9c1");
        assert_eq!(r.path, "README notes.txt");
    }

    #[test]
    fn test_parse_api_url() {
        let r = RemoteRef::parse_url(
            "https://api.bitbucket.org/2.0/repositories/acme/infra/src/develop/a/b.json",
        )
        .unwrap();
        assert_eq!(r.repository, "acme/infra");
        assert_eq!(r.branch, "develop");
        assert_eq!(r.path, "a/b.json");
    }

    #[test]
    fn test_parse_url_errors() {
        assert!(RemoteRef::parse_url("ftp://bitbucket.org/acme/infra/raw/main/a.txt").is_err());
        assert!(RemoteRef::parse_url("https://bitbucket.org").is_err());
        assert!(RemoteRef::parse_url("https://bitbucket.org/acme/infra").is_err());
        assert!(RemoteRef::parse_url("https://bitbucket.org/acme/infra/raw/main").is_err());
        assert!(RemoteRef::parse_url("https://bitbucket.org/acme/infra/commits/main/a.txt").is_err());
        assert!(
            RemoteRef::parse_url("https://api.bitbucket.org/2.0/repositories/acme/infra/src/main")
                .is_err()
        );
    }
}

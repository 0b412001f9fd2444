//! Configuration helper for interpreting config values.
//!
//! The `ConfigHelper` wraps a `Config` and provides methods for interpreting
//! configuration values, such as resolving named repositories.

use super::{Config, RepositoryConfig};

/// A repository identifier and branch after named-repository lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRepository {
    /// Full `workspace/repo_slug` identifier.
    pub repository: String,
    pub branch: String,
}

/// Helper for interpreting configuration values.
#[derive(Debug, Clone, Default)]
pub struct ConfigHelper {
    config: Config,
}

impl ConfigHelper {
    /// Create a new ConfigHelper wrapping the given config.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Get a reference to the underlying config.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Look up a named repository.
    pub fn get_repository(&self, name: &str) -> Option<&RepositoryConfig> {
        self.config.repositories.get(name)
    }

    /// Resolve a repository spec to a full identifier and branch.
    ///
    /// A spec containing `/` is taken as a `workspace/repo_slug` identifier;
    /// anything else is looked up among the `[repository.NAME]` sections.
    /// The branch falls back to the named repository's branch, then to
    /// `remote.default_branch`. Returns None for an unknown name.
    pub fn resolve_repository(
        &self,
        spec: &str,
        branch: Option<&str>,
    ) -> Option<ResolvedRepository> {
        let branch = branch.map(str::trim).filter(|b| !b.is_empty());
        let default_branch = &self.config.remote.default_branch;

        if spec.contains('/') {
            return Some(ResolvedRepository {
                repository: spec.to_string(),
                branch: branch.unwrap_or(default_branch).to_string(),
            });
        }

        let named = self.get_repository(spec)?;
        Some(ResolvedRepository {
            repository: named.repository.clone(),
            branch: branch
                .or(named.branch.as_deref())
                .unwrap_or(default_branch)
                .to_string(),
        })
    }
}

impl From<Config> for ConfigHelper {
    fn from(config: Config) -> Self {
        Self::new(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn helper() -> ConfigHelper {
        let mut config = Config::default();
        config.repositories.insert(
            "infra".to_string(),
            RepositoryConfig {
                repository: "acme/infra".to_string(),
                branch: Some("develop".to_string()),
            },
        );
        config.repositories.insert(
            "docs".to_string(),
            RepositoryConfig {
                repository: "acme/docs".to_string(),
                branch: None,
            },
        );
        ConfigHelper::new(config)
    }

    #[test]
    fn test_resolve_full_identifier() {
        let resolved = helper().resolve_repository("team/app", None).unwrap();
        assert_eq!(resolved.repository, "team/app");
        assert_eq!(resolved.branch, "main");

        let resolved = helper()
            .resolve_repository("team/app", Some("release"))
            .unwrap();
        assert_eq!(resolved.branch, "release");
    }

    #[test]
    fn test_resolve_named_repository() {
        let helper = helper();

        let infra = helper.resolve_repository("infra", None).unwrap();
        assert_eq!(infra.repository, "acme/infra");
        assert_eq!(infra.branch, "develop");

        let infra = helper.resolve_repository("infra", Some("hotfix")).unwrap();
        assert_eq!(infra.branch, "hotfix");

        let docs = helper.resolve_repository("docs", Some("  ")).unwrap();
        assert_eq!(docs.branch, "main");

        assert!(helper.resolve_repository("unknown", None).is_none());
    }
}

//! Configuration types for file-editor-rs.
//!
//! This module defines the structures used to represent application configuration
//! as parsed from an INI-format config file.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

// =============================================================================
// Primitive Types
// =============================================================================

/// A byte size that can be parsed from strings like "100MB", "1GB", etc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSize(pub u64);

// =============================================================================
// Config Sections
// =============================================================================

/// [server] section - HTTP listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// HTML page served at `/`, if any.
    pub index_file: Option<PathBuf>,
}

/// [storage] section - where files live and what may be written.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub path: PathBuf,
    /// Lower-case extensions without the dot. Empty allows any extension.
    pub allowed_extensions: Vec<String>,
    /// Parse JSON and YAML content before writing it.
    pub validate_content: bool,
    pub max_file_size: ByteSize,
}

/// [remote] section - Bitbucket API connection settings.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub api_url: String,
    pub username: Option<String>,
    pub app_password: Option<String>,
    pub access_token: Option<String>,
    pub timeout_secs: u64,
    pub default_branch: String,
}

/// [repository.{name}] section - named remote repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// Full `workspace/repo_slug` identifier.
    pub repository: String,
    pub branch: Option<String>,
}

// =============================================================================
// Top-Level Config
// =============================================================================

/// Complete application configuration as parsed from config file.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub remote: RemoteConfig,
    pub repositories: HashMap<String, RepositoryConfig>,
}

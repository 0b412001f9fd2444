//! Configuration file reading and parsing.
//!
//! This module handles locating, reading, and parsing INI-format configuration files,
//! with support for layered overrides.

use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use configparser::ini::Ini;
use thiserror::Error;

use super::{ByteSize, Config, RemoteConfig, RepositoryConfig, ServerConfig, StorageConfig};

// =============================================================================
// Constants - Default Values
// =============================================================================

const DEFAULT_STORAGE_PATH: &str = "files";
const DEFAULT_ALLOWED_EXTENSIONS: &str = "txt,json,yaml,yml";
const DEFAULT_VALIDATE_CONTENT: bool = true;
const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB
const DEFAULT_REMOTE_API_URL: &str = "https://api.bitbucket.org/2.0";
const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REMOTE_BRANCH: &str = "main";

const ENV_CONFIG_FILE: &str = "FEDIT_CONFIG_FILE";
const DEFAULT_CONFIG_FILENAME: &str = ".feditconfig";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid byte size '{value}': {message}")]
    InvalidByteSize { value: String, message: String },

    #[error("invalid integer '{value}': {source}")]
    InvalidInteger {
        value: String,
        source: std::num::ParseIntError,
    },

    #[error("invalid boolean '{value}' for key '{key}'")]
    InvalidBoolean { key: String, value: String },

    #[error("invalid address '{value}': {source}")]
    InvalidAddress {
        value: String,
        source: std::net::AddrParseError,
    },

    #[error("invalid override key '{key}': {message}")]
    InvalidOverrideKey { key: String, message: String },

    #[error("invalid value '{value}' for key '{key}': {message}")]
    InvalidValue {
        key: String,
        value: String,
        message: String,
    },

    #[error("missing required field '{field}' in section '{section}'")]
    MissingRequiredField { section: String, field: String },
}

/// Result type for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

// =============================================================================
// ConfigSource
// =============================================================================

/// Specifies how to locate and layer configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigSource {
    /// Explicit config file path from CLI. If specified and doesn't exist, error.
    /// If None, fall back to FEDIT_CONFIG_FILE env var, then ~/.feditconfig.
    pub config_file: Option<PathBuf>,

    /// Additional override config file (layered on top of base config).
    pub override_file: Option<PathBuf>,

    /// Individual key=value overrides (applied last).
    /// Keys use dot-notation: "storage.path", "repository.infra.branch"
    pub overrides: Vec<(String, String)>,
}

// =============================================================================
// Value Parsing
// =============================================================================

impl ByteSize {
    /// Parse a byte size from a string like "100MB", "1GB", "500KB", or plain "1024".
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ConfigError::InvalidByteSize {
                value: s.to_string(),
                message: "empty string".to_string(),
            });
        }

        let num_end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());

        if num_end == 0 {
            return Err(ConfigError::InvalidByteSize {
                value: s.to_string(),
                message: "no numeric value".to_string(),
            });
        }

        let num_str = &s[..num_end];
        let suffix = s[num_end..].trim().to_uppercase();

        let base: u64 = num_str.parse().map_err(|e| ConfigError::InvalidByteSize {
            value: s.to_string(),
            message: format!("invalid number: {}", e),
        })?;

        let multiplier: u64 = match suffix.as_str() {
            "" | "B" => 1,
            "K" | "KB" => 1024,
            "M" | "MB" => 1024 * 1024,
            "G" | "GB" => 1024 * 1024 * 1024,
            _ => {
                return Err(ConfigError::InvalidByteSize {
                    value: s.to_string(),
                    message: format!("unknown suffix '{}'", suffix),
                });
            }
        };

        Ok(ByteSize(base.saturating_mul(multiplier)))
    }
}

fn parse_bool_value(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidBoolean {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_u64_value(value: &str) -> Result<u64> {
    value.trim().parse().map_err(|e| ConfigError::InvalidInteger {
        value: value.to_string(),
        source: e,
    })
}

fn parse_addr_value(value: &str) -> Result<SocketAddr> {
    value.trim().parse().map_err(|e| ConfigError::InvalidAddress {
        value: value.to_string(),
        source: e,
    })
}

/// Parse a comma-separated extension list into lower-case entries without dots.
fn parse_extensions(s: &str) -> Vec<String> {
    s.split(',')
        .map(|s| s.trim().trim_start_matches('.').to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Treat blank values as absent.
fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

// =============================================================================
// Config File Resolution
// =============================================================================

/// Information about how the config file was resolved.
#[derive(Debug)]
pub struct ResolvedConfigFile {
    /// The path to the config file, if one was found.
    pub path: Option<PathBuf>,
    /// Warning message if env var pointed to nonexistent file.
    pub warning: Option<String>,
}

/// Resolve which config file to use based on the ConfigSource and environment.
fn resolve_config_file(source: &ConfigSource) -> Result<ResolvedConfigFile> {
    if let Some(ref path) = source.config_file {
        if path.exists() {
            return Ok(ResolvedConfigFile {
                path: Some(path.clone()),
                warning: None,
            });
        } else {
            return Err(ConfigError::FileNotFound(path.clone()));
        }
    }

    if let Ok(env_path) = env::var(ENV_CONFIG_FILE) {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(ResolvedConfigFile {
                path: Some(path),
                warning: None,
            });
        } else {
            // Warn but continue with defaults
            return Ok(ResolvedConfigFile {
                path: None,
                warning: Some(format!(
                    "config file specified by {} does not exist: {}",
                    ENV_CONFIG_FILE, env_path
                )),
            });
        }
    }

    if let Some(home) = home_dir() {
        let default_path = home.join(DEFAULT_CONFIG_FILENAME);
        if default_path.exists() {
            return Ok(ResolvedConfigFile {
                path: Some(default_path),
                warning: None,
            });
        }
    }

    Ok(ResolvedConfigFile {
        path: None,
        warning: None,
    })
}

/// Get the user's home directory.
fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME").map(PathBuf::from)
}

// =============================================================================
// Default Config
// =============================================================================

/// Create a Config with all default values.
pub(crate) fn default_config() -> Config {
    Config {
        server: ServerConfig {
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            index_file: None,
        },
        storage: StorageConfig {
            path: PathBuf::from(DEFAULT_STORAGE_PATH),
            allowed_extensions: parse_extensions(DEFAULT_ALLOWED_EXTENSIONS),
            validate_content: DEFAULT_VALIDATE_CONTENT,
            max_file_size: ByteSize(DEFAULT_MAX_FILE_SIZE),
        },
        remote: RemoteConfig {
            api_url: DEFAULT_REMOTE_API_URL.to_string(),
            username: None,
            app_password: None,
            access_token: None,
            timeout_secs: DEFAULT_REMOTE_TIMEOUT_SECS,
            default_branch: DEFAULT_REMOTE_BRANCH.to_string(),
        },
        repositories: HashMap::new(),
    }
}

impl Default for Config {
    fn default() -> Self {
        default_config()
    }
}

// =============================================================================
// INI Parsing
// =============================================================================

/// Keys that each fixed section understands.
const SECTION_KEYS: &[(&str, &[&str])] = &[
    ("server", &["bind", "index_file"]),
    (
        "storage",
        &["path", "allowed_extensions", "validate_content", "max_file_size"],
    ),
    (
        "remote",
        &[
            "api_url",
            "username",
            "app_password",
            "access_token",
            "timeout_secs",
            "default_branch",
        ],
    ),
];

/// Apply an INI file's contents to a Config, layering on top of existing values.
fn apply_ini_to_config(config: &mut Config, ini: &Ini) -> Result<()> {
    for (section, keys) in SECTION_KEYS {
        for key in *keys {
            if let Some(value) = ini.get(section, key) {
                apply_override(config, &format!("{}.{}", section, key), &value)?;
            }
        }
    }

    // [repository.*] sections
    for section_name in ini.sections() {
        if let Some(repo_name) = section_name.strip_prefix("repository.") {
            let repository = ini
                .get(&section_name, "repository")
                .and_then(|v| non_empty(&v))
                .ok_or_else(|| ConfigError::MissingRequiredField {
                    section: section_name.clone(),
                    field: "repository".to_string(),
                })?;

            let repo_config = RepositoryConfig {
                repository,
                branch: ini.get(&section_name, "branch").and_then(|v| non_empty(&v)),
            };

            config
                .repositories
                .insert(repo_name.to_string(), repo_config);
        }
    }

    Ok(())
}

/// Load and parse an INI file.
fn load_ini(path: &Path) -> Result<Ini> {
    let mut ini = Ini::new();
    ini.load(path).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e,
    })?;
    Ok(ini)
}

// =============================================================================
// Override Application
// =============================================================================

/// Apply a single key=value override to the config.
fn apply_override(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let parts: Vec<&str> = key.splitn(3, '.').collect();

    match parts.as_slice() {
        ["server", param] => apply_server_override(config, param, value),
        ["storage", param] => apply_storage_override(config, param, value),
        ["remote", param] => apply_remote_override(config, param, value),
        ["repository", name, param] => apply_repository_override(config, name, param, value),
        _ => Err(ConfigError::InvalidOverrideKey {
            key: key.to_string(),
            message: "unrecognized key format".to_string(),
        }),
    }
}

fn unknown_parameter(section: &str, param: &str) -> ConfigError {
    ConfigError::InvalidOverrideKey {
        key: format!("{}.{}", section, param),
        message: "unknown parameter".to_string(),
    }
}

fn apply_server_override(config: &mut Config, param: &str, value: &str) -> Result<()> {
    match param {
        "bind" => config.server.bind = parse_addr_value(value)?,
        "index_file" => config.server.index_file = non_empty(value).map(PathBuf::from),
        _ => return Err(unknown_parameter("server", param)),
    }
    Ok(())
}

fn apply_storage_override(config: &mut Config, param: &str, value: &str) -> Result<()> {
    match param {
        "path" => config.storage.path = PathBuf::from(value.trim()),
        "allowed_extensions" => config.storage.allowed_extensions = parse_extensions(value),
        "validate_content" => config.storage.validate_content = parse_bool_value(param, value)?,
        "max_file_size" => config.storage.max_file_size = ByteSize::parse(value)?,
        _ => return Err(unknown_parameter("storage", param)),
    }
    Ok(())
}

fn apply_remote_override(config: &mut Config, param: &str, value: &str) -> Result<()> {
    match param {
        "api_url" => config.remote.api_url = value.trim().trim_end_matches('/').to_string(),
        "username" => config.remote.username = non_empty(value),
        "app_password" => config.remote.app_password = non_empty(value),
        "access_token" => config.remote.access_token = non_empty(value),
        "timeout_secs" => {
            let secs = parse_u64_value(value)?;
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "remote.timeout_secs".to_string(),
                    value: value.to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
            config.remote.timeout_secs = secs;
        }
        "default_branch" => {
            config.remote.default_branch =
                non_empty(value).unwrap_or_else(|| DEFAULT_REMOTE_BRANCH.to_string())
        }
        _ => return Err(unknown_parameter("remote", param)),
    }
    Ok(())
}

fn apply_repository_override(
    config: &mut Config,
    name: &str,
    param: &str,
    value: &str,
) -> Result<()> {
    let repo = config
        .repositories
        .entry(name.to_string())
        .or_insert_with(|| RepositoryConfig {
            repository: String::new(),
            branch: None,
        });

    match param {
        "repository" => repo.repository = value.trim().to_string(),
        "branch" => repo.branch = non_empty(value),
        _ => return Err(unknown_parameter(&format!("repository.{}", name), param)),
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

/// Result of reading configuration, including any warnings.
#[derive(Debug)]
pub struct ConfigResult {
    /// The parsed configuration.
    pub config: Config,
    /// Any warnings generated during config loading.
    pub warnings: Vec<String>,
}

/// Read and parse configuration from the specified sources.
///
/// Configuration is layered in this order:
/// 1. Built-in defaults
/// 2. Base config file (from CLI, env var, or ~/.feditconfig)
/// 3. Override config file (if specified)
/// 4. Individual overrides (applied last)
pub fn read_config(source: &ConfigSource) -> Result<ConfigResult> {
    let mut warnings = Vec::new();

    let mut config = default_config();

    let resolved = resolve_config_file(source)?;
    if let Some(warning) = resolved.warning {
        warnings.push(warning);
    }
    if let Some(ref path) = resolved.path {
        let ini = load_ini(path)?;
        apply_ini_to_config(&mut config, &ini)?;
    }

    if let Some(ref override_path) = source.override_file {
        if !override_path.exists() {
            return Err(ConfigError::FileNotFound(override_path.clone()));
        }
        let ini = load_ini(override_path)?;
        apply_ini_to_config(&mut config, &ini)?;
    }

    for (key, value) in &source.overrides {
        apply_override(&mut config, key, value)?;
    }

    // Overrides may have introduced a repository without an identifier.
    if let Some((name, _)) = config
        .repositories
        .iter()
        .find(|(_, repo)| repo.repository.is_empty())
    {
        return Err(ConfigError::MissingRequiredField {
            section: format!("repository.{}", name),
            field: "repository".to_string(),
        });
    }

    Ok(ConfigResult { config, warnings })
}

// =============================================================================
// Tests
// =============================================================================

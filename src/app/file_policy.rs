//! Rules for which files may be written and what they may contain.

use serde::Deserialize;
use thiserror::Error;

use crate::config::StorageConfig;
use crate::file_store::StorePath;

/// A rejected path or content.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("unsupported file type for {path}; allowed extensions: {allowed}")]
    ExtensionNotAllowed { path: String, allowed: String },

    #[error("invalid JSON in {path}: {message}")]
    InvalidJson { path: String, message: String },

    #[error("invalid YAML in {path}: {message}")]
    InvalidYaml { path: String, message: String },

    #[error("{path} is {size} bytes; the limit is {max} bytes")]
    TooLarge { path: String, size: u64, max: u64 },
}

pub type Result<T> = std::result::Result<T, PolicyError>;

/// Extension allow-list, content validation and size limit for written files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePolicy {
    allowed_extensions: Vec<String>,
    validate_content: bool,
    max_file_size: u64,
}

impl FilePolicy {
    /// Create a policy. An empty extension list allows any extension.
    pub fn new(allowed_extensions: Vec<String>, validate_content: bool, max_file_size: u64) -> Self {
        Self {
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            validate_content,
            max_file_size,
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(
            config.allowed_extensions.clone(),
            config.validate_content,
            config.max_file_size.0,
        )
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Check that the path's extension is on the allow-list.
    pub fn check_extension(&self, path: &StorePath) -> Result<()> {
        if self.allowed_extensions.is_empty() {
            return Ok(());
        }
        match path.extension() {
            Some(ext) if self.allowed_extensions.contains(&ext) => Ok(()),
            _ => Err(PolicyError::ExtensionNotAllowed {
                path: path.to_string(),
                allowed: self.allowed_extensions.join(", "),
            }),
        }
    }

    /// Check content size and, when enabled, JSON/YAML syntax.
    ///
    /// Blank content always passes the syntax check so new files can start empty.
    pub fn check_content(&self, path: &StorePath, content: &str) -> Result<()> {
        let size = content.len() as u64;
        if size > self.max_file_size {
            return Err(PolicyError::TooLarge {
                path: path.to_string(),
                size,
                max: self.max_file_size,
            });
        }

        if !self.validate_content || content.trim().is_empty() {
            return Ok(());
        }

        match path.extension().as_deref() {
            Some("json") => serde_json::from_str::<serde_json::Value>(content)
                .map(|_| ())
                .map_err(|e| PolicyError::InvalidJson {
                    path: path.to_string(),
                    message: e.to_string(),
                }),
            Some("yaml") | Some("yml") => {
                for document in serde_yaml::Deserializer::from_str(content) {
                    serde_yaml::Value::deserialize(document).map_err(|e| {
                        PolicyError::InvalidYaml {
                            path: path.to_string(),
                            message: e.to_string(),
                        }
                    })?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl Default for FilePolicy {
    fn default() -> Self {
        Self::from_config(&crate::config::Config::default().storage)
    }
}

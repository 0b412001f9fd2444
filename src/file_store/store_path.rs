//! Validated relative paths naming files within a store.

use std::fmt;
use std::path::PathBuf;

use super::{Error, Result};

/// Name of the store's reserved working directory (temp files live here).
pub const WORK_DIR_NAME: &str = ".fedit";

/// Longest accepted path component, in bytes. Matches the common `NAME_MAX`.
pub const MAX_COMPONENT_LEN: usize = 255;

/// Longest accepted path, in bytes.
pub const MAX_PATH_LEN: usize = 1024;

/// A relative, `/`-separated path that is safe to join onto a store root.
///
/// Construction rejects empty paths, absolute paths, empty/`.`/`..`
/// components, backslashes and control characters, over-long names, and
/// paths inside the reserved working directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorePath(String);

impl StorePath {
    /// Parse and validate a path string.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::InvalidPath("path is empty".to_string()));
        }
        if s.len() > MAX_PATH_LEN {
            return Err(Error::InvalidPath(format!(
                "path is longer than {} bytes",
                MAX_PATH_LEN
            )));
        }
        if s.starts_with('/') {
            return Err(Error::InvalidPath(format!("path must be relative: {}", s)));
        }
        if let Some(c) = s.chars().find(|c| *c == '\\' || c.is_control()) {
            return Err(Error::InvalidPath(format!(
                "path contains disallowed character {:?}: {}",
                c, s
            )));
        }

        for component in s.split('/') {
            match component {
                "" => {
                    return Err(Error::InvalidPath(format!(
                        "path contains an empty component: {}",
                        s
                    )));
                }
                "." | ".." => {
                    return Err(Error::InvalidPath(format!(
                        "path contains '{}' component: {}",
                        component, s
                    )));
                }
                _ if component.len() > MAX_COMPONENT_LEN => {
                    return Err(Error::InvalidPath(format!(
                        "path component is longer than {} bytes: {}",
                        MAX_COMPONENT_LEN, s
                    )));
                }
                _ => {}
            }
        }

        if s.split('/').next() == Some(WORK_DIR_NAME) {
            return Err(Error::InvalidPath(format!(
                "{} is reserved: {}",
                WORK_DIR_NAME, s
            )));
        }

        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The last component of the path.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// The lower-cased extension of the file name, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(idx) if idx > 0 && idx + 1 < name.len() => Some(name[idx + 1..].to_lowercase()),
            _ => None,
        }
    }

    /// The components of the parent directory, outermost first.
    pub fn parent_components(&self) -> Vec<&str> {
        let mut parts: Vec<&str> = self.0.split('/').collect();
        parts.pop();
        parts
    }

    /// Convert to a platform path relative to the store root.
    pub fn to_relative_path(&self) -> PathBuf {
        self.0.split('/').collect()
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

//! Working directory resolution.
//!
//! Paths are normalized lexically: no filesystem access, no symlink resolution and
//! no existence check. A missing directory surfaces as a launch error at spawn.

use crate::error::ConfigError;
use std::path::{Component, Path, PathBuf};

/// The parent's current working directory, captured now.
pub fn inherited_cwd() -> Result<PathBuf, ConfigError> {
    std::env::current_dir().map_err(|e| ConfigError::CwdUnavailable {
        reason: e.to_string(),
    })
}

/// Normalize a working directory path.
///
/// Collapses `.` components, redundant separators and `a/..` pairs. `..` at the root
/// of an absolute path is dropped; leading `..` of a relative path is kept.
///
/// # Errors
///
/// `CwdInvalid` if the path is empty or contains a NUL byte.
pub fn normalize(path: &Path) -> Result<PathBuf, ConfigError> {
    let raw = path.as_os_str();
    if raw.is_empty() {
        return Err(ConfigError::CwdInvalid {
            path: String::new(),
            reason: "path is empty",
        });
    }
    if raw.as_encoded_bytes().contains(&0) {
        return Err(ConfigError::CwdInvalid {
            path: path.display().to_string(),
            reason: "path contains a NUL byte",
        });
    }

    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return Ok(PathBuf::from("."));
    }
    Ok(parts.iter().collect())
}

//! Environment variables for spawned processes.
//!
//! The parent's environment is captured once, when an [`Environment`] is created with
//! [`Environment::inherited`], and never looked up again afterwards.

use crate::error::ConfigError;
use std::collections::HashMap;
use std::ffi::OsString;

/// A concrete mapping of environment variable names to values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Snapshot of the current process environment.
    ///
    /// Entries that are not valid UTF-8 cannot be represented and are skipped.
    pub fn inherited() -> Self {
        let mut vars = HashMap::new();
        for (key, value) in std::env::vars_os() {
            match (key.into_string(), value.into_string()) {
                (Ok(k), Ok(v)) => {
                    vars.insert(k, v);
                }
                (Ok(k), Err(_)) => {
                    tracing::warn!(key = %k, "skipping inherited environment variable with non-UTF-8 value")
                }
                (Err(k), _) => {
                    tracing::warn!(key = ?k, "skipping inherited environment variable with non-UTF-8 name")
                }
            }
        }
        Self { vars }
    }

    /// An environment with no variables at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from arbitrary key/value pairs, coercing each to text.
    ///
    /// # Errors
    ///
    /// - `EnvNotText` if a key or value is not valid UTF-8
    /// - `EnvKeyInvalid` if a key is empty or contains `=` or NUL
    /// - `EnvValueInvalid` if a value contains NUL
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        let mut env = Self::empty();
        for (key, value) in pairs {
            env.set(key, value)?;
        }
        Ok(env)
    }

    /// Set one variable, replacing any previous value.
    pub fn set(
        &mut self,
        key: impl Into<OsString>,
        value: impl Into<OsString>,
    ) -> Result<(), ConfigError> {
        let key = key.into().into_string().map_err(|k| ConfigError::EnvNotText {
            key: k.to_string_lossy().into_owned(),
        })?;
        let value = value
            .into()
            .into_string()
            .map_err(|_| ConfigError::EnvNotText { key: key.clone() })?;

        validate_key(&key)?;
        if value.contains('\0') {
            return Err(ConfigError::EnvValueInvalid { key });
        }

        self.vars.insert(key, value);
        Ok(())
    }

    /// Remove one variable, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.vars.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The underlying map.
    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.vars
    }
}

fn validate_key(key: &str) -> Result<(), ConfigError> {
    let reason = if key.is_empty() {
        "name is empty"
    } else if key.contains('=') {
        "name contains '='"
    } else if key.contains('\0') {
        "name contains a NUL byte"
    } else {
        return Ok(());
    };
    Err(ConfigError::EnvKeyInvalid {
        key: key.to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let env = Environment::empty();
        assert!(env.is_empty());
        assert_eq!(env.get("PATH"), None);
    }

    #[test]
    fn test_inherited_matches_parent() {
        let env = Environment::inherited();
        if let Ok(path) = std::env::var("PATH") {
            assert_eq!(env.get("PATH"), Some(path.as_str()));
        }
    }

    #[test]
    fn test_from_pairs() {
        let env = Environment::from_pairs([("FOO", "bar"), ("HOME", "/home/user")]).unwrap();
        assert_eq!(env.get("FOO"), Some("bar"));
        assert_eq!(env.get("HOME"), Some("/home/user"));
        assert_eq!(env.len(), 2);
    }

    #[test]
    fn test_later_value_wins() {
        let env = Environment::from_pairs([("FOO", "one"), ("FOO", "two")]).unwrap();
        assert_eq!(env.get("FOO"), Some("two"));
        assert_eq!(env.len(), 1);
    }

    #[test]
    fn test_invalid_keys() {
        for key in ["", "A=B", "A\0B"] {
            let result = Environment::from_pairs([(key, "x")]);
            assert!(
                matches!(result, Err(ConfigError::EnvKeyInvalid { .. })),
                "key {:?} accepted",
                key
            );
        }
    }

    #[test]
    fn test_nul_value_rejected() {
        let result = Environment::from_pairs([("FOO", "a\0b")]);
        assert_eq!(
            result,
            Err(ConfigError::EnvValueInvalid {
                key: "FOO".to_string()
            })
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_rejected() {
        use std::os::unix::ffi::OsStringExt;

        let bad = OsString::from_vec(vec![0x66, 0x6f, 0xff]);
        let result = Environment::from_pairs([(OsString::from("FOO"), bad)]);
        assert!(matches!(result, Err(ConfigError::EnvNotText { .. })));
    }

    #[test]
    fn test_remove() {
        let mut env = Environment::from_pairs([("FOO", "bar")]).unwrap();
        assert_eq!(env.remove("FOO"), Some("bar".to_string()));
        assert!(env.is_empty());
    }
}

//! Store configuration
//!
//! Configuration is explicit and immutable once a store is open.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::observability::Severity;

/// How a store is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    /// Existing store, no mutation
    ReadOnly,
    /// Writable; opened create-capable like `Create`
    ReadWrite,
    /// Writable, creating the store if it does not exist
    Create,
}

impl OpenMode {
    /// Whether the mode permits mutations.
    pub fn is_writable(&self) -> bool {
        !matches!(self, OpenMode::ReadOnly)
    }

    /// Stable name used in logs and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            OpenMode::ReadOnly => "read_only",
            OpenMode::ReadWrite => "read_write",
            OpenMode::Create => "create",
        }
    }
}

/// Store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Open mode (default: create)
    #[serde(default = "default_mode")]
    pub mode: OpenMode,

    /// Whether change iteration loads bodies by default (default: false)
    #[serde(default)]
    pub changes_include_bodies: bool,

    /// Minimum severity the logger emits. Unset leaves the process-wide
    /// level as it is (default: unset)
    #[serde(default)]
    pub log_level: Option<Severity>,
}

fn default_mode() -> OpenMode {
    OpenMode::Create
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            changes_include_bodies: false,
            log_level: None,
        }
    }
}

impl StoreConfig {
    /// Config with the given mode and defaults elsewhere.
    pub fn with_mode(mode: OpenMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Parses a JSON config. Malformed input is an invalid argument.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|_| Error::InvalidArgument)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.mode, OpenMode::Create);
        assert!(!config.changes_include_bodies);
        assert_eq!(config.log_level, None);
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = StoreConfig::from_json(r#"{"mode": "read_only"}"#).unwrap();
        assert_eq!(config.mode, OpenMode::ReadOnly);
        assert_eq!(config.log_level, None);

        let config =
            StoreConfig::from_json(r#"{"changes_include_bodies": true, "log_level": "trace"}"#)
                .unwrap();
        assert_eq!(config.mode, OpenMode::Create);
        assert!(config.changes_include_bodies);
        assert_eq!(config.log_level, Some(Severity::Trace));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert_eq!(StoreConfig::from_json("{"), Err(Error::InvalidArgument));
        assert_eq!(
            StoreConfig::from_json(r#"{"mode": "sideways"}"#),
            Err(Error::InvalidArgument)
        );
    }

    #[test]
    fn test_writable_modes() {
        assert!(!OpenMode::ReadOnly.is_writable());
        assert!(OpenMode::ReadWrite.is_writable());
        assert!(OpenMode::Create.is_writable());
    }
}

//! Plugin host configuration
//!
//! Loaded from an optional YAML file; every field has a default so an empty
//! file (or no file at all) is a valid configuration.

use crate::plugin::error::{PluginError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManagerConfig {
    /// Directory scanned for plugins when none is given explicitly
    pub plugin_dir: Option<PathBuf>,

    /// Grace period for a plugin to exit on unload before it is killed
    pub unload_timeout_ms: u64,

    /// Upper bound on handshake plus metadata queries after launch
    pub handshake_timeout_ms: u64,

    /// Extra environment passed to every plugin process
    pub env: BTreeMap<String, String>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            plugin_dir: None,
            unload_timeout_ms: 3_000,
            handshake_timeout_ms: 10_000,
            env: BTreeMap::new(),
        }
    }
}

impl ManagerConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|err| PluginError::Config {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        Self::from_yaml(&contents).map_err(|reason| PluginError::Config {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn from_yaml(contents: &str) -> std::result::Result<Self, String> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).map_err(|err| err.to_string())
    }

    pub fn unload_timeout(&self) -> Duration {
        Duration::from_millis(self.unload_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plughost.yml");
        std::fs::write(&path, "").unwrap();

        let config = ManagerConfig::from_file(&path).unwrap();
        assert_eq!(config, ManagerConfig::default());
        assert_eq!(config.unload_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plughost.yml");
        std::fs::write(
            &path,
            "plugin_dir: /opt/plugins\nunload_timeout_ms: 500\nenv:\n  RUST_LOG: debug\n",
        )
        .unwrap();

        let config = ManagerConfig::from_file(&path).unwrap();
        assert_eq!(config.plugin_dir, Some(PathBuf::from("/opt/plugins")));
        assert_eq!(config.unload_timeout(), Duration::from_millis(500));
        assert_eq!(config.handshake_timeout(), Duration::from_secs(10));
        assert_eq!(config.env.get("RUST_LOG").map(String::as_str), Some("debug"));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plughost.yml");
        std::fs::write(&path, "unload_timeout: 5\n").unwrap();

        let err = ManagerConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, PluginError::Config { .. }));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let err = ManagerConfig::from_file(&dir.path().join("absent.yml")).unwrap_err();
        assert!(matches!(err, PluginError::Config { .. }));
    }
}

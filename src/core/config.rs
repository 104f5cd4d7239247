//! Open-time configuration

use crate::core::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Options applied when a database is created or opened
///
/// Loadable from TOML:
///
/// ```toml
/// read_only = false
/// create_if_missing = true
/// sync_on_write = false
/// title = "Tank assembly"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Reject all mutation
    pub read_only: bool,
    /// `open` creates the file when it does not exist
    pub create_if_missing: bool,
    /// fsync after every mutating operation
    pub sync_on_write: bool,
    /// Title stored in the global object when a database is created
    pub title: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            read_only: false,
            create_if_missing: false,
            sync_on_write: false,
            title: None,
        }
    }
}

impl DatabaseConfig {
    pub fn read_only() -> Self {
        DatabaseConfig {
            read_only: true,
            ..Default::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::GeomDbError;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = DatabaseConfig::from_toml_str("read_only = true\n").unwrap();
        assert!(config.read_only);
        assert!(!config.create_if_missing);
        assert_eq!(config.title, None);
    }

    #[test]
    fn test_full_toml() {
        let config = DatabaseConfig::from_toml_str(
            r#"
            read_only = false
            create_if_missing = true
            sync_on_write = true
            title = "Tank assembly"
            "#,
        )
        .unwrap();
        assert!(config.create_if_missing);
        assert!(config.sync_on_write);
        assert_eq!(config.title.as_deref(), Some("Tank assembly"));
    }

    #[test]
    fn test_bad_toml_rejected() {
        let result = DatabaseConfig::from_toml_str("read_only = \"maybe\"");
        assert!(matches!(result, Err(GeomDbError::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("geomdb.toml");
        std::fs::write(&path, "sync_on_write = true").unwrap();
        let config = DatabaseConfig::from_file(&path).unwrap();
        assert!(config.sync_on_write);
    }
}

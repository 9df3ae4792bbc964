//! Sync engine configuration.
//!
//! Loaded from TOML. Every field has a default, so an empty file is valid.
//!
//! ```toml
//! client_id = "amy-laptop"
//! document_id = "quarterly-report"
//! event_buffer = 32
//!
//! [markup]
//! insert_open = "<ins>"
//! insert_close = "</ins>"
//! delete_open = "<del>"
//! delete_close = "</del>"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Markers wrapped around inserted / deleted spans in reviewable markup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkupStyle {
    pub insert_open: String,
    pub insert_close: String,
    pub delete_open: String,
    pub delete_close: String,
}

impl Default for MarkupStyle {
    fn default() -> Self {
        Self {
            insert_open: "<ins>".into(),
            insert_close: "</ins>".into(),
            delete_open: "<del>".into(),
            delete_close: "</del>".into(),
        }
    }
}

/// Configuration for one synchronized document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Identifies this client; transforms echoed back with this origin are local.
    pub client_id: String,
    /// Shared document name on the server.
    pub document_id: String,
    /// Tracked-change markers.
    pub markup: MarkupStyle,
    /// Capacity of the worker's round-event channel.
    pub event_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            client_id: "local".into(),
            document_id: "document".into(),
            markup: MarkupStyle::default(),
            event_buffer: 32,
        }
    }
}

impl SyncConfig {
    /// Parse from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = SyncConfig::from_toml_str("").unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.markup.insert_open, "<ins>");
    }

    #[test]
    fn test_partial_markup_section() {
        let config = SyncConfig::from_toml_str(
            r#"
            client_id = "amy"
            document_id = "report"

            [markup]
            delete_open = "[-"
            delete_close = "-]"
            "#,
        )
        .unwrap();
        assert_eq!(config.client_id, "amy");
        assert_eq!(config.markup.delete_open, "[-");
        assert_eq!(config.markup.insert_open, "<ins>");
        assert_eq!(config.event_buffer, 32);
    }

    #[test]
    fn test_invalid_config_is_a_parse_error() {
        let err = SyncConfig::from_toml_str("event_buffer = \"lots\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.toml");
        std::fs::write(&path, "client_id = \"bob\"\n").unwrap();
        let config = SyncConfig::load(&path).unwrap();
        assert_eq!(config.client_id, "bob");

        let err = SyncConfig::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}

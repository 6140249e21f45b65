use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Session-wide settings.
///
/// Loaded once when a session is created; every field has a default so a
/// partial TOML document is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Coincidence tolerance used by glue, association matching and the
    /// O-grid touching check.
    pub tolerance: f64,
    /// When `false`, undoing a command releases the names it allocated so
    /// that a replayed script gets the same names again.
    pub name_shifting: bool,
    /// Number of mesh edges given to edges created without an explicit count.
    pub default_edge_count: usize,
    /// Maximum number of undo records kept, unbounded when `None`.
    pub history_limit: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            name_shifting: true,
            default_edge_count: 10,
            history_limit: None,
        }
    }
}

impl SessionConfig {
    /// Parses a configuration from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML or a field has
    /// the wrong type.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config = toml::from_str(text).map_err(ConfigError::from)?;
        Ok(config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn partial_document_keeps_defaults() {
        let config = SessionConfig::from_toml_str("tolerance = 1e-3\n").unwrap();
        assert!((config.tolerance - 1e-3).abs() < 1e-15);
        assert!(config.name_shifting);
        assert_eq!(config.default_edge_count, 10);
        assert_eq!(config.history_limit, None);
    }

    #[test]
    fn full_document() {
        let text = "tolerance = 0.01\nname_shifting = false\n\
                    default_edge_count = 4\nhistory_limit = 32\n";
        let config = SessionConfig::from_toml_str(text).unwrap();
        assert!(!config.name_shifting);
        assert_eq!(config.default_edge_count, 4);
        assert_eq!(config.history_limit, Some(32));
    }

    #[test]
    fn wrong_type_is_a_config_error() {
        let err = SessionConfig::from_toml_str("name_shifting = 3\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}

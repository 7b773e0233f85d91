//! Global configuration types for Autoflow.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls the
//! editor's history depth, notification buffering, storage location and
//! the runtime used for test runs.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the Autoflow editor.
///
/// Loaded from `~/.autoflow/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Maximum number of undo entries kept per store.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Capacity of the notification broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// SQLite file name inside the data directory.
    #[serde(default = "default_database_file")]
    pub database_file: String,

    /// Base URL of the automation runtime used for test and trigger runs.
    #[serde(default = "default_executor_url")]
    pub executor_url: String,
}

fn default_history_limit() -> usize {
    50
}

fn default_event_capacity() -> usize {
    256
}

fn default_database_file() -> String {
    "autoflow.db".to_string()
}

fn default_executor_url() -> String {
    "http://localhost:10000".to_string()
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            event_capacity: default_event_capacity(),
            database_file: default_database_file(),
            executor_url: default_executor_url(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_config_default_values() {
        let config = GlobalConfig::default();
        assert_eq!(config.history_limit, 50);
        assert_eq!(config.event_capacity, 256);
        assert_eq!(config.database_file, "autoflow.db");
        assert_eq!(config.executor_url, "http://localhost:10000");
    }

    #[test]
    fn test_global_config_deserialize_with_defaults() {
        let config: GlobalConfig = toml::from_str("").unwrap();
        assert_eq!(config.history_limit, 50);
        assert_eq!(config.database_file, "autoflow.db");
    }

    #[test]
    fn test_global_config_deserialize_with_values() {
        let toml_str = r#"
history_limit = 10
database_file = "editor.db"
"#;
        let config: GlobalConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.history_limit, 10);
        assert_eq!(config.event_capacity, 256);
        assert_eq!(config.database_file, "editor.db");
    }
}

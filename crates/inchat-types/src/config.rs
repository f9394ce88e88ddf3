//! Global configuration types for InChat.
//!
//! `InchatConfig` represents the top-level `config.toml` in the data
//! directory. Every field has a default, so an empty file is valid.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InchatConfig {
    /// How long a login session stays valid, in seconds.
    #[serde(default = "default_session_lifetime_secs")]
    pub session_lifetime_secs: u64,

    /// Minimum accepted password length.
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,

    /// Long-poll timeout when following a channel, in seconds. Writes from
    /// other processes are noticed at the end of each long-poll.
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,

    /// SQLite database file name, relative to the data directory.
    #[serde(default = "default_database_file")]
    pub database_file: String,
}

fn default_session_lifetime_secs() -> u64 {
    60 * 60 * 24
}

fn default_min_password_length() -> usize {
    9
}

fn default_wait_timeout_secs() -> u64 {
    5
}

fn default_database_file() -> String {
    "inchat.db".to_string()
}

impl Default for InchatConfig {
    fn default() -> Self {
        Self {
            session_lifetime_secs: default_session_lifetime_secs(),
            min_password_length: default_min_password_length(),
            wait_timeout_secs: default_wait_timeout_secs(),
            database_file: default_database_file(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = InchatConfig::default();
        assert_eq!(config.session_lifetime_secs, 86_400);
        assert_eq!(config.min_password_length, 9);
        assert_eq!(config.wait_timeout_secs, 5);
        assert_eq!(config.database_file, "inchat.db");
    }

    #[test]
    fn test_config_deserialize_with_defaults() {
        let config: InchatConfig = toml::from_str("").unwrap();
        assert_eq!(config.session_lifetime_secs, 86_400);
        assert_eq!(config.database_file, "inchat.db");
    }

    #[test]
    fn test_config_deserialize_with_values() {
        let toml_str = r#"
session_lifetime_secs = 3600
min_password_length = 12
wait_timeout_secs = 20
database_file = "chat.db"
"#;
        let config: InchatConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.session_lifetime_secs, 3600);
        assert_eq!(config.min_password_length, 12);
        assert_eq!(config.wait_timeout_secs, 20);
        assert_eq!(config.database_file, "chat.db");
    }
}

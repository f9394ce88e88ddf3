//! Configuration and data directory resolution for InChat.
//!
//! Reads `config.toml` from the data directory (`~/.inchat/` in production)
//! and deserializes it into [`InchatConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use inchat_types::config::InchatConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "INCHAT_DATA_DIR";

/// Load configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`InchatConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - If the file exists and parses successfully, returns the parsed config.
pub async fn load_config(data_dir: &Path) -> InchatConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return InchatConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return InchatConfig::default();
        }
    };

    match toml::from_str::<InchatConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            InchatConfig::default()
        }
    }
}

/// Resolve the data directory.
///
/// Priority: `INCHAT_DATA_DIR`, then `~/.inchat`, then `./.inchat`.
pub fn resolve_data_dir() -> PathBuf {
    data_dir_from(std::env::var_os(DATA_DIR_ENV).map(PathBuf::from))
}

fn data_dir_from(env_override: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = env_override.filter(|dir| !dir.as_os_str().is_empty()) {
        return dir;
    }
    dirs::home_dir()
        .map(|home| home.join(".inchat"))
        .unwrap_or_else(|| PathBuf::from(".inchat"))
}

/// SQLite connection URL for the configured database file.
pub fn database_url(data_dir: &Path, config: &InchatConfig) -> String {
    format!(
        "sqlite://{}?mode=rwc",
        data_dir.join(&config.database_file).display()
    )
}

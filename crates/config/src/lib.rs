use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strip_ansi_escapes::strip;
use thiserror::Error;
use ts_rs::TS;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENVS: [&str; 2] = ["BACKEND_PORT", "PORT"];
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema, TS)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    /// `0` asks the OS for a free port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Falls back to `db.sqlite` inside the asset directory.
    #[serde(default)]
    pub database_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database_url: None,
        }
    }
}

impl Config {
    pub fn from_raw(raw: &str) -> Self {
        match serde_json::from_str::<Config>(raw) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("Invalid config file, using defaults: {}", err);
                Config::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::ValidationError("host must not be empty".to_string()));
        }
        if let Some(url) = &self.database_url
            && !url.starts_with("sqlite:")
        {
            return Err(ConfigError::ValidationError(format!(
                "unsupported database url: {url}"
            )));
        }
        Ok(())
    }

    /// Environment variables win over the file.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(HOST_ENV).filter(|h| !h.trim().is_empty()) {
            self.host = host.trim().to_string();
        }
        if let Some(port) = PORT_ENVS
            .iter()
            .find_map(|name| lookup(name))
            .and_then(|raw| parse_port(&raw))
        {
            self.port = port;
        }
        if let Some(url) = lookup(DATABASE_URL_ENV).filter(|u| !u.trim().is_empty()) {
            self.database_url = Some(url.trim().to_string());
        }
        self
    }
}

/// Strips ANSI escapes some launchers leave in the variable.
pub fn parse_port(raw: &str) -> Option<u16> {
    let cleaned = String::from_utf8(strip(raw.as_bytes())).ok()?;
    cleaned.trim().parse::<u16>().ok()
}

/// Will always return config, falling back to defaults on missing/invalid files.
pub fn load_config_from_file(config_path: &Path) -> Config {
    match std::fs::read_to_string(config_path) {
        Ok(raw_config) => Config::from_raw(&raw_config),
        Err(err) => {
            if err.kind() == std::io::ErrorKind::NotFound {
                tracing::info!("No config file found at {}, using defaults", config_path.display());
            } else {
                tracing::warn!("Failed to read config file: {}", err);
            }
            Config::default()
        }
    }
}

pub fn save_config_to_file(config: &Config, config_path: &Path) -> Result<(), ConfigError> {
    config.validate()?;
    let raw_config = serde_json::to_string_pretty(config)?;
    std::fs::write(config_path, raw_config)?;
    Ok(())
}

pub fn config_schema() -> Result<String, ConfigError> {
    let schema = schemars::schema_for!(Config);
    Ok(serde_json::to_string_pretty(&schema)?)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from_file(&dir.path().join("config.json"));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let config = Config::from_raw(r#"{ "port": 8080 }"#);
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "127.0.0.1");
        assert!(config.database_url.is_none());
    }

    #[test]
    fn invalid_json_falls_back_to_defaults() {
        assert_eq!(Config::from_raw("{ not json"), Config::default());
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = Config {
            host: "0.0.0.0".to_string(),
            port: 0,
            database_url: Some("sqlite::memory:".to_string()),
        };
        save_config_to_file(&config, &path).unwrap();
        assert_eq!(load_config_from_file(&path), config);
    }

    #[test]
    fn save_rejects_non_sqlite_url() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            database_url: Some("postgres://localhost/tiles".to_string()),
            ..Config::default()
        };
        let err = save_config_to_file(&config, &dir.path().join("config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn env_overrides_take_precedence() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("HOST", "0.0.0.0"),
            ("PORT", "9000"),
            ("BACKEND_PORT", "\u{1b}[32m4000\u{1b}[0m"),
            ("DATABASE_URL", "sqlite://tiles.db"),
        ]);
        let config = Config::default().with_overrides(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 4000);
        assert_eq!(config.database_url.as_deref(), Some("sqlite://tiles.db"));
    }

    #[test]
    fn unparsable_port_keeps_file_value() {
        let config = Config {
            port: 1234,
            ..Config::default()
        }
        .with_overrides(|name| (name == "PORT").then(|| "abc".to_string()));
        assert_eq!(config.port, 1234);
    }

    #[test]
    fn schema_mentions_every_field() {
        let schema = config_schema().unwrap();
        for field in ["host", "port", "database_url"] {
            assert!(schema.contains(field), "schema missing {field}");
        }
    }
}

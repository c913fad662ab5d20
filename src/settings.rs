//! Server configuration, read from `settings.json`.
//!
//! The file path can be overridden with `TODO_SETTINGS`. `RUST_LOG` still
//! wins over `log_filter` (see telemetry.rs).

use serde::Deserialize;
use std::{env, fs, path::Path};

const SETTINGS_FILENAME: &str = "settings.json";
const SETTINGS_ENV: &str = "TODO_SETTINGS";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_binding")]
    pub tcp_socket_binding: String,
    #[serde(default = "default_port")]
    pub tcp_socket_port: u16,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Directory with the built frontend. Not served when absent.
    #[serde(default)]
    pub static_dir: Option<String>,
    pub jwt_secret: String,
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_in_minutes: u32,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_binding() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_database_path() -> String {
    "tasks.redb".to_string()
}

fn default_jwt_expiration() -> u32 {
    24 * 60
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Settings {
    /// Load from `$TODO_SETTINGS`, falling back to `settings.json` in the working directory.
    pub fn load() -> Result<Settings, SettingsError> {
        let path = env::var(SETTINGS_ENV).unwrap_or_else(|_| SETTINGS_FILENAME.to_string());
        Settings::load_from(path)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Settings, SettingsError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Settings::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Settings, SettingsError> {
        let settings: Settings = serde_json::from_str(content)?;
        if settings.jwt_secret.trim().is_empty() {
            return Err(SettingsError::EmptySecret);
        }
        Ok(settings)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.tcp_socket_binding, self.tcp_socket_port)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("cannot read settings file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse settings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("jwt_secret must not be empty")]
    EmptySecret,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let s = Settings::parse(r#"{ "jwt_secret": "s3cret" }"#).unwrap();
        assert_eq!(s.tcp_socket_binding, "0.0.0.0");
        assert_eq!(s.tcp_socket_port, 3000);
        assert_eq!(s.database_path, "tasks.redb");
        assert_eq!(s.jwt_expiration_in_minutes, 1440);
        assert!(s.static_dir.is_none());
        assert_eq!(s.bind_address(), "0.0.0.0:3000");
    }

    #[test]
    fn empty_secret_rejected() {
        let err = Settings::parse(r#"{ "jwt_secret": "  " }"#).unwrap_err();
        assert!(matches!(err, SettingsError::EmptySecret));
    }

    #[test]
    fn missing_secret_is_a_parse_error() {
        let err = Settings::parse("{}").unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Settings::load_from("/tmp/todo_server_no_such_settings.json").unwrap_err();
        assert!(err.to_string().contains("todo_server_no_such_settings.json"));
    }

    #[test]
    fn bundled_settings_file_parses() {
        let s = Settings::load_from(concat!(env!("CARGO_MANIFEST_DIR"), "/settings.json")).unwrap();
        assert_eq!(s.tcp_socket_port, 3000);
    }
}

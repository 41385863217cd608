//! Configuration management for signup.
//!
//! Loads configuration from ${SIGNUP_HOME}/config.toml with sensible defaults,
//! then applies `SIGNUP_*` environment overrides.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Returns the default config template with comments.
///
/// This is embedded from default_config.toml at compile time.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

pub mod paths {
    //! Path resolution for signup configuration and log directories.
    //!
    //! SIGNUP_HOME resolution order:
    //! 1. SIGNUP_HOME environment variable (if set)
    //! 2. ~/.config/signup (default)

    use std::path::PathBuf;

    /// Returns the signup home directory.
    pub fn signup_home() -> PathBuf {
        if let Ok(home) = std::env::var("SIGNUP_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".signup"),
            |h| h.join(".config").join("signup"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        signup_home().join("config.toml")
    }

    /// Returns the path to the logs directory.
    pub fn logs_dir() -> PathBuf {
        signup_home().join("logs")
    }
}

/// Account backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 30,
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Google OAuth client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub authorize_url: String,
    pub token_url: String,
    pub redirect_host: String,
    pub redirect_port: u16,
    pub redirect_path: String,
    pub callback_timeout_secs: u64,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: "432933608775-6iu1v0m5icdc8mh8it0gcovppo6625kj.apps.googleusercontent.com"
                .to_string(),
            client_secret: None,
            authorize_url: crate::oauth::google::AUTHORIZE_URL.to_string(),
            token_url: crate::oauth::google::TOKEN_URL.to_string(),
            redirect_host: "127.0.0.1".to_string(),
            redirect_port: 8085,
            redirect_path: "/oauth2callback".to_string(),
            callback_timeout_secs: 120,
        }
    }
}

impl GoogleConfig {
    /// Loopback redirect URI registered with the OAuth client.
    pub fn redirect_uri(&self) -> String {
        format!(
            "http://{}:{}{}",
            self.redirect_host, self.redirect_port, self.redirect_path
        )
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }
}

/// How registration error bodies map onto form fields.
///
/// The backend's error schema is not fixed, so the field names live here
/// instead of in the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerErrorMapping {
    pub duplicate_field: String,
    pub duplicate_message: String,
    pub message_field: String,
    pub fallback_message: String,
}

impl Default for ServerErrorMapping {
    fn default() -> Self {
        Self {
            duplicate_field: "email".to_string(),
            duplicate_message: "This email is already registered".to_string(),
            message_field: "message".to_string(),
            fallback_message: "Registration failed".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    pub errors: ServerErrorMapping,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub google: GoogleConfig,
    pub registration: RegistrationConfig,
}

impl Config {
    /// Loads configuration from the default config path and applies
    /// environment overrides.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&paths::config_path())?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Applies `SIGNUP_*` overrides using the given lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("SIGNUP_BACKEND_URL") {
            self.backend.base_url = url;
        }
        if let Some(id) = non_empty("SIGNUP_GOOGLE_CLIENT_ID") {
            self.google.client_id = id;
        }
        if let Some(url) = non_empty("SIGNUP_GOOGLE_AUTHORIZE_URL") {
            self.google.authorize_url = url;
        }
        if let Some(url) = non_empty("SIGNUP_GOOGLE_TOKEN_URL") {
            self.google.token_url = url;
        }
    }

    /// Creates a default config file at the given path.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Writes config content to a file, creating parent directories as needed.
    /// Uses atomic write (temp file + rename) to prevent corruption.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

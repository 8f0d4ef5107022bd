//! Service configuration (file + environment) and the user's own overrides.
//!
//! `GatewayConfig` is the deployment-level layer: defaults, then an optional
//! `config/gateway.toml`, then `VISAGE_*` environment variables.
//! `UserConfig` is the per-user layer (`user_config.toml`): users supply
//! their own completion API key without touching the service config or the
//! codebase.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Deployment configuration for the visage service.
///
/// | Env | Default | Description |
/// |-----|---------|-------------|
/// | VISAGE_PORT | 8010 | HTTP port for the gateway add-on. |
/// | VISAGE_STORAGE_PATH | ./data | Base directory for the sled store. |
/// | VISAGE_CHAT_ENDPOINT | OpenRouter chat completions | Completion endpoint URL. |
/// | VISAGE_AUTH_ENDPOINT | http://127.0.0.1:8900/admin | Admin auth service root. |
/// | VISAGE_DEFAULT_MODEL | meta-llama/llama-3.3-70b-instruct | Model when a persona names none. |
/// | VISAGE_REQUEST_TIMEOUT_SECS | 60 | Completion request timeout. |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Application identity shown in logs.
    pub app_name: String,
    /// HTTP port for the gateway add-on.
    pub port: u16,
    /// Base directory for the sled store (the database lives in a
    /// subdirectory of this path).
    pub storage_path: String,
    /// Chat-completion endpoint URL.
    pub chat_endpoint: String,
    /// Admin authentication service root URL.
    pub auth_endpoint: String,
    /// Model used when neither a stored persona nor its preset names one.
    pub default_model: String,
    /// Completion request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl GatewayConfig {
    /// Loads config from file and environment. Precedence: env `VISAGE_CONFIG`
    /// path > `config/gateway.toml` > defaults, with `VISAGE_*` environment
    /// variables layered on top.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("VISAGE_CONFIG").unwrap_or_else(|_| "config/gateway".to_string());
        let builder = config::Config::builder()
            .set_default("app_name", "Visage Gateway")?
            .set_default("port", 8010_i64)?
            .set_default("storage_path", "./data")?
            .set_default(
                "chat_endpoint",
                "https://openrouter.ai/api/v1/chat/completions",
            )?
            .set_default("auth_endpoint", "http://127.0.0.1:8900/admin")?
            .set_default("default_model", "meta-llama/llama-3.3-70b-instruct")?
            .set_default("request_timeout_secs", 60_i64)?;

        let path = Path::new(&config_path);
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("VISAGE").separator("__"))
            .build()?;

        built.try_deserialize()
    }
}

/// Per-user configuration stored in `user_config.toml`: the user's own
/// completion API key and optional model/endpoint overrides.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    /// The user's completion API key (e.g. an OpenRouter key).
    #[serde(default)]
    pub api_key: Option<String>,

    /// Preferred completion model, overriding the service default.
    #[serde(default)]
    pub model: Option<String>,

    /// Alternative completion endpoint, overriding the service default.
    #[serde(default)]
    pub chat_endpoint: Option<String>,
}

impl UserConfig {
    /// Default path for the user configuration file.
    pub fn default_path() -> PathBuf {
        PathBuf::from("user_config.toml")
    }

    /// Loads the user configuration, returning defaults when the file does
    /// not exist.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_from_path(&Self::default_path())
    }

    /// Loads the user configuration from a specific path.
    pub fn load_from_path(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Saves the user configuration to the default path.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.save_to_path(&Self::default_path())
    }

    /// Saves the user configuration to a specific path.
    pub fn save_to_path(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// API key with environment fallbacks.
    /// Priority: `user_config.toml` > `VISAGE_API_KEY` > `OPENROUTER_API_KEY`.
    pub fn get_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("VISAGE_API_KEY").ok())
            .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
            .filter(|s| !s.trim().is_empty())
    }

    /// Model override with environment fallback (`VISAGE_MODEL`).
    pub fn get_model(&self) -> Option<String> {
        self.model
            .clone()
            .or_else(|| std::env::var("VISAGE_MODEL").ok())
            .filter(|s| !s.trim().is_empty())
    }

    /// Endpoint override with environment fallback (`VISAGE_CHAT_ENDPOINT`).
    pub fn get_chat_endpoint(&self) -> Option<String> {
        self.chat_endpoint
            .clone()
            .or_else(|| std::env::var("VISAGE_CHAT_ENDPOINT").ok())
            .filter(|s| !s.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_config_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_config.toml");
        let config = UserConfig {
            api_key: Some("sk-or-v1-test".into()),
            model: Some("meta-llama/llama-3.3-70b-instruct".into()),
            chat_endpoint: None,
        };
        config.save_to_path(&path).unwrap();

        let loaded = UserConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded.api_key.as_deref(), Some("sk-or-v1-test"));
        assert_eq!(
            loaded.model.as_deref(),
            Some("meta-llama/llama-3.3-70b-instruct")
        );
        assert!(loaded.chat_endpoint.is_none());
    }

    #[test]
    fn user_config_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = UserConfig::load_from_path(&dir.path().join("nope.toml")).unwrap();
        assert!(loaded.api_key.is_none());
        assert!(loaded.model.is_none());
    }
}

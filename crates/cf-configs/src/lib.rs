//! # cf-configs
//!
//! Layered settings for classfeed: compiled defaults, then an optional
//! `config/classfeed.toml`, then `CLASSFEED__*` environment variables
//! (e.g. `CLASSFEED__DATABASE__URL`).

use std::path::Path;

use config::{Config, Environment, File, Map};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

pub const ENV_PREFIX: &str = "CLASSFEED";
pub const DEFAULT_CONFIG_FILE: &str = "config/classfeed";
/// Signing secret used when none is configured. Fine for local runs only.
pub const DEV_TOKEN_SECRET: &str = "classfeed-dev-secret";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub storage: StorageSettings,
    pub auth: AuthSettings,
    pub feed: FeedSettings,
    pub log: LogSettings,
}

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    /// A sqlx SQLite url, or `memory` for the in-process store
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseSettings {
    pub fn is_memory(&self) -> bool {
        self.url == "memory"
    }
}

#[derive(Debug, Deserialize)]
pub struct StorageSettings {
    pub upload_dir: String,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Deserialize)]
pub struct AuthSettings {
    #[serde(deserialize_with = "secret_from_string")]
    pub token_secret: SecretString,
    pub token_ttl_secs: i64,
}

impl AuthSettings {
    pub fn uses_dev_secret(&self) -> bool {
        self.token_secret.expose_secret() == DEV_TOKEN_SECRET
    }
}

#[derive(Debug, Deserialize)]
pub struct FeedSettings {
    /// Total attempts per write, the first one included
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct LogSettings {
    /// `EnvFilter` directive; `RUST_LOG` wins when set
    pub filter: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

fn secret_from_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SecretString, D::Error> {
    String::deserialize(deserializer).map(SecretString::from)
}

impl Settings {
    /// Loads `.env`, then the default file and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(err) if err.not_found() => {}
            Err(err) => tracing::warn!(error = %err, "ignoring unreadable .env"),
        }
        Self::from_sources(Path::new(DEFAULT_CONFIG_FILE), None)
    }

    /// `env` replaces the process environment when given.
    pub fn from_sources(file: &Path, env: Option<Map<String, String>>) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.url", "sqlite://classfeed.db")?
            .set_default("database.max_connections", 5)?
            .set_default("storage.upload_dir", "./data/uploads")?
            .set_default("storage.max_upload_bytes", 25 * 1024 * 1024)?
            .set_default("auth.token_secret", DEV_TOKEN_SECRET)?
            .set_default("auth.token_ttl_secs", 7 * 24 * 3600)?
            .set_default("feed.max_attempts", 5)?
            .set_default("feed.retry_backoff_ms", 5)?
            .set_default("log.filter", "info")?
            .set_default("log.format", "pretty")?
            .add_source(File::from(file).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.token_secret.expose_secret().is_empty() {
            return Err(ConfigError::Invalid("auth.token_secret must not be empty".into()));
        }
        if self.auth.token_ttl_secs <= 0 {
            return Err(ConfigError::Invalid("auth.token_ttl_secs must be positive".into()));
        }
        if self.feed.max_attempts == 0 {
            return Err(ConfigError::Invalid("feed.max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

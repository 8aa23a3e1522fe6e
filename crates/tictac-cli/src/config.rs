//! Gateway Configuration Management
//!
//! Configuration is layered with figment, lowest priority first:
//! - Default values
//! - A TOML file (`tictac.toml` in the working directory, or `--config`)
//! - Environment variables prefixed with `TICTAC_`, nested with `__`
//!   (for example `TICTAC_GAME__WIN_POLICY=verify`)
//!
//! Command line flags are applied last by `main`.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tictac_core::{GameConfig, Identity, StorageConfig, TictacConfig, UserId};
use tictac_runtime::UserSeed;

pub const DEFAULT_CONFIG_FILE: &str = "tictac.toml";
pub const ENV_PREFIX: &str = "TICTAC_";

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub game: GameConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    /// Accounts accepted by the gateway, each with its bearer token
    pub users: Vec<UserConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    pub id: u64,
    pub username: String,
    pub token: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load defaults, then the config file, then the environment
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let figment = Figment::new().merge(Serialized::defaults(Self::default()));
        let figment = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::FileSystem(format!(
                        "Config file {} does not exist",
                        path.display()
                    )));
                }
                figment.merge(Toml::file(path))
            }
            None => figment.merge(Toml::file(DEFAULT_CONFIG_FILE)),
        };
        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment
            .extract()
            .map_err(|e| ConfigError::Loading(format!("Failed to load configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        self.to_runtime()
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        let mut tokens = HashSet::new();
        for user in &self.users {
            if user.username.trim().is_empty() {
                return Err(ConfigError::Validation(format!("User {} has an empty username", user.id)));
            }
            if user.token.trim().is_empty() {
                return Err(ConfigError::Validation(format!("User {} has an empty token", user.username)));
            }
            if !ids.insert(user.id) {
                return Err(ConfigError::Validation(format!("Duplicate user id {}", user.id)));
            }
            if !names.insert(user.username.as_str()) {
                return Err(ConfigError::Validation(format!("Duplicate username {}", user.username)));
            }
            if !tokens.insert(user.token.trim()) {
                return Err(ConfigError::Validation(format!(
                    "User {} shares a token with another user",
                    user.username
                )));
            }
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|e| ConfigError::Validation(format!("Invalid bind address {}: {}", self.server.bind, e)))
    }

    pub fn to_runtime(&self) -> TictacConfig {
        TictacConfig {
            game: self.game.clone(),
            storage: self.storage.clone(),
        }
    }

    pub fn seeds(&self) -> Vec<UserSeed> {
        self.users
            .iter()
            .map(|user| {
                let identity = Identity::new(UserId::new(user.id), user.username.clone())
                    .with_roles(user.roles.iter().cloned());
                UserSeed::new(identity, user.token.trim())
            })
            .collect()
    }

    /// Example configuration file content
    pub fn example_config() -> Result<String, ConfigError> {
        let example = AppConfig {
            server: ServerConfig {
                bind: "0.0.0.0:8080".to_string(),
            },
            game: GameConfig {
                challenge_ttl_secs: Some(3600),
                ..GameConfig::default()
            },
            storage: StorageConfig::in_dir("./data"),
            logging: LoggingConfig::default(),
            users: vec![
                UserConfig {
                    id: 1,
                    username: "alice".to_string(),
                    token: "change-me-alice".to_string(),
                    roles: vec!["admin".to_string()],
                },
                UserConfig {
                    id: 2,
                    username: "bob".to_string(),
                    token: "change-me-bob".to_string(),
                    roles: Vec::new(),
                },
            ],
        };
        toml::to_string_pretty(&example)
            .map_err(|e| ConfigError::Serialization(format!("Failed to serialize example config: {}", e)))
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

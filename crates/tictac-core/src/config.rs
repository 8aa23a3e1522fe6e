//! Centralized Configuration Management
//!
//! Configuration structures shared by the runtime and the binary.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{GameError, GameResult};

// ----------------------------------------------------------------------------
// Game Configuration
// ----------------------------------------------------------------------------

/// How the engine decides whether a submitted move ended the game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinPolicy {
    /// Accept the winner declared by the submitting client
    #[default]
    TrustClient,
    /// Recompute the winner from the board and require a single new mark
    Verify,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub win_policy: WinPolicy,
    /// Pending challenges older than this are discarded by the sweeper
    pub challenge_ttl_secs: Option<u64>,
    /// How often the gateway runs the stale challenge sweep
    pub sweep_interval_secs: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            win_policy: WinPolicy::TrustClient,
            challenge_ttl_secs: None,
            sweep_interval_secs: 60,
        }
    }
}

impl GameConfig {
    /// Configuration with server-side winner verification
    pub fn hardened() -> Self {
        Self {
            win_policy: WinPolicy::Verify,
            challenge_ttl_secs: Some(24 * 60 * 60),
            sweep_interval_secs: 60,
        }
    }
}

// ----------------------------------------------------------------------------
// Storage Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the snapshot files; `None` keeps everything in memory
    pub data_dir: Option<PathBuf>,
    pub sessions_file: String,
    pub stats_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            sessions_file: "sessions.json".to_string(),
            stats_file: "users.json".to_string(),
        }
    }
}

impl StorageConfig {
    /// Nothing is written to disk
    pub fn volatile() -> Self {
        Self::default()
    }

    /// Durable snapshots under `dir`
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(dir.into()),
            ..Self::default()
        }
    }

    pub fn is_durable(&self) -> bool {
        self.data_dir.is_some()
    }

    pub fn sessions_path(&self) -> Option<PathBuf> {
        self.data_dir.as_deref().map(|dir| dir.join(&self.sessions_file))
    }

    pub fn stats_path(&self) -> Option<PathBuf> {
        self.data_dir.as_deref().map(|dir| dir.join(&self.stats_file))
    }
}

// ----------------------------------------------------------------------------
// Aggregate Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TictacConfig {
    pub game: GameConfig,
    pub storage: StorageConfig,
}

impl TictacConfig {
    /// In-memory configuration for tests
    pub fn testing() -> Self {
        Self::default()
    }

    pub fn with_data_dir(mut self, dir: &Path) -> Self {
        self.storage.data_dir = Some(dir.to_path_buf());
        self
    }

    pub fn validate(&self) -> GameResult<()> {
        if self.game.challenge_ttl_secs == Some(0) {
            return Err(GameError::config_error(
                "challenge_ttl_secs must be greater than zero",
            ));
        }
        if self.game.sweep_interval_secs == 0 {
            return Err(GameError::config_error(
                "sweep_interval_secs must be greater than zero",
            ));
        }
        if self.storage.sessions_file.is_empty() || self.storage.stats_file.is_empty() {
            return Err(GameError::config_error("snapshot file names cannot be empty"));
        }
        if self.storage.sessions_file == self.storage.stats_file {
            return Err(GameError::config_error(
                "sessions and stats must live in different files",
            ));
        }
        Ok(())
    }
}

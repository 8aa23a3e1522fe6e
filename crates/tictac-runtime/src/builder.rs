//! Runtime Builder API
//!
//! Wires the session store, user directory, identity resolver and
//! coordinator once per process, and owns the background sweep task.

use std::sync::Arc;
use std::time::Duration;

use tictac_core::{
    GameResult, Identity, IdentityResolver, SessionStore, SystemTimeSource, TictacConfig,
    TimeSource, UserDirectory,
};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::coordinator::SessionCoordinator;
use crate::identity::StaticTokenResolver;
use crate::storage::{DurableSessionStore, DurableUserDirectory};

/// A user known at startup together with the token that authenticates them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSeed {
    pub identity: Identity,
    pub token: String,
}

impl UserSeed {
    pub fn new(identity: Identity, token: impl Into<String>) -> Self {
        Self {
            identity,
            token: token.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Runtime Builder
// ----------------------------------------------------------------------------

pub struct RuntimeBuilder {
    config: TictacConfig,
    users: Vec<UserSeed>,
    time_source: Arc<dyn TimeSource>,
    resolver: Option<Arc<dyn IdentityResolver>>,
    directory: Option<Arc<dyn UserDirectory>>,
    store: Option<Arc<dyn SessionStore>>,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config: TictacConfig::default(),
            users: Vec::new(),
            time_source: Arc::new(SystemTimeSource),
            resolver: None,
            directory: None,
            store: None,
        }
    }

    pub fn with_config(mut self, config: TictacConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a user in the directory and the token table
    pub fn with_user(mut self, seed: UserSeed) -> Self {
        self.users.push(seed);
        self
    }

    pub fn with_users(mut self, seeds: impl IntoIterator<Item = UserSeed>) -> Self {
        self.users.extend(seeds);
        self
    }

    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    /// Replace the token table built from seeded users
    pub fn with_identity_resolver(mut self, resolver: Arc<dyn IdentityResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_user_directory(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Open storage and assemble the coordinator
    pub async fn build(self) -> GameResult<TictacRuntime> {
        self.config.validate()?;
        info!("Building tictac runtime");

        let store: Arc<dyn SessionStore> = match self.store {
            Some(store) => store,
            None => match self.config.storage.sessions_path() {
                Some(path) => Arc::new(
                    DurableSessionStore::open_with_time_source(path, self.time_source.clone()).await?,
                ),
                None => Arc::new(DurableSessionStore::with_time_source(self.time_source.clone())),
            },
        };

        let directory: Arc<dyn UserDirectory> = match self.directory {
            Some(directory) => {
                if !self.users.is_empty() {
                    warn!("Custom user directory supplied, seeded users only feed the token table");
                }
                directory
            }
            None => {
                let directory = match self.config.storage.stats_path() {
                    Some(path) => DurableUserDirectory::open(path).await?,
                    None => DurableUserDirectory::in_memory(),
                };
                for seed in &self.users {
                    directory
                        .register_user(seed.identity.user_id, seed.identity.username.clone())
                        .await?;
                }
                Arc::new(directory)
            }
        };

        let resolver: Arc<dyn IdentityResolver> = match self.resolver {
            Some(resolver) => resolver,
            None => Arc::new(
                self.users
                    .iter()
                    .map(|seed| (seed.token.clone(), seed.identity.clone()))
                    .collect::<StaticTokenResolver>(),
            ),
        };

        let coordinator = Arc::new(SessionCoordinator::new(
            resolver,
            store,
            directory,
            self.config.game.clone(),
        ));
        info!(
            "Runtime ready ({} seeded users, {} storage)",
            self.users.len(),
            if self.config.storage.is_durable() {
                "durable"
            } else {
                "volatile"
            }
        );

        Ok(TictacRuntime {
            coordinator,
            config: self.config,
            time_source: self.time_source,
            sweeper: None,
        })
    }
}

// ----------------------------------------------------------------------------
// Runtime Handle
// ----------------------------------------------------------------------------

/// Handle to an assembled runtime
pub struct TictacRuntime {
    coordinator: Arc<SessionCoordinator>,
    config: TictacConfig,
    time_source: Arc<dyn TimeSource>,
    sweeper: Option<JoinHandle<()>>,
}

impl TictacRuntime {
    pub fn coordinator(&self) -> Arc<SessionCoordinator> {
        self.coordinator.clone()
    }

    pub fn config(&self) -> &TictacConfig {
        &self.config
    }

    /// Start the periodic stale-challenge sweep if a TTL is configured
    pub fn start_sweeper(&mut self) -> bool {
        if self.sweeper.is_some() || self.config.game.challenge_ttl_secs.is_none() {
            return false;
        }
        let coordinator = self.coordinator.clone();
        let time_source = self.time_source.clone();
        let period = Duration::from_secs(self.config.game.sweep_interval_secs);

        self.sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = coordinator.sweep_stale_challenges(time_source.now()).await {
                    error!("Stale challenge sweep failed: {}", e);
                }
            }
        }));
        info!("Stale challenge sweep every {:?}", period);
        true
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn shutdown(&mut self) {
        if let Some(task) = self.sweeper.take() {
            task.abort();
        }
        info!("Runtime stopped");
    }
}

impl Drop for TictacRuntime {
    fn drop(&mut self) {
        if let Some(task) = self.sweeper.take() {
            task.abort();
        }
    }
}

//! Durable user directory
//!
//! Username lookup and the per-user win/loss/draw table. Stats mutations are
//! write-before-acknowledge like the session table.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tictac_core::{
    DirectoryEntry, FinishedGame, GameError, GameOutcome, GameResult, UserDirectory, UserId,
    UserStats,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::snapshot::SnapshotFile;

/// One row of the stats table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: UserId,
    pub username: String,
    #[serde(default)]
    pub stats: UserStats,
}

pub struct DurableUserDirectory {
    users: Mutex<BTreeMap<UserId, UserRecord>>,
    snapshot: Option<SnapshotFile<Vec<UserRecord>>>,
}

impl DurableUserDirectory {
    pub fn in_memory() -> Self {
        Self {
            users: Mutex::new(BTreeMap::new()),
            snapshot: None,
        }
    }

    pub async fn open(path: impl Into<PathBuf>) -> GameResult<Self> {
        let snapshot: SnapshotFile<Vec<UserRecord>> = SnapshotFile::new(path);
        let users: BTreeMap<_, _> = snapshot
            .load()
            .await?
            .unwrap_or_default()
            .into_iter()
            .map(|record: UserRecord| (record.user_id, record))
            .collect();
        info!(
            "User directory opened at {} with {} users",
            snapshot.path().display(),
            users.len()
        );
        Ok(Self {
            users: Mutex::new(users),
            snapshot: Some(snapshot),
        })
    }

    /// Add a user or rename an existing one; existing stats are kept
    pub async fn register_user(&self, user_id: UserId, username: impl Into<String>) -> GameResult<()> {
        let username = username.into();
        self.mutate(|users| {
            users
                .entry(user_id)
                .and_modify(|record| record.username = username.clone())
                .or_insert_with(|| UserRecord {
                    user_id,
                    username: username.clone(),
                    stats: UserStats::default(),
                });
            Ok(())
        })
        .await
    }

    pub async fn records(&self) -> Vec<UserRecord> {
        self.users.lock().await.values().cloned().collect()
    }

    /// Apply `change` to a copy of the table, flush, then publish the copy
    async fn mutate<F>(&self, change: F) -> GameResult<()>
    where
        F: FnOnce(&mut BTreeMap<UserId, UserRecord>) -> GameResult<()> + Send,
    {
        let mut users = self.users.lock().await;
        let mut next = users.clone();
        change(&mut next)?;

        if let Some(snapshot) = &self.snapshot {
            let rows: Vec<UserRecord> = next.values().cloned().collect();
            snapshot.store(&rows).await.map_err(|e| {
                error!("Failed to flush user stats: {}", e);
                e
            })?;
        }
        *users = next;
        Ok(())
    }

    async fn apply_outcomes(&self, outcomes: Vec<(UserId, GameOutcome)>) -> GameResult<()> {
        self.mutate(move |users| {
            // Validate every row before touching any so the write is all-or-nothing
            if let Some((missing, _)) = outcomes.iter().find(|(id, _)| !users.contains_key(id)) {
                return Err(GameError::user_not_found(*missing));
            }
            for (user_id, outcome) in &outcomes {
                if let Some(record) = users.get_mut(user_id) {
                    record.stats.apply(*outcome);
                }
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl UserDirectory for DurableUserDirectory {
    async fn username_of(&self, user_id: UserId) -> GameResult<String> {
        self.users
            .lock()
            .await
            .get(&user_id)
            .map(|record| record.username.clone())
            .ok_or_else(|| GameError::user_not_found(user_id))
    }

    async fn increment_wins(&self, user_id: UserId) -> GameResult<()> {
        self.apply_outcomes(vec![(user_id, GameOutcome::Win)]).await
    }

    async fn increment_losses(&self, user_id: UserId) -> GameResult<()> {
        self.apply_outcomes(vec![(user_id, GameOutcome::Loss)]).await
    }

    async fn increment_draws(&self, user_ids: &[UserId]) -> GameResult<()> {
        let outcomes = user_ids.iter().map(|id| (*id, GameOutcome::Draw)).collect();
        self.apply_outcomes(outcomes).await
    }

    async fn reset_stats(&self, user_id: UserId) -> GameResult<()> {
        self.mutate(|users| {
            let record = users
                .get_mut(&user_id)
                .ok_or_else(|| GameError::user_not_found(user_id))?;
            record.stats = UserStats::default();
            Ok(())
        })
        .await?;
        debug!("Reset stats for user {}", user_id);
        Ok(())
    }

    async fn get_stats(&self, user_id: UserId) -> GameResult<UserStats> {
        self.users
            .lock()
            .await
            .get(&user_id)
            .map(|record| record.stats)
            .ok_or_else(|| GameError::user_not_found(user_id))
    }

    async fn entries(&self) -> GameResult<Vec<DirectoryEntry>> {
        Ok(self
            .users
            .lock()
            .await
            .values()
            .map(|record| DirectoryEntry {
                user_id: record.user_id,
                username: record.username.clone(),
            })
            .collect())
    }

    /// Both players are committed in one write
    async fn record_game(&self, game: FinishedGame) -> GameResult<()> {
        self.apply_outcomes(game.outcomes().to_vec()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn directory() -> DurableUserDirectory {
        let directory = DurableUserDirectory::in_memory();
        directory.register_user(UserId::new(1), "alice").await.unwrap();
        directory.register_user(UserId::new(2), "bob").await.unwrap();
        directory
    }

    #[tokio::test]
    async fn test_lookup_and_missing_user() {
        let directory = directory().await;
        assert_eq!(directory.username_of(UserId::new(2)).await.unwrap(), "bob");
        assert!(matches!(
            directory.username_of(UserId::new(7)).await,
            Err(GameError::UserNotFound { .. })
        ));
        assert_eq!(directory.entries().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_record_game_updates_both_players() {
        let directory = directory().await;
        directory
            .record_game(FinishedGame::Decisive {
                winner: UserId::new(1),
                loser: UserId::new(2),
            })
            .await
            .unwrap();
        directory
            .record_game(FinishedGame::Draw {
                players: [UserId::new(1), UserId::new(2)],
            })
            .await
            .unwrap();

        let alice = directory.get_stats(UserId::new(1)).await.unwrap();
        let bob = directory.get_stats(UserId::new(2)).await.unwrap();
        assert_eq!((alice.wins, alice.losses, alice.draws), (1, 0, 1));
        assert_eq!((bob.wins, bob.losses, bob.draws), (0, 1, 1));
    }

    #[tokio::test]
    async fn test_unknown_player_aborts_whole_update() {
        let directory = directory().await;
        let err = directory
            .increment_draws(&[UserId::new(1), UserId::new(9)])
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::UserNotFound { .. }));
        assert_eq!(directory.get_stats(UserId::new(1)).await.unwrap().draws, 0);
    }

    #[tokio::test]
    async fn test_reregister_keeps_stats_and_reset_zeroes() {
        let directory = directory().await;
        directory.increment_wins(UserId::new(1)).await.unwrap();
        directory.register_user(UserId::new(1), "alice2").await.unwrap();
        assert_eq!(directory.get_stats(UserId::new(1)).await.unwrap().wins, 1);
        assert_eq!(directory.username_of(UserId::new(1)).await.unwrap(), "alice2");

        directory.reset_stats(UserId::new(1)).await.unwrap();
        assert_eq!(
            directory.get_stats(UserId::new(1)).await.unwrap(),
            UserStats::default()
        );
    }

    #[tokio::test]
    async fn test_stats_survive_reopen() {
        let dir = std::env::temp_dir().join(format!("tictac-users-{}", uuid::Uuid::new_v4().simple()));
        let path = dir.join("users.json");
        {
            let directory = DurableUserDirectory::open(&path).await.unwrap();
            directory.register_user(UserId::new(1), "alice").await.unwrap();
            directory.increment_losses(UserId::new(1)).await.unwrap();
        }
        let directory = DurableUserDirectory::open(&path).await.unwrap();
        assert_eq!(directory.get_stats(UserId::new(1)).await.unwrap().losses, 1);
        let _ = std::fs::remove_dir_all(dir);
    }
}

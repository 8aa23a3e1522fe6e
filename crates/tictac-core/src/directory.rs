//! User directory contract
//!
//! The external user store owns usernames and the aggregate win/loss/draw
//! counters. The game engine mutates the counters through this trait and the
//! notifier addresses users by the usernames it resolves.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::GameResult;
use crate::types::UserId;

/// Aggregate results for one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserStats {
    pub wins: u64,
    pub losses: u64,
    pub draws: u64,
}

impl UserStats {
    /// Total number of recorded games
    pub fn games(&self) -> u64 {
        self.wins + self.losses + self.draws
    }

    pub fn apply(&mut self, outcome: GameOutcome) {
        match outcome {
            GameOutcome::Win => self.wins += 1,
            GameOutcome::Loss => self.losses += 1,
            GameOutcome::Draw => self.draws += 1,
        }
    }
}

/// One result from the point of view of a single player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameOutcome {
    Win,
    Loss,
    Draw,
}

/// Outcome of a finished two-player session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishedGame {
    Decisive { winner: UserId, loser: UserId },
    Draw { players: [UserId; 2] },
}

impl FinishedGame {
    /// Per-player outcomes, each player exactly once
    pub fn outcomes(&self) -> [(UserId, GameOutcome); 2] {
        match *self {
            FinishedGame::Decisive { winner, loser } => {
                [(winner, GameOutcome::Win), (loser, GameOutcome::Loss)]
            }
            FinishedGame::Draw { players: [a, b] } => {
                [(a, GameOutcome::Draw), (b, GameOutcome::Draw)]
            }
        }
    }
}

/// A user known to the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub user_id: UserId,
    pub username: String,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolve the username used for per-identity notifications
    async fn username_of(&self, user_id: UserId) -> GameResult<String>;

    async fn increment_wins(&self, user_id: UserId) -> GameResult<()>;

    async fn increment_losses(&self, user_id: UserId) -> GameResult<()>;

    async fn increment_draws(&self, user_ids: &[UserId]) -> GameResult<()>;

    async fn reset_stats(&self, user_id: UserId) -> GameResult<()>;

    async fn get_stats(&self, user_id: UserId) -> GameResult<UserStats>;

    /// Every user the directory knows about
    async fn entries(&self) -> GameResult<Vec<DirectoryEntry>>;

    /// Record a finished game; implementations may commit both players at once
    async fn record_game(&self, game: FinishedGame) -> GameResult<()> {
        match game {
            FinishedGame::Decisive { winner, loser } => {
                self.increment_wins(winner).await?;
                self.increment_losses(loser).await
            }
            FinishedGame::Draw { players } => self.increment_draws(&players).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcomes_cover_both_players_once() {
        let decisive = FinishedGame::Decisive {
            winner: UserId::new(1),
            loser: UserId::new(2),
        };
        let draw = FinishedGame::Draw {
            players: [UserId::new(1), UserId::new(2)],
        };

        for game in [decisive, draw] {
            let mut total = 0;
            for (_, outcome) in game.outcomes() {
                let mut stats = UserStats::default();
                stats.apply(outcome);
                total += stats.games();
            }
            assert_eq!(total, 2);
        }
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome: GameOutcome = serde_json::from_str("\"draw\"").unwrap();
        assert_eq!(outcome, GameOutcome::Draw);
    }
}

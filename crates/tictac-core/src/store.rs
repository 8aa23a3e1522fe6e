//! Session store contract
//!
//! The store exclusively owns `GameSession` rows. Every state-changing call
//! must be durable before it returns `Ok`; a failed call leaves the stored row
//! exactly as it was.

use async_trait::async_trait;

use crate::errors::GameResult;
use crate::session::{GameSession, MoveRecord, SessionStatus};
use crate::types::{SessionId, Timestamp, UserId};

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a pending session with an empty board and X to move
    async fn create_session(
        &self,
        player_x_id: UserId,
        player_o_id: UserId,
    ) -> GameResult<GameSession>;

    async fn get_session(&self, id: SessionId) -> GameResult<GameSession>;

    /// Non-finished sessions involving `user_id`, most recently moved first
    async fn list_sessions_for_user(&self, user_id: UserId) -> GameResult<Vec<GameSession>>;

    /// Overwrite board/turn/status/winner and refresh `last_move_at`
    async fn apply_move(&self, id: SessionId, record: MoveRecord) -> GameResult<GameSession>;

    async fn set_status(&self, id: SessionId, status: SessionStatus) -> GameResult<GameSession>;

    /// Reset a finished session to a fresh playing game on the same id
    async fn clear_for_rematch(&self, id: SessionId) -> GameResult<GameSession>;

    /// Put back a row exactly as it was read, undoing a later write
    ///
    /// The players of `previous` must match the stored row.
    async fn restore_session(&self, previous: GameSession) -> GameResult<GameSession>;

    /// Discard a session, returning the removed row
    async fn delete_session(&self, id: SessionId) -> GameResult<GameSession>;

    /// Whether any playing session references `user_id`
    async fn has_playing_session(&self, user_id: UserId) -> GameResult<bool>;

    /// Pending sessions whose `last_move_at` is strictly before `cutoff`
    async fn pending_sessions_before(&self, cutoff: Timestamp) -> GameResult<Vec<GameSession>>;
}

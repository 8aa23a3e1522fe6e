//! Durable session table
//!
//! `DurableSessionStore` is the only writer of `GameSession` rows. Each
//! mutation runs against a copy of the row, is flushed to the snapshot file
//! and only then becomes visible to readers.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tictac_core::{
    GameError, GameResult, GameSession, MoveRecord, SessionId, SessionStatus, SessionStore,
    SystemTimeSource, TimeSource, Timestamp, UserId,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::snapshot::SnapshotFile;

/// On-disk form of the session table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SessionSnapshot {
    next_id: u64,
    sessions: Vec<GameSession>,
}

#[derive(Debug, Clone)]
struct SessionTable {
    next_id: SessionId,
    sessions: BTreeMap<SessionId, GameSession>,
}

impl Default for SessionTable {
    fn default() -> Self {
        Self {
            next_id: SessionId::new(1),
            sessions: BTreeMap::new(),
        }
    }
}

impl SessionTable {
    fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        let sessions: BTreeMap<_, _> = snapshot
            .sessions
            .into_iter()
            .map(|session| (session.id, session))
            .collect();
        // Never reuse an id, even if the counter on disk lags behind the rows
        let highest = sessions.keys().next_back().map(|id| id.value()).unwrap_or(0);
        Self {
            next_id: SessionId::new(snapshot.next_id.max(highest + 1)),
            sessions,
        }
    }

    fn to_snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            next_id: self.next_id.value(),
            sessions: self.sessions.values().cloned().collect(),
        }
    }
}

// ----------------------------------------------------------------------------
// Durable Session Store
// ----------------------------------------------------------------------------

pub struct DurableSessionStore<T: TimeSource = SystemTimeSource> {
    table: Mutex<SessionTable>,
    snapshot: Option<SnapshotFile<SessionSnapshot>>,
    time_source: T,
}

impl DurableSessionStore<SystemTimeSource> {
    /// Volatile store, nothing is written to disk
    pub fn in_memory() -> Self {
        Self::with_time_source(SystemTimeSource)
    }

    /// Store mirrored to `path`, loading any existing snapshot
    pub async fn open(path: impl Into<PathBuf>) -> GameResult<Self> {
        Self::open_with_time_source(path, SystemTimeSource).await
    }
}

impl<T: TimeSource> DurableSessionStore<T> {
    pub fn with_time_source(time_source: T) -> Self {
        Self {
            table: Mutex::new(SessionTable::default()),
            snapshot: None,
            time_source,
        }
    }

    pub async fn open_with_time_source(path: impl Into<PathBuf>, time_source: T) -> GameResult<Self> {
        let snapshot = SnapshotFile::new(path);
        let table = match snapshot.load().await? {
            Some(stored) => SessionTable::from_snapshot(stored),
            None => SessionTable::default(),
        };
        info!(
            "Session store opened at {} with {} sessions",
            snapshot.path().display(),
            table.sessions.len()
        );
        Ok(Self {
            table: Mutex::new(table),
            snapshot: Some(snapshot),
            time_source,
        })
    }

    pub fn is_durable(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Number of stored sessions in any status
    pub async fn len(&self) -> usize {
        self.table.lock().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn flush(&self, table: &SessionTable) -> GameResult<()> {
        let Some(snapshot) = &self.snapshot else {
            return Ok(());
        };
        snapshot.store(&table.to_snapshot()).await.map_err(|e| {
            error!("Failed to flush session table: {}", e);
            e
        })
    }

    /// Apply `change` to a copy of one row, flush, then publish the copy
    async fn update<F>(&self, id: SessionId, change: F) -> GameResult<GameSession>
    where
        F: FnOnce(&mut GameSession, Timestamp) -> GameResult<()> + Send,
    {
        let mut table = self.table.lock().await;
        let mut session = table
            .sessions
            .get(&id)
            .cloned()
            .ok_or_else(|| GameError::session_not_found(id))?;
        change(&mut session, self.time_source.now())?;

        let mut next = table.clone();
        next.sessions.insert(id, session.clone());
        self.flush(&next).await?;
        *table = next;
        Ok(session)
    }
}

#[async_trait]
impl<T: TimeSource> SessionStore for DurableSessionStore<T> {
    async fn create_session(
        &self,
        player_x_id: UserId,
        player_o_id: UserId,
    ) -> GameResult<GameSession> {
        let mut table = self.table.lock().await;
        let id = table.next_id;
        let session = GameSession::new(id, player_x_id, player_o_id, self.time_source.now());

        let mut next = table.clone();
        next.next_id = id.next();
        next.sessions.insert(id, session.clone());
        self.flush(&next).await?;
        *table = next;

        debug!("Created session {} ({} vs {})", id, player_x_id, player_o_id);
        Ok(session)
    }

    async fn get_session(&self, id: SessionId) -> GameResult<GameSession> {
        self.table
            .lock()
            .await
            .sessions
            .get(&id)
            .cloned()
            .ok_or_else(|| GameError::session_not_found(id))
    }

    async fn list_sessions_for_user(&self, user_id: UserId) -> GameResult<Vec<GameSession>> {
        let table = self.table.lock().await;
        let mut sessions: Vec<GameSession> = table
            .sessions
            .values()
            .filter(|s| s.status != SessionStatus::Finished && s.involves(user_id))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| {
            b.last_move_at
                .cmp(&a.last_move_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(sessions)
    }

    async fn apply_move(&self, id: SessionId, record: MoveRecord) -> GameResult<GameSession> {
        self.update(id, move |session, now| session.apply(record, now))
            .await
    }

    async fn set_status(&self, id: SessionId, status: SessionStatus) -> GameResult<GameSession> {
        self.update(id, move |session, now| {
            session.transition_to(status)?;
            session.last_move_at = now;
            Ok(())
        })
        .await
    }

    async fn clear_for_rematch(&self, id: SessionId) -> GameResult<GameSession> {
        self.update(id, |session, now| session.reset_for_rematch(now))
            .await
    }

    async fn restore_session(&self, previous: GameSession) -> GameResult<GameSession> {
        let id = previous.id;
        self.update(id, move |session, _| {
            if session.player_x_id != previous.player_x_id
                || session.player_o_id != previous.player_o_id
            {
                return Err(GameError::invalid_target(format!(
                    "session {} belongs to other players",
                    id
                )));
            }
            *session = previous;
            Ok(())
        })
        .await
    }

    async fn delete_session(&self, id: SessionId) -> GameResult<GameSession> {
        let mut table = self.table.lock().await;
        let mut next = table.clone();
        let removed = next
            .sessions
            .remove(&id)
            .ok_or_else(|| GameError::session_not_found(id))?;
        self.flush(&next).await?;
        *table = next;

        debug!("Deleted session {}", id);
        Ok(removed)
    }

    async fn has_playing_session(&self, user_id: UserId) -> GameResult<bool> {
        let table = self.table.lock().await;
        Ok(table
            .sessions
            .values()
            .any(|s| s.status == SessionStatus::Playing && s.involves(user_id)))
    }

    async fn pending_sessions_before(&self, cutoff: Timestamp) -> GameResult<Vec<GameSession>> {
        let table = self.table.lock().await;
        Ok(table
            .sessions
            .values()
            .filter(|s| s.status == SessionStatus::Pending && s.last_move_at < cutoff)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tictac_core::{Board, ManualTimeSource, Mark};

    fn store() -> (DurableSessionStore<ManualTimeSource>, ManualTimeSource) {
        let clock = ManualTimeSource::starting_at(1_000);
        (DurableSessionStore::with_time_source(clock.clone()), clock)
    }

    fn first_move() -> MoveRecord {
        MoveRecord {
            board: Board::empty().with_mark(0, Mark::X).unwrap(),
            next_turn: Mark::O,
            status: SessionStatus::Playing,
            winner_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_increasing_ids() {
        let (store, _) = store();
        let a = store.create_session(UserId::new(1), UserId::new(2)).await.unwrap();
        let b = store.create_session(UserId::new(1), UserId::new(3)).await.unwrap();
        assert_eq!(a.id, SessionId::new(1));
        assert_eq!(b.id, SessionId::new(2));
        assert_eq!(a.status, SessionStatus::Pending);
        assert!(a.board.is_empty());
    }

    #[tokio::test]
    async fn test_listing_excludes_finished_and_orders_by_last_move() {
        let (store, clock) = store();
        let older = store.create_session(UserId::new(1), UserId::new(2)).await.unwrap();
        clock.advance_seconds(1);
        let newer = store.create_session(UserId::new(3), UserId::new(1)).await.unwrap();
        clock.advance_seconds(1);
        let done = store.create_session(UserId::new(1), UserId::new(4)).await.unwrap();
        store.set_status(done.id, SessionStatus::Playing).await.unwrap();
        store.set_status(done.id, SessionStatus::Finished).await.unwrap();

        let listed: Vec<_> = store
            .list_sessions_for_user(UserId::new(1))
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(listed, vec![newer.id, older.id]);

        clock.advance_seconds(1);
        store.set_status(older.id, SessionStatus::Playing).await.unwrap();
        let listed = store.list_sessions_for_user(UserId::new(1)).await.unwrap();
        assert_eq!(listed[0].id, older.id);
    }

    #[tokio::test]
    async fn test_apply_move_refreshes_last_move_at() {
        let (store, clock) = store();
        let session = store.create_session(UserId::new(1), UserId::new(2)).await.unwrap();
        store.set_status(session.id, SessionStatus::Playing).await.unwrap();
        clock.advance_seconds(5);

        let updated = store.apply_move(session.id, first_move()).await.unwrap();
        assert_eq!(updated.current_turn, Mark::O);
        assert_eq!(updated.last_move_at, Timestamp::new(6_000));
        assert_eq!(store.get_session(session.id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_restore_puts_back_the_previous_row() {
        let (store, clock) = store();
        let session = store.create_session(UserId::new(1), UserId::new(2)).await.unwrap();
        let playing = store.set_status(session.id, SessionStatus::Playing).await.unwrap();
        clock.advance_seconds(5);
        store.apply_move(session.id, first_move()).await.unwrap();

        let restored = store.restore_session(playing.clone()).await.unwrap();
        assert_eq!(restored, playing);
        assert_eq!(store.get_session(session.id).await.unwrap(), playing);

        let mut stranger = playing;
        stranger.player_o_id = UserId::new(9);
        assert!(store.restore_session(stranger).await.is_err());
    }

    #[tokio::test]
    async fn test_rejected_change_leaves_row_untouched() {
        let (store, _) = store();
        let session = store.create_session(UserId::new(1), UserId::new(2)).await.unwrap();

        let err = store.apply_move(session.id, first_move()).await.unwrap_err();
        assert!(matches!(err, GameError::InvalidState { .. }));
        assert_eq!(store.get_session(session.id).await.unwrap(), session);

        let missing = store.get_session(SessionId::new(99)).await.unwrap_err();
        assert!(matches!(missing, GameError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_busy_and_stale_queries() {
        let (store, clock) = store();
        let pending = store.create_session(UserId::new(1), UserId::new(2)).await.unwrap();
        clock.advance_seconds(10);
        let playing = store.create_session(UserId::new(3), UserId::new(4)).await.unwrap();
        store.set_status(playing.id, SessionStatus::Playing).await.unwrap();

        assert!(!store.has_playing_session(UserId::new(1)).await.unwrap());
        assert!(store.has_playing_session(UserId::new(4)).await.unwrap());

        let stale = store
            .pending_sessions_before(Timestamp::new(5_000))
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, pending.id);

        let removed = store.delete_session(pending.id).await.unwrap();
        assert_eq!(removed.id, pending.id);
        assert!(store.delete_session(pending.id).await.is_err());
    }

    #[tokio::test]
    async fn test_reopen_restores_rows_and_counter() {
        let dir = std::env::temp_dir().join(format!("tictac-sessions-{}", uuid::Uuid::new_v4().simple()));
        let path = dir.join("sessions.json");
        {
            let store = DurableSessionStore::open(&path).await.unwrap();
            let session = store.create_session(UserId::new(1), UserId::new(2)).await.unwrap();
            store.set_status(session.id, SessionStatus::Playing).await.unwrap();
            store.apply_move(session.id, first_move()).await.unwrap();
        }

        let store = DurableSessionStore::open(&path).await.unwrap();
        let restored = store.get_session(SessionId::new(1)).await.unwrap();
        assert_eq!(restored.board.get(0), Some(Some(Mark::X)));
        assert_eq!(restored.current_turn, Mark::O);

        let next = store.create_session(UserId::new(2), UserId::new(1)).await.unwrap();
        assert_eq!(next.id, SessionId::new(2));
        let _ = std::fs::remove_dir_all(dir);
    }
}

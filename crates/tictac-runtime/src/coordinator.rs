//! Session coordinator
//!
//! The request-handling facade. Every operation resolves the caller's
//! credential, takes the per-session lock where a session is touched, runs the
//! engine and dispatches the resulting effects before releasing the lock.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tictac_core::{
    ConnectionId, GameConfig, GameOutcome, GameResult, GameSession, Identity,
    IdentityResolver, ServerEvent, SessionId, SessionStore, SessionView, Timestamp,
    UserDirectory, UserId, UserStats,
};
use tracing::{debug, info, warn};

use crate::engine::{Effect, GameEngine, MoveRequest};
use crate::managers::{EventReceiver, PresenceRegistry, RealtimeNotifier, SessionLocks};

/// A freshly opened client connection and its event stream
#[derive(Debug)]
pub struct ClientConnection {
    pub id: ConnectionId,
    pub events: EventReceiver,
}

/// One row of the user listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPresence {
    pub user_id: UserId,
    pub username: String,
    pub online: bool,
    pub is_busy: bool,
}

pub struct SessionCoordinator {
    resolver: Arc<dyn IdentityResolver>,
    store: Arc<dyn SessionStore>,
    directory: Arc<dyn UserDirectory>,
    engine: GameEngine,
    presence: Arc<PresenceRegistry>,
    notifier: Arc<RealtimeNotifier>,
    locks: SessionLocks,
}

impl SessionCoordinator {
    pub fn new(
        resolver: Arc<dyn IdentityResolver>,
        store: Arc<dyn SessionStore>,
        directory: Arc<dyn UserDirectory>,
        config: GameConfig,
    ) -> Self {
        let presence = Arc::new(PresenceRegistry::new(store.clone()));
        let notifier = Arc::new(RealtimeNotifier::new(presence.clone()));
        Self {
            engine: GameEngine::new(store.clone(), directory.clone(), config),
            resolver,
            store,
            directory,
            presence,
            notifier,
            locks: SessionLocks::new(),
        }
    }

    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.presence
    }

    pub fn notifier(&self) -> &Arc<RealtimeNotifier> {
        &self.notifier
    }

    pub fn config(&self) -> &GameConfig {
        self.engine.config()
    }

    async fn identify(&self, credential: &str) -> GameResult<Identity> {
        self.resolver.resolve(credential).await
    }

    async fn dispatch(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Notify { audience, event } => {
                    self.notifier.deliver(audience, event);
                }
                Effect::RefreshPresence { players } => {
                    for player in players {
                        let status = self.presence.status_of(player.user_id, &player.username).await;
                        self.notifier.broadcast(ServerEvent::UserStatusChanged(status));
                    }
                }
            }
        }
    }

    async fn view(&self, session: GameSession) -> GameResult<SessionView> {
        let player_x_name = self.directory.username_of(session.player_x_id).await?;
        let player_o_name = self.directory.username_of(session.player_o_id).await?;
        Ok(SessionView {
            session,
            player_x_name,
            player_o_name,
        })
    }

    // ------------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------------

    pub fn connect(&self) -> ClientConnection {
        let (id, events) = self.notifier.open_connection();
        ClientConnection { id, events }
    }

    /// Bind a connection to the credential's identity and announce it online
    pub async fn authenticate(&self, connection: ConnectionId, credential: &str) -> GameResult<Identity> {
        let identity = self.identify(credential).await?;
        for status in self.presence.authenticate(connection, identity.clone()).await {
            self.notifier.broadcast(ServerEvent::UserStatusChanged(status));
        }
        Ok(identity)
    }

    pub fn join_room(&self, connection: ConnectionId, session_id: SessionId) -> bool {
        self.notifier.join_room(connection, session_id)
    }

    pub fn leave_room(&self, connection: ConnectionId, session_id: SessionId) {
        self.notifier.leave_room(connection, session_id);
    }

    pub fn disconnect(&self, connection: ConnectionId) {
        self.notifier.close_connection(connection);
        if let Some(status) = self.presence.disconnect(connection) {
            self.notifier.broadcast(ServerEvent::UserStatusChanged(status));
        }
    }

    /// Drop every connection of a deactivated account; returns how many were closed
    pub fn force_offline(&self, username: &str) -> usize {
        let (connections, status) = self.presence.force_offline(username);
        for connection in &connections {
            self.notifier.close_connection(*connection);
        }
        if let Some(status) = status {
            self.notifier.broadcast(ServerEvent::UserStatusChanged(status));
        }
        connections.len()
    }

    // ------------------------------------------------------------------------
    // Challenges
    // ------------------------------------------------------------------------

    pub async fn challenge(&self, credential: &str, opponent_id: UserId) -> GameResult<GameSession> {
        let actor = self.identify(credential).await?;
        let transition = self.engine.challenge(&actor, opponent_id).await?;
        self.dispatch(transition.effects).await;
        Ok(transition.outcome)
    }

    pub async fn list_my_sessions(&self, credential: &str) -> GameResult<Vec<SessionView>> {
        let actor = self.identify(credential).await?;
        let sessions = self.store.list_sessions_for_user(actor.user_id).await?;
        let mut views = Vec::with_capacity(sessions.len());
        for session in sessions {
            views.push(self.view(session).await?);
        }
        Ok(views)
    }

    pub async fn accept_challenge(&self, credential: &str, session_id: SessionId) -> GameResult<GameSession> {
        let actor = self.identify(credential).await?;
        let _guard = self.locks.acquire(session_id).await;
        let transition = self.engine.accept(session_id, &actor).await?;
        self.dispatch(transition.effects).await;
        Ok(transition.outcome)
    }

    /// Returns the discarded session
    pub async fn reject_challenge(&self, credential: &str, session_id: SessionId) -> GameResult<GameSession> {
        let actor = self.identify(credential).await?;
        let guard = self.locks.acquire(session_id).await;
        let transition = self.engine.reject(session_id, &actor).await?;
        self.dispatch(transition.effects).await;
        drop(guard);
        self.locks.forget(session_id);
        Ok(transition.outcome)
    }

    // ------------------------------------------------------------------------
    // Play
    // ------------------------------------------------------------------------

    pub async fn submit_move(
        &self,
        credential: &str,
        session_id: SessionId,
        request: MoveRequest,
    ) -> GameResult<GameSession> {
        let actor = self.identify(credential).await?;
        let _guard = self.locks.acquire(session_id).await;
        let transition = self
            .engine
            .submit_move(session_id, &actor, request)
            .await
            .map_err(|e| {
                debug!("Move by {} in session {} refused: {}", actor.username, session_id, e);
                e
            })?;
        self.dispatch(transition.effects).await;
        Ok(transition.outcome)
    }

    pub async fn get_session(&self, credential: &str, session_id: SessionId) -> GameResult<SessionView> {
        self.identify(credential).await?;
        let session = self.store.get_session(session_id).await?;
        self.view(session).await
    }

    pub async fn request_rematch(
        &self,
        credential: &str,
        session_id: SessionId,
        origin: Option<ConnectionId>,
    ) -> GameResult<()> {
        let actor = self.identify(credential).await?;
        let _guard = self.locks.acquire(session_id).await;
        let transition = self.engine.request_rematch(session_id, &actor, origin).await?;
        self.dispatch(transition.effects).await;
        Ok(())
    }

    pub async fn reject_rematch(
        &self,
        credential: &str,
        session_id: SessionId,
        origin: Option<ConnectionId>,
    ) -> GameResult<()> {
        let actor = self.identify(credential).await?;
        let _guard = self.locks.acquire(session_id).await;
        let transition = self.engine.reject_rematch(session_id, &actor, origin).await?;
        self.dispatch(transition.effects).await;
        Ok(())
    }

    pub async fn accept_rematch(&self, credential: &str, session_id: SessionId) -> GameResult<GameSession> {
        let actor = self.identify(credential).await?;
        let _guard = self.locks.acquire(session_id).await;
        let transition = self.engine.accept_rematch(session_id, &actor).await?;
        self.dispatch(transition.effects).await;
        Ok(transition.outcome)
    }

    /// Force every room member out; `origin` also leaves the room
    pub async fn leave_session(
        &self,
        credential: &str,
        session_id: SessionId,
        origin: Option<ConnectionId>,
    ) -> GameResult<()> {
        let actor = self.identify(credential).await?;
        let _guard = self.locks.acquire(session_id).await;
        let transition = self.engine.leave(session_id, &actor).await?;
        self.dispatch(transition.effects).await;
        if let Some(connection) = origin {
            self.notifier.leave_room(connection, session_id);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Stats and presence
    // ------------------------------------------------------------------------

    pub async fn get_my_stats(&self, credential: &str) -> GameResult<UserStats> {
        let actor = self.identify(credential).await?;
        self.directory.get_stats(actor.user_id).await
    }

    pub async fn reset_my_stats(&self, credential: &str) -> GameResult<UserStats> {
        let actor = self.identify(credential).await?;
        self.directory.reset_stats(actor.user_id).await?;
        info!("{} reset their stats", actor.username);
        self.directory.get_stats(actor.user_id).await
    }

    /// Count a game played outside a session, such as against the local AI
    pub async fn record_result(&self, credential: &str, outcome: GameOutcome) -> GameResult<UserStats> {
        let actor = self.identify(credential).await?;
        match outcome {
            GameOutcome::Win => self.directory.increment_wins(actor.user_id).await?,
            GameOutcome::Loss => self.directory.increment_losses(actor.user_id).await?,
            GameOutcome::Draw => self.directory.increment_draws(&[actor.user_id]).await?,
        }
        self.directory.get_stats(actor.user_id).await
    }

    /// Every known user with their live status
    pub async fn presence_snapshot(&self, credential: &str) -> GameResult<Vec<UserPresence>> {
        self.identify(credential).await?;
        let mut listing = Vec::new();
        for entry in self.directory.entries().await? {
            let status = self.presence.status_of(entry.user_id, &entry.username).await;
            listing.push(UserPresence {
                user_id: entry.user_id,
                username: status.username,
                online: status.online,
                is_busy: status.is_busy,
            });
        }
        Ok(listing)
    }

    pub fn online_count(&self) -> usize {
        self.presence.online_count()
    }

    // ------------------------------------------------------------------------
    // Housekeeping
    // ------------------------------------------------------------------------

    /// Discard pending challenges older than the configured TTL
    ///
    /// Does nothing when no TTL is configured. Returns the discarded ids.
    pub async fn sweep_stale_challenges(&self, now: Timestamp) -> GameResult<Vec<SessionId>> {
        let Some(ttl) = self.config().challenge_ttl_secs else {
            return Ok(Vec::new());
        };
        let cutoff = now.sub_seconds(ttl);
        let candidates = self.store.pending_sessions_before(cutoff).await?;

        let mut discarded = Vec::new();
        for candidate in candidates {
            let guard = self.locks.acquire(candidate.id).await;
            match self.engine.expire_challenge(candidate.id, cutoff).await {
                Ok(Some(transition)) => {
                    self.dispatch(transition.effects).await;
                    discarded.push(candidate.id);
                }
                Ok(None) => {}
                Err(e) => warn!("Could not expire session {}: {}", candidate.id, e),
            }
            drop(guard);
            self.locks.forget(candidate.id);
        }

        if !discarded.is_empty() {
            info!("Discarded {} stale challenges", discarded.len());
        }
        Ok(discarded)
    }
}

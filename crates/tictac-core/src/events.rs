//! Realtime event vocabulary
//!
//! Events pushed to clients over persistent connections. Names on the wire
//! follow the kebab-case event names browser clients already listen for.

use serde::{Deserialize, Serialize};

use crate::board::{Board, Mark};
use crate::session::SessionStatus;
use crate::types::{ConnectionId, SessionId, UserId};

/// Challenge lifecycle notifications addressed to one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum GameUpdate {
    NewChallenge {
        session_id: SessionId,
        from: String,
    },
    ChallengeAccepted {
        session_id: SessionId,
    },
    ChallengeRejected {
        session_id: SessionId,
    },
}

/// Online/busy state of one identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceStatus {
    pub username: String,
    pub online: bool,
    pub is_busy: bool,
}

impl PresenceStatus {
    pub fn offline(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            online: false,
            is_busy: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    GameUpdated(GameUpdate),
    MoveMade {
        session_id: SessionId,
        board: Board,
        next_turn: Mark,
        winner_id: Option<UserId>,
        status: SessionStatus,
    },
    RematchOffered {
        session_id: SessionId,
        from: String,
    },
    RematchDeclined {
        session_id: SessionId,
    },
    GameRestarted {
        session_id: SessionId,
        board: Board,
        current_turn: Mark,
    },
    ForceExit {
        session_id: SessionId,
    },
    UserStatusChanged(PresenceStatus),
}

impl ServerEvent {
    /// Wire name of this event
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::GameUpdated(_) => "game-updated",
            ServerEvent::MoveMade { .. } => "move-made",
            ServerEvent::RematchOffered { .. } => "rematch-offered",
            ServerEvent::RematchDeclined { .. } => "rematch-declined",
            ServerEvent::GameRestarted { .. } => "game-restarted",
            ServerEvent::ForceExit { .. } => "force-exit",
            ServerEvent::UserStatusChanged(_) => "user-status-changed",
        }
    }
}

/// Who receives an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Every connection authenticated as this username
    User(String),
    /// Every connection that joined the session's room, optionally minus the sender
    Room {
        session_id: SessionId,
        except: Option<ConnectionId>,
    },
    /// Every open connection
    Everyone,
}

impl Audience {
    pub fn room(session_id: SessionId) -> Self {
        Audience::Room {
            session_id,
            except: None,
        }
    }
}

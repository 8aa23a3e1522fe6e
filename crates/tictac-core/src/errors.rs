//! Error types for the game-session core
//!
//! This module contains the error taxonomy shared by the session store, the
//! game engine, the presence registry and the coordinator facade, together
//! with the `GameError` type that unifies them.

use crate::board::Mark;
use crate::session::SessionStatus;
use crate::types::{SessionId, UserId};

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Storage write or load failures
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Snapshot encoding error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Storage unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Coarse classification used by transport boundaries to pick a status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid credential
    Unauthenticated,
    /// Session or user absent
    NotFound,
    /// Client-visible rejection, no state was mutated
    Rejected,
    /// Generic server error
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::NotFound => "not_found",
            Self::Rejected => "rejected",
            Self::Internal => "internal",
        }
    }
}

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("Missing or invalid credential")]
    Unauthenticated,

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: SessionId },

    #[error("User not found: {user_id}")]
    UserNotFound { user_id: UserId },

    #[error("Invalid target: {reason}")]
    InvalidTarget { reason: String },

    #[error("Not your turn in session {session_id}: {expected} to move")]
    NotYourTurn { session_id: SessionId, expected: Mark },

    #[error("User {user_id} may not {action} session {session_id}")]
    NotParticipant {
        session_id: SessionId,
        user_id: UserId,
        action: &'static str,
    },

    #[error("Session {session_id} is {actual}, expected {expected}")]
    InvalidState {
        session_id: SessionId,
        expected: SessionStatus,
        actual: SessionStatus,
    },

    #[error("Invalid move: {reason}")]
    InvalidMove { reason: String },

    #[error("Persistence failure: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

impl GameError {
    /// Classify this error for a transport boundary
    pub fn kind(&self) -> ErrorKind {
        match self {
            GameError::Unauthenticated => ErrorKind::Unauthenticated,
            GameError::SessionNotFound { .. } | GameError::UserNotFound { .. } => {
                ErrorKind::NotFound
            }
            GameError::InvalidTarget { .. }
            | GameError::NotYourTurn { .. }
            | GameError::NotParticipant { .. }
            | GameError::InvalidState { .. }
            | GameError::InvalidMove { .. } => ErrorKind::Rejected,
            GameError::Persistence(_) | GameError::Configuration { .. } => ErrorKind::Internal,
        }
    }

    /// Short machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            GameError::Unauthenticated => "unauthenticated",
            GameError::SessionNotFound { .. } => "session_not_found",
            GameError::UserNotFound { .. } => "user_not_found",
            GameError::InvalidTarget { .. } => "invalid_target",
            GameError::NotYourTurn { .. } => "not_your_turn",
            GameError::NotParticipant { .. } => "not_participant",
            GameError::InvalidState { .. } => "invalid_state",
            GameError::InvalidMove { .. } => "invalid_move",
            GameError::Persistence(_) => "persistence_failure",
            GameError::Configuration { .. } => "configuration_error",
        }
    }

    /// Message safe to show to a client; internal failures stay generic
    pub fn client_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl GameError {
    /// Create an invalid move error with a reason
    pub fn invalid_move<T: Into<String>>(reason: T) -> Self {
        GameError::InvalidMove {
            reason: reason.into(),
        }
    }

    /// Create an invalid target error with a reason
    pub fn invalid_target<T: Into<String>>(reason: T) -> Self {
        GameError::InvalidTarget {
            reason: reason.into(),
        }
    }

    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        GameError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a storage-unavailable persistence error
    pub fn storage_unavailable<T: Into<String>>(reason: T) -> Self {
        GameError::Persistence(PersistenceError::Unavailable {
            reason: reason.into(),
        })
    }

    pub fn session_not_found(session_id: SessionId) -> Self {
        GameError::SessionNotFound { session_id }
    }

    pub fn user_not_found(user_id: UserId) -> Self {
        GameError::UserNotFound { user_id }
    }

    pub fn not_participant(session_id: SessionId, user_id: UserId, action: &'static str) -> Self {
        GameError::NotParticipant {
            session_id,
            user_id,
            action,
        }
    }

    pub fn invalid_state(
        session_id: SessionId,
        expected: SessionStatus,
        actual: SessionStatus,
    ) -> Self {
        GameError::InvalidState {
            session_id,
            expected,
            actual,
        }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type GameResult<T> = core::result::Result<T, GameError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(GameError::Unauthenticated.kind(), ErrorKind::Unauthenticated);
        assert_eq!(
            GameError::session_not_found(SessionId::new(4)).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            GameError::NotYourTurn {
                session_id: SessionId::new(1),
                expected: Mark::O,
            }
            .kind(),
            ErrorKind::Rejected
        );
        assert_eq!(
            GameError::storage_unavailable("disk full").kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_internal_errors_hide_details_from_clients() {
        let err = GameError::storage_unavailable("/var/lib/tictac is read-only");
        assert_eq!(err.client_message(), "Internal server error");
        assert_eq!(err.code(), "persistence_failure");

        let err = GameError::invalid_target("cannot challenge yourself");
        assert!(err.client_message().contains("cannot challenge yourself"));
    }
}

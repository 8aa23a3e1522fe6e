//! Game session rows and their lifecycle
//!
//! `GameSession` is the persisted row owned by the session store. The
//! transition methods here are the last line of defence for the row
//! invariants; turn legality is decided by the game engine before they run.

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::board::{Board, Mark};
use crate::errors::{GameError, GameResult};
use crate::types::{SessionId, Timestamp, UserId};

// ----------------------------------------------------------------------------
// Session Status
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Challenge issued, awaiting acceptance
    Pending,
    /// Moves alternate
    Playing,
    /// Terminal until a rematch
    Finished,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Playing => "playing",
            Self::Finished => "finished",
        }
    }

    /// Forward transitions; `Finished -> Playing` only happens through a rematch
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Playing)
                | (Self::Playing, Self::Playing)
                | (Self::Playing, Self::Finished)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ----------------------------------------------------------------------------
// Move Record
// ----------------------------------------------------------------------------

/// A validated state change, ready to be written by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub board: Board,
    pub next_turn: Mark,
    pub status: SessionStatus,
    pub winner_id: Option<UserId>,
}

// ----------------------------------------------------------------------------
// Game Session
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSession {
    pub id: SessionId,
    pub player_x_id: UserId,
    pub player_o_id: UserId,
    pub board: Board,
    pub current_turn: Mark,
    pub status: SessionStatus,
    pub winner_id: Option<UserId>,
    pub last_move_at: Timestamp,
}

impl GameSession {
    /// A fresh challenge: empty board, X to move, pending
    pub fn new(id: SessionId, player_x_id: UserId, player_o_id: UserId, now: Timestamp) -> Self {
        Self {
            id,
            player_x_id,
            player_o_id,
            board: Board::empty(),
            current_turn: Mark::X,
            status: SessionStatus::Pending,
            winner_id: None,
            last_move_at: now,
        }
    }

    pub fn involves(&self, user_id: UserId) -> bool {
        self.player_x_id == user_id || self.player_o_id == user_id
    }

    /// The mark played by `user_id`, if they take part in this session
    pub fn mark_of(&self, user_id: UserId) -> Option<Mark> {
        if self.player_x_id == user_id {
            Some(Mark::X)
        } else if self.player_o_id == user_id {
            Some(Mark::O)
        } else {
            None
        }
    }

    pub fn player_for(&self, mark: Mark) -> UserId {
        match mark {
            Mark::X => self.player_x_id,
            Mark::O => self.player_o_id,
        }
    }

    pub fn opponent_of(&self, user_id: UserId) -> Option<UserId> {
        self.mark_of(user_id).map(|mark| self.player_for(mark.opponent()))
    }

    /// Whose user id must submit the next move
    pub fn player_to_move(&self) -> UserId {
        self.player_for(self.current_turn)
    }

    pub fn is_playing(&self) -> bool {
        self.status == SessionStatus::Playing
    }

    /// Move to `next` status if the lifecycle allows it
    pub fn transition_to(&mut self, next: SessionStatus) -> GameResult<()> {
        if !self.status.can_transition_to(next) {
            let expected = match next {
                SessionStatus::Finished => SessionStatus::Playing,
                _ => SessionStatus::Pending,
            };
            return Err(GameError::invalid_state(self.id, expected, self.status));
        }
        self.status = next;
        Ok(())
    }

    /// Overwrite board, turn, status and winner from a validated record
    pub fn apply(&mut self, record: MoveRecord, now: Timestamp) -> GameResult<()> {
        if self.status != SessionStatus::Playing {
            return Err(GameError::invalid_state(
                self.id,
                SessionStatus::Playing,
                self.status,
            ));
        }
        if !self.status.can_transition_to(record.status) {
            return Err(GameError::invalid_move(format!(
                "a move cannot leave the session {}",
                record.status
            )));
        }
        let cleared = self.board.cleared_cells(&record.board);
        if !cleared.is_empty() {
            return Err(GameError::invalid_move(format!(
                "cells {:?} cannot be cleared",
                cleared
            )));
        }
        if let Some(winner) = record.winner_id {
            if !self.involves(winner) {
                return Err(GameError::invalid_move(format!(
                    "winner {} is not a player of session {}",
                    winner, self.id
                )));
            }
        }

        self.board = record.board;
        self.current_turn = record.next_turn;
        self.status = record.status;
        self.winner_id = record.winner_id;
        self.last_move_at = now;
        Ok(())
    }

    /// Reset a finished session to a fresh game on the same id
    pub fn reset_for_rematch(&mut self, now: Timestamp) -> GameResult<()> {
        if self.status != SessionStatus::Finished {
            return Err(GameError::invalid_state(
                self.id,
                SessionStatus::Finished,
                self.status,
            ));
        }
        self.board = Board::empty();
        self.current_turn = Mark::X;
        self.status = SessionStatus::Playing;
        self.winner_id = None;
        self.last_move_at = now;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Session View
// ----------------------------------------------------------------------------

/// A session with its players' usernames resolved, as returned to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: GameSession,
    pub player_x_name: String,
    pub player_o_name: String,
}

//! Game engine
//!
//! Validates every lifecycle operation against the stored session, persists
//! the accepted transition and describes the notifications it implies as
//! `Effect`s. The engine never delivers anything itself: effects are returned
//! only after the store has acknowledged the write, and the caller dispatches
//! them while it still holds the session lock.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tictac_core::{
    Audience, Board, ConnectionId, FinishedGame, GameConfig, GameError, GameResult, GameSession,
    GameUpdate, Identity, Mark, MoveRecord, ServerEvent, SessionId, SessionStatus, SessionStore,
    Timestamp, UserDirectory, UserId, WinPolicy,
};
use tracing::{debug, error, info};

// ----------------------------------------------------------------------------
// Transitions and Effects
// ----------------------------------------------------------------------------

/// A player addressed by id and username
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRef {
    pub user_id: UserId,
    pub username: String,
}

/// A notification implied by an accepted transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Notify {
        audience: Audience,
        event: ServerEvent,
    },
    /// Recompute and broadcast the presence of these players
    RefreshPresence { players: Vec<PlayerRef> },
}

impl Effect {
    fn notify(audience: Audience, event: ServerEvent) -> Self {
        Effect::Notify { audience, event }
    }
}

/// Result of an accepted operation together with its pending notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition<T> {
    pub outcome: T,
    pub effects: Vec<Effect>,
}

impl<T> Transition<T> {
    fn new(outcome: T, effects: Vec<Effect>) -> Self {
        Self { outcome, effects }
    }
}

/// A move as submitted by a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub board: Board,
    pub next_turn: Mark,
    #[serde(default)]
    pub winner_id: Option<UserId>,
}

// ----------------------------------------------------------------------------
// Game Engine
// ----------------------------------------------------------------------------

pub struct GameEngine {
    store: Arc<dyn SessionStore>,
    directory: Arc<dyn UserDirectory>,
    config: GameConfig,
}

impl GameEngine {
    pub fn new(store: Arc<dyn SessionStore>, directory: Arc<dyn UserDirectory>, config: GameConfig) -> Self {
        Self {
            store,
            directory,
            config,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    async fn player(&self, user_id: UserId) -> GameResult<PlayerRef> {
        Ok(PlayerRef {
            user_id,
            username: self.directory.username_of(user_id).await?,
        })
    }

    async fn players_of(&self, session: &GameSession) -> GameResult<Vec<PlayerRef>> {
        Ok(vec![
            self.player(session.player_x_id).await?,
            self.player(session.player_o_id).await?,
        ])
    }

    fn require_participant(
        session: &GameSession,
        actor: &Identity,
        action: &'static str,
    ) -> GameResult<()> {
        if session.involves(actor.user_id) {
            Ok(())
        } else {
            Err(GameError::not_participant(session.id, actor.user_id, action))
        }
    }

    /// Only the challenged player may answer a pending challenge
    fn require_challenged(
        session: &GameSession,
        actor: &Identity,
        action: &'static str,
    ) -> GameResult<()> {
        if session.player_o_id != actor.user_id {
            return Err(GameError::not_participant(session.id, actor.user_id, action));
        }
        if session.status != SessionStatus::Pending {
            return Err(GameError::invalid_state(
                session.id,
                SessionStatus::Pending,
                session.status,
            ));
        }
        Ok(())
    }

    fn require_status(session: &GameSession, expected: SessionStatus) -> GameResult<()> {
        if session.status == expected {
            Ok(())
        } else {
            Err(GameError::invalid_state(session.id, expected, session.status))
        }
    }

    // ------------------------------------------------------------------------
    // Challenge lifecycle
    // ------------------------------------------------------------------------

    pub async fn challenge(
        &self,
        challenger: &Identity,
        opponent_id: UserId,
    ) -> GameResult<Transition<GameSession>> {
        if challenger.user_id == opponent_id {
            return Err(GameError::invalid_target("cannot challenge yourself"));
        }
        let opponent = self.player(opponent_id).await?;

        let session = self
            .store
            .create_session(challenger.user_id, opponent_id)
            .await?;
        info!(
            "Session {}: {} challenged {}",
            session.id, challenger.username, opponent.username
        );

        let event = ServerEvent::GameUpdated(GameUpdate::NewChallenge {
            session_id: session.id,
            from: challenger.username.clone(),
        });
        Ok(Transition::new(
            session,
            vec![Effect::notify(Audience::User(opponent.username), event)],
        ))
    }

    pub async fn accept(
        &self,
        session_id: SessionId,
        actor: &Identity,
    ) -> GameResult<Transition<GameSession>> {
        let session = self.store.get_session(session_id).await?;
        Self::require_challenged(&session, actor, "accept")?;
        let players = self.players_of(&session).await?;

        let session = self
            .store
            .set_status(session_id, SessionStatus::Playing)
            .await?;
        info!("Session {}: challenge accepted", session_id);

        let event = ServerEvent::GameUpdated(GameUpdate::ChallengeAccepted { session_id });
        let challenger = Audience::User(players[0].username.clone());
        Ok(Transition::new(
            session,
            vec![
                Effect::notify(challenger, event),
                Effect::RefreshPresence { players },
            ],
        ))
    }

    /// Discard a pending challenge; the outcome is the removed row
    pub async fn reject(
        &self,
        session_id: SessionId,
        actor: &Identity,
    ) -> GameResult<Transition<GameSession>> {
        let session = self.store.get_session(session_id).await?;
        Self::require_challenged(&session, actor, "reject")?;
        let challenger = self.player(session.player_x_id).await?;

        let removed = self.store.delete_session(session_id).await?;
        info!("Session {}: challenge rejected", session_id);

        let event = ServerEvent::GameUpdated(GameUpdate::ChallengeRejected { session_id });
        Ok(Transition::new(
            removed,
            vec![Effect::notify(Audience::User(challenger.username), event)],
        ))
    }

    /// Discard a pending challenge last touched before `cutoff`
    ///
    /// Returns `None` when the session is gone, no longer pending or was
    /// touched again since it was selected.
    pub async fn expire_challenge(
        &self,
        session_id: SessionId,
        cutoff: Timestamp,
    ) -> GameResult<Option<Transition<GameSession>>> {
        let session = match self.store.get_session(session_id).await {
            Ok(session) => session,
            Err(GameError::SessionNotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        if session.status != SessionStatus::Pending || session.last_move_at >= cutoff {
            return Ok(None);
        }
        let challenger = self.player(session.player_x_id).await?;

        let removed = self.store.delete_session(session_id).await?;
        info!("Session {}: stale challenge discarded", session_id);

        let event = ServerEvent::GameUpdated(GameUpdate::ChallengeRejected { session_id });
        Ok(Some(Transition::new(
            removed,
            vec![Effect::notify(Audience::User(challenger.username), event)],
        )))
    }

    // ------------------------------------------------------------------------
    // Moves
    // ------------------------------------------------------------------------

    /// Winner under `WinPolicy::Verify`: one new mark by the actor, line recomputed
    fn verified_winner(
        session: &GameSession,
        actor_mark: Mark,
        request: &MoveRequest,
    ) -> GameResult<Option<UserId>> {
        let placements = session.board.placements(&request.board);
        match placements.as_slice() {
            [placement] if placement.previous.is_none() && placement.mark == actor_mark => {}
            [placement] if placement.previous.is_some() => {
                return Err(GameError::invalid_move(format!(
                    "cell {} is already occupied",
                    placement.index
                )))
            }
            [_] => {
                return Err(GameError::invalid_move(format!(
                    "expected a {} to be placed",
                    actor_mark
                )))
            }
            _ => {
                return Err(GameError::invalid_move(format!(
                    "expected exactly one new mark, found {}",
                    placements.len()
                )))
            }
        }

        let computed = request.board.winner().map(|mark| session.player_for(mark));
        if request.winner_id.is_some() && request.winner_id != computed {
            return Err(GameError::invalid_move(
                "declared winner does not match the board",
            ));
        }
        Ok(computed)
    }

    /// Validate and persist one move
    pub async fn submit_move(
        &self,
        session_id: SessionId,
        actor: &Identity,
        request: MoveRequest,
    ) -> GameResult<Transition<GameSession>> {
        let session = self.store.get_session(session_id).await?;
        Self::require_status(&session, SessionStatus::Playing)?;
        if session.player_to_move() != actor.user_id {
            return Err(GameError::NotYourTurn {
                session_id,
                expected: session.current_turn,
            });
        }
        if request.next_turn != session.current_turn.opponent() {
            return Err(GameError::invalid_move(format!(
                "next turn must be {}",
                session.current_turn.opponent()
            )));
        }
        let cleared = session.board.cleared_cells(&request.board);
        if !cleared.is_empty() {
            return Err(GameError::invalid_move(format!(
                "cells {:?} cannot be cleared",
                cleared
            )));
        }

        let winner_id = match self.config.win_policy {
            WinPolicy::TrustClient => {
                if let Some(winner) = request.winner_id {
                    if !session.involves(winner) {
                        return Err(GameError::invalid_move(format!(
                            "winner {} is not a player of session {}",
                            winner, session_id
                        )));
                    }
                }
                request.winner_id
            }
            WinPolicy::Verify => Self::verified_winner(&session, session.current_turn, &request)?,
        };

        let finished = winner_id.is_some() || request.board.is_full();
        let status = if finished {
            SessionStatus::Finished
        } else {
            SessionStatus::Playing
        };
        let players = if finished {
            Some(self.players_of(&session).await?)
        } else {
            None
        };

        let record = MoveRecord {
            board: request.board,
            next_turn: request.next_turn,
            status,
            winner_id,
        };
        let updated = self.store.apply_move(session_id, record).await?;
        debug!(
            "Session {}: {} moved, {} to play",
            session_id, actor.username, updated.current_turn
        );

        let mut effects = Vec::new();
        if let Some(players) = players {
            let game = match winner_id.and_then(|w| updated.opponent_of(w).map(|l| (w, l))) {
                Some((winner, loser)) => FinishedGame::Decisive { winner, loser },
                None => FinishedGame::Draw {
                    players: [updated.player_x_id, updated.player_o_id],
                },
            };
            // The finishing write and the stats write stand or fall together
            if let Err(e) = self.directory.record_game(game).await {
                error!(
                    "Session {}: stats update failed, undoing the finishing move: {}",
                    session_id, e
                );
                if let Err(undo) = self.store.restore_session(session).await {
                    error!("Session {}: could not undo the finishing move: {}", session_id, undo);
                }
                return Err(e);
            }
            info!("Session {}: finished, winner {:?}", session_id, winner_id);
            effects.push(Effect::RefreshPresence { players });
        }
        effects.push(Effect::notify(
            Audience::room(session_id),
            ServerEvent::MoveMade {
                session_id,
                board: updated.board,
                next_turn: updated.current_turn,
                winner_id: updated.winner_id,
                status: updated.status,
            },
        ));
        Ok(Transition::new(updated, effects))
    }

    // ------------------------------------------------------------------------
    // Rematch and exit signalling
    // ------------------------------------------------------------------------

    pub async fn request_rematch(
        &self,
        session_id: SessionId,
        actor: &Identity,
        origin: Option<ConnectionId>,
    ) -> GameResult<Transition<GameSession>> {
        let session = self.store.get_session(session_id).await?;
        Self::require_participant(&session, actor, "request a rematch in")?;
        Self::require_status(&session, SessionStatus::Finished)?;

        let event = ServerEvent::RematchOffered {
            session_id,
            from: actor.username.clone(),
        };
        let audience = Audience::Room {
            session_id,
            except: origin,
        };
        Ok(Transition::new(session, vec![Effect::notify(audience, event)]))
    }

    pub async fn reject_rematch(
        &self,
        session_id: SessionId,
        actor: &Identity,
        origin: Option<ConnectionId>,
    ) -> GameResult<Transition<GameSession>> {
        let session = self.store.get_session(session_id).await?;
        Self::require_participant(&session, actor, "decline a rematch in")?;

        let audience = Audience::Room {
            session_id,
            except: origin,
        };
        Ok(Transition::new(
            session,
            vec![Effect::notify(audience, ServerEvent::RematchDeclined { session_id })],
        ))
    }

    /// Reset a finished session to a fresh game on the same id
    pub async fn accept_rematch(
        &self,
        session_id: SessionId,
        actor: &Identity,
    ) -> GameResult<Transition<GameSession>> {
        let session = self.store.get_session(session_id).await?;
        Self::require_participant(&session, actor, "accept a rematch in")?;
        Self::require_status(&session, SessionStatus::Finished)?;
        let players = self.players_of(&session).await?;

        let session = self.store.clear_for_rematch(session_id).await?;
        info!("Session {}: rematch started", session_id);

        let event = ServerEvent::GameRestarted {
            session_id,
            board: session.board,
            current_turn: session.current_turn,
        };
        Ok(Transition::new(
            session,
            vec![
                Effect::RefreshPresence { players },
                Effect::notify(Audience::room(session_id), event),
            ],
        ))
    }

    /// Tell every room member to leave; the session row is kept
    pub async fn leave(
        &self,
        session_id: SessionId,
        actor: &Identity,
    ) -> GameResult<Transition<GameSession>> {
        let session = self.store.get_session(session_id).await?;
        Self::require_participant(&session, actor, "leave")?;
        debug!("Session {}: {} left", session_id, actor.username);

        Ok(Transition::new(
            session,
            vec![Effect::notify(
                Audience::room(session_id),
                ServerEvent::ForceExit { session_id },
            )],
        ))
    }
}

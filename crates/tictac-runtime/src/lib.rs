//! Tic-tac-toe Session Runtime
//!
//! This crate contains the stateful half of the game-session system:
//! - `DurableSessionStore` and `DurableUserDirectory`: write-before-acknowledge tables
//! - `PresenceRegistry`: who is online through which connections
//! - `RealtimeNotifier`: room, per-identity and global event fan-out
//! - `GameEngine`: lifecycle validation producing effects
//! - `SessionCoordinator`: the facade that serializes work per session
//!
//! `tictac-core` provides the types and contracts these are built on.

pub mod builder;
pub mod coordinator;
pub mod engine;
pub mod identity;
pub mod managers;
pub mod storage;

pub use builder::{RuntimeBuilder, TictacRuntime, UserSeed};
pub use coordinator::{ClientConnection, SessionCoordinator, UserPresence};
pub use engine::{Effect, GameEngine, MoveRequest, PlayerRef, Transition};
pub use identity::StaticTokenResolver;
pub use managers::*;
pub use storage::{DurableSessionStore, DurableUserDirectory, SnapshotFile, UserRecord};

// Re-export core types for convenience
pub use tictac_core::{
    Audience, Board, ConnectionId, GameError, GameOutcome, GameResult, GameSession, Identity,
    Mark, ServerEvent, SessionId, SessionStatus, SessionView, UserId, UserStats,
};

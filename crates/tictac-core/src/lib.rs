//! Tic-tac-toe Session Core
//!
//! This crate provides the foundational types for realtime two-player
//! sessions: identifiers, boards and line rules, the persisted session row and
//! its lifecycle, the realtime event vocabulary, the error taxonomy, and the
//! contracts of the collaborators the runtime depends on (session store, user
//! directory, identity resolver).

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod board;
pub mod config;
pub mod directory;
pub mod errors;
pub mod events;
pub mod identity;
pub mod session;
pub mod store;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use board::{Board, Cell, Mark, Placement, BOARD_CELLS, LINES};
pub use config::{GameConfig, StorageConfig, TictacConfig, WinPolicy};
pub use directory::{DirectoryEntry, FinishedGame, GameOutcome, UserDirectory, UserStats};
pub use errors::{ErrorKind, GameError, GameResult, PersistenceError};
pub use events::{Audience, GameUpdate, PresenceStatus, ServerEvent};
pub use identity::{Identity, IdentityResolver};
pub use session::{GameSession, MoveRecord, SessionStatus, SessionView};
pub use store::SessionStore;
pub use types::{
    ConnectionId, ManualTimeSource, SessionId, SystemTimeSource, TimeSource, Timestamp, UserId,
};

//! Durable storage for sessions and user statistics
//!
//! Both tables are held in memory and mirrored to a JSON snapshot file when a
//! data directory is configured. Every mutation is written and synced before
//! the in-memory table is replaced, so a failed write leaves the previous
//! state visible.

pub mod sessions;
pub mod snapshot;
pub mod users;

pub use sessions::DurableSessionStore;
pub use snapshot::SnapshotFile;
pub use users::{DurableUserDirectory, UserRecord};

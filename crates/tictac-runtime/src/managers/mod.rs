//! Stateful managers for the session runtime
//!
//! Presence tracking, event fan-out and the per-session write locks that
//! serialize mutations of one session.

pub mod locks;
pub mod notifier;
pub mod presence;

pub use locks::SessionLocks;
pub use notifier::{DeliveryStats, EventReceiver, EventSender, RealtimeNotifier};
pub use presence::{PresenceEntry, PresenceRegistry, PresenceStats};

//! Realtime notifier
//!
//! Fans `ServerEvent`s out to open connections, either by session room, by
//! identity (every connection authenticated as a username) or to everyone.
//! Delivery is best-effort and at-most-once. A connection whose receiver is
//! gone is closed as if it had disconnected: it leaves its rooms and, if it
//! was the identity's last connection, the offline status is broadcast.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tictac_core::{Audience, ConnectionId, ServerEvent, SessionId};
use tokio::sync::mpsc;
use tracing::debug;

use super::presence::PresenceRegistry;

pub type EventSender = mpsc::UnboundedSender<ServerEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ServerEvent>;

/// Delivery counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryStats {
    pub delivered: u64,
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct DeliveryCounters {
    delivered: AtomicU64,
    dropped: AtomicU64,
}

pub struct RealtimeNotifier {
    connections: DashMap<ConnectionId, EventSender>,
    rooms: DashMap<SessionId, HashSet<ConnectionId>>,
    presence: Arc<PresenceRegistry>,
    counters: DeliveryCounters,
}

impl RealtimeNotifier {
    pub fn new(presence: Arc<PresenceRegistry>) -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
            presence,
            counters: DeliveryCounters::default(),
        }
    }

    // ------------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------------

    /// Register a new connection and hand back its event stream
    pub fn open_connection(&self) -> (ConnectionId, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ConnectionId::generate();
        self.connections.insert(id, tx);
        debug!("Opened connection {}", id);
        (id, rx)
    }

    /// Forget a connection and remove it from every room
    pub fn close_connection(&self, connection: ConnectionId) {
        self.connections.remove(&connection);
        self.leave_all_rooms(connection);
    }

    fn leave_all_rooms(&self, connection: ConnectionId) {
        self.rooms.retain(|_, members| {
            members.remove(&connection);
            !members.is_empty()
        });
    }

    /// Tear down a connection whose receiver was dropped
    fn prune(&self, connection: ConnectionId) {
        if self.connections.remove(&connection).is_none() {
            return;
        }
        self.leave_all_rooms(connection);
        debug!("Pruned closed connection {}", connection);
        if let Some(status) = self.presence.disconnect(connection) {
            self.broadcast(ServerEvent::UserStatusChanged(status));
        }
    }

    pub fn is_open(&self, connection: ConnectionId) -> bool {
        self.connections.contains_key(&connection)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    // ------------------------------------------------------------------------
    // Rooms
    // ------------------------------------------------------------------------

    /// Subscribe a connection to a session's room; unknown connections are ignored
    pub fn join_room(&self, connection: ConnectionId, session_id: SessionId) -> bool {
        if !self.is_open(connection) {
            return false;
        }
        self.rooms.entry(session_id).or_default().insert(connection);
        true
    }

    pub fn leave_room(&self, connection: ConnectionId, session_id: SessionId) {
        if let Some(mut members) = self.rooms.get_mut(&session_id) {
            members.remove(&connection);
        }
        self.rooms.remove_if(&session_id, |_, members| members.is_empty());
    }

    pub fn room_members(&self, session_id: SessionId) -> Vec<ConnectionId> {
        self.rooms
            .get(&session_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------------
    // Delivery
    // ------------------------------------------------------------------------

    /// Send to one connection; returns whether the event was handed over
    pub fn send_to_connection(&self, connection: ConnectionId, event: ServerEvent) -> bool {
        let sender = self.connections.get(&connection).map(|s| s.value().clone());
        let delivered = match sender {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        };
        if delivered {
            self.counters.delivered.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            self.prune(connection);
        }
        delivered
    }

    fn send_to_all(&self, targets: Vec<ConnectionId>, event: &ServerEvent) -> usize {
        targets
            .into_iter()
            .filter(|connection| self.send_to_connection(*connection, event.clone()))
            .count()
    }

    /// Every connection authenticated as `username`
    pub fn send_to_user(&self, username: &str, event: ServerEvent) -> usize {
        let targets = self.presence.connections_of(username);
        let sent = self.send_to_all(targets, &event);
        if sent == 0 {
            debug!("No live connection for {}, dropped {}", username, event.name());
        }
        sent
    }

    /// Every member of a session room, optionally minus one connection
    pub fn send_to_room(
        &self,
        session_id: SessionId,
        except: Option<ConnectionId>,
        event: ServerEvent,
    ) -> usize {
        let targets: Vec<ConnectionId> = self
            .room_members(session_id)
            .into_iter()
            .filter(|connection| Some(*connection) != except)
            .collect();
        self.send_to_all(targets, &event)
    }

    pub fn broadcast(&self, event: ServerEvent) -> usize {
        let targets: Vec<ConnectionId> = self.connections.iter().map(|entry| *entry.key()).collect();
        self.send_to_all(targets, &event)
    }

    /// Route an event to its audience
    pub fn deliver(&self, audience: Audience, event: ServerEvent) -> usize {
        match audience {
            Audience::User(username) => self.send_to_user(&username, event),
            Audience::Room { session_id, except } => self.send_to_room(session_id, except, event),
            Audience::Everyone => self.broadcast(event),
        }
    }

    pub fn get_statistics(&self) -> DeliveryStats {
        DeliveryStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

//! Presence registry
//!
//! Tracks which identities are online through which connections. Busy is
//! never stored; it is derived from the session store on every query. The
//! registry only returns the `PresenceStatus` values to announce, delivery is
//! left to the caller.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tictac_core::{ConnectionId, Identity, PresenceStatus, SessionStore, UserId};
use tracing::{info, warn};

// ----------------------------------------------------------------------------
// Presence Entry
// ----------------------------------------------------------------------------

/// One online identity and the connections authenticated as it
#[derive(Debug, Clone)]
pub struct PresenceEntry {
    pub identity: Identity,
    pub connections: HashSet<ConnectionId>,
}

#[derive(Debug, Default)]
struct PresenceState {
    by_connection: HashMap<ConnectionId, Identity>,
    by_username: HashMap<String, PresenceEntry>,
}

impl PresenceState {
    /// Detach `connection`; returns the identity if it just went offline
    fn detach(&mut self, connection: ConnectionId) -> Option<Identity> {
        let identity = self.by_connection.remove(&connection)?;
        let entry = self.by_username.get_mut(&identity.username)?;
        entry.connections.remove(&connection);
        if entry.connections.is_empty() {
            self.by_username.remove(&identity.username);
            Some(identity)
        } else {
            None
        }
    }
}

/// Counters for presence transitions
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PresenceStats {
    pub authentications: u64,
    pub went_online: u64,
    pub went_offline: u64,
}

// ----------------------------------------------------------------------------
// Presence Registry
// ----------------------------------------------------------------------------

pub struct PresenceRegistry {
    state: RwLock<PresenceState>,
    stats: RwLock<PresenceStats>,
    store: Arc<dyn SessionStore>,
}

impl PresenceRegistry {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            state: RwLock::new(PresenceState::default()),
            stats: RwLock::new(PresenceStats::default()),
            store,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, PresenceState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, PresenceState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn record<F: FnOnce(&mut PresenceStats)>(&self, update: F) {
        update(&mut self.stats.write().unwrap_or_else(PoisonError::into_inner));
    }

    /// Bind `connection` to `identity` and mark it online
    ///
    /// Idempotent for repeated calls with the same identity. Rebinding a
    /// connection to a different identity detaches it from the previous one
    /// first. Returns the statuses to announce, in order.
    pub async fn authenticate(&self, connection: ConnectionId, identity: Identity) -> Vec<PresenceStatus> {
        let mut announcements = Vec::new();
        let came_online = {
            let mut state = self.write();
            let rebinding = state
                .by_connection
                .get(&connection)
                .is_some_and(|current| current.username != identity.username);
            if rebinding {
                if let Some(previous) = state.detach(connection) {
                    announcements.push(PresenceStatus::offline(previous.username));
                }
            }

            state.by_connection.insert(connection, identity.clone());
            let entry = state
                .by_username
                .entry(identity.username.clone())
                .or_insert_with(|| PresenceEntry {
                    identity: identity.clone(),
                    connections: HashSet::new(),
                });
            entry.identity = identity.clone();
            let was_offline = entry.connections.is_empty();
            entry.connections.insert(connection);
            was_offline
        };

        let went_offline = announcements.len() as u64;
        self.record(|stats| {
            stats.authentications += 1;
            stats.went_offline += went_offline;
            if came_online {
                stats.went_online += 1;
            }
        });
        if came_online {
            info!("{} is online", identity.username);
        }

        let is_busy = self.compute_busy(identity.user_id).await;
        announcements.push(PresenceStatus {
            username: identity.username,
            online: true,
            is_busy,
        });
        announcements
    }

    /// Remove `connection`; returns the offline status if it was the identity's last one
    pub fn disconnect(&self, connection: ConnectionId) -> Option<PresenceStatus> {
        let gone = self.write().detach(connection)?;
        self.record(|stats| stats.went_offline += 1);
        info!("{} is offline", gone.username);
        Some(PresenceStatus::offline(gone.username))
    }

    /// Drop every connection of `username`
    ///
    /// Returns the detached connections and, if the user was online, the
    /// offline status to announce.
    pub fn force_offline(&self, username: &str) -> (Vec<ConnectionId>, Option<PresenceStatus>) {
        let removed = {
            let mut state = self.write();
            match state.by_username.remove(username) {
                Some(entry) => {
                    for connection in &entry.connections {
                        state.by_connection.remove(connection);
                    }
                    Some(entry)
                }
                None => None,
            }
        };

        match removed {
            Some(entry) => {
                self.record(|stats| stats.went_offline += 1);
                info!(
                    "Forced {} offline ({} connections)",
                    username,
                    entry.connections.len()
                );
                (
                    entry.connections.into_iter().collect(),
                    Some(PresenceStatus::offline(username)),
                )
            }
            None => (Vec::new(), None),
        }
    }

    pub fn is_online(&self, username: &str) -> bool {
        self.read().by_username.contains_key(username)
    }

    pub fn identity_of(&self, connection: ConnectionId) -> Option<Identity> {
        self.read().by_connection.get(&connection).cloned()
    }

    pub fn connections_of(&self, username: &str) -> Vec<ConnectionId> {
        self.read()
            .by_username
            .get(username)
            .map(|entry| entry.connections.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether `user_id` takes part in any playing session
    ///
    /// Store failures are logged and reported as not busy.
    pub async fn compute_busy(&self, user_id: UserId) -> bool {
        match self.store.has_playing_session(user_id).await {
            Ok(busy) => busy,
            Err(e) => {
                warn!("Could not compute busy state for user {}: {}", user_id, e);
                false
            }
        }
    }

    /// Current online/busy status of one user
    pub async fn status_of(&self, user_id: UserId, username: &str) -> PresenceStatus {
        PresenceStatus {
            username: username.to_string(),
            online: self.is_online(username),
            is_busy: self.compute_busy(user_id).await,
        }
    }

    pub fn online_count(&self) -> usize {
        self.read().by_username.len()
    }

    pub fn online_identities(&self) -> Vec<Identity> {
        let mut identities: Vec<Identity> = self
            .read()
            .by_username
            .values()
            .map(|entry| entry.identity.clone())
            .collect();
        identities.sort_by(|a, b| a.username.cmp(&b.username));
        identities
    }

    pub fn get_statistics(&self) -> PresenceStats {
        *self.stats.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DurableSessionStore;
    use tictac_core::SessionStatus;

    fn alice() -> Identity {
        Identity::new(UserId::new(1), "alice")
    }

    fn bob() -> Identity {
        Identity::new(UserId::new(2), "bob")
    }

    fn registry() -> (PresenceRegistry, Arc<DurableSessionStore>) {
        let store = Arc::new(DurableSessionStore::in_memory());
        (PresenceRegistry::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_authenticate_is_idempotent() {
        let (registry, _) = registry();
        let conn = ConnectionId::generate();

        let first = registry.authenticate(conn, alice()).await;
        let second = registry.authenticate(conn, alice()).await;
        assert_eq!(first.len(), 1);
        assert!(first[0].online);
        assert_eq!(second, first);
        assert_eq!(registry.connections_of("alice"), vec![conn]);
        assert_eq!(registry.get_statistics().went_online, 1);
    }

    #[tokio::test]
    async fn test_offline_only_after_last_connection() {
        let (registry, _) = registry();
        let tab_a = ConnectionId::generate();
        let tab_b = ConnectionId::generate();
        registry.authenticate(tab_a, alice()).await;
        registry.authenticate(tab_b, alice()).await;

        assert_eq!(registry.disconnect(tab_a), None);
        assert!(registry.is_online("alice"));

        let status = registry.disconnect(tab_b).unwrap();
        assert_eq!(status, PresenceStatus::offline("alice"));
        assert!(!registry.is_online("alice"));
        assert_eq!(registry.disconnect(tab_b), None);
    }

    #[tokio::test]
    async fn test_rebinding_connection_announces_previous_offline() {
        let (registry, _) = registry();
        let conn = ConnectionId::generate();
        registry.authenticate(conn, alice()).await;

        let announcements = registry.authenticate(conn, bob()).await;
        assert_eq!(announcements.len(), 2);
        assert_eq!(announcements[0], PresenceStatus::offline("alice"));
        assert_eq!(announcements[1].username, "bob");
        assert_eq!(registry.identity_of(conn), Some(bob()));
        assert!(!registry.is_online("alice"));
    }

    #[tokio::test]
    async fn test_busy_follows_playing_sessions() {
        let (registry, store) = registry();
        let session = store.create_session(UserId::new(1), UserId::new(2)).await.unwrap();
        assert!(!registry.compute_busy(UserId::new(1)).await);

        store.set_status(session.id, SessionStatus::Playing).await.unwrap();
        let announcements = registry.authenticate(ConnectionId::generate(), alice()).await;
        assert!(announcements[0].is_busy);

        let status = registry.status_of(UserId::new(2), "bob").await;
        assert!(!status.online);
        assert!(status.is_busy);
    }

    #[tokio::test]
    async fn test_force_offline_drops_every_connection() {
        let (registry, _) = registry();
        let tab_a = ConnectionId::generate();
        let tab_b = ConnectionId::generate();
        registry.authenticate(tab_a, alice()).await;
        registry.authenticate(tab_b, alice()).await;
        registry.authenticate(ConnectionId::generate(), bob()).await;

        let (dropped, status) = registry.force_offline("alice");
        assert_eq!(dropped.len(), 2);
        assert_eq!(status, Some(PresenceStatus::offline("alice")));
        assert_eq!(registry.identity_of(tab_a), None);
        assert_eq!(registry.disconnect(tab_b), None);
        assert_eq!(registry.online_count(), 1);
        assert_eq!(registry.force_offline("alice").1, None);
    }
}

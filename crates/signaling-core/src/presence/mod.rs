//! Presence registry: which connection currently represents each user online

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::types::{ConnectionId, UserId};

/// One online user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub user_id: UserId,
    pub connection_id: ConnectionId,
    pub connected_at: DateTime<Utc>,
}

/// What a `register` call replaced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registration {
    /// Earlier connection of the same user
    pub superseded: Option<ConnectionId>,
    /// User the connection represented before, now offline
    pub displaced: Option<UserId>,
}

#[derive(Default)]
struct PresenceMaps {
    /// user_id -> entry
    by_user: HashMap<UserId, PresenceEntry>,
    /// connection_id -> user_id, for disconnect cleanup
    by_connection: HashMap<ConnectionId, UserId>,
}

/// Last-write-wins map of user to live connection.
///
/// Both directions live behind a single lock so a lookup never observes a
/// half-applied registration.
pub struct PresenceRegistry {
    maps: Mutex<PresenceMaps>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            maps: Mutex::new(PresenceMaps::default()),
        }
    }

    /// Record `user_id` as online on `connection_id`.
    ///
    /// A previous connection for the same user is superseded without notice.
    /// Registering a connection that already represents another user moves
    /// the connection to the new user, and that user goes offline.
    pub fn register(&self, user_id: UserId, connection_id: ConnectionId) -> Registration {
        let mut maps = self.maps.lock();

        if let Some(existing) = maps.by_user.get(&user_id) {
            if existing.connection_id == connection_id {
                debug!("User {} re-registered on same connection {}", user_id, connection_id);
                return Registration::default();
            }
        }

        // One connection represents one user
        let displaced = match maps.by_connection.get(&connection_id).cloned() {
            Some(previous_user) if previous_user != user_id => {
                maps.by_user.remove(&previous_user);
                info!("🔌 User {} offline, connection {} now represents {}", previous_user, connection_id, user_id);
                Some(previous_user)
            }
            _ => None,
        };

        let superseded = maps
            .by_user
            .insert(
                user_id.clone(),
                PresenceEntry {
                    user_id: user_id.clone(),
                    connection_id,
                    connected_at: Utc::now(),
                },
            )
            .map(|old| old.connection_id);

        if let Some(old_connection) = superseded {
            maps.by_connection.remove(&old_connection);
        }
        maps.by_connection.insert(connection_id, user_id.clone());

        match superseded {
            Some(old) => info!("🔁 User {} moved from connection {} to {}", user_id, old, connection_id),
            None => info!("👤 User {} online on connection {}", user_id, connection_id),
        }
        Registration { superseded, displaced }
    }

    /// Connection currently representing `user_id`
    pub fn lookup(&self, user_id: &UserId) -> Option<ConnectionId> {
        self.maps.lock().by_user.get(user_id).map(|entry| entry.connection_id)
    }

    /// Full presence entry for `user_id`
    pub fn entry(&self, user_id: &UserId) -> Option<PresenceEntry> {
        self.maps.lock().by_user.get(user_id).cloned()
    }

    /// User represented by `connection_id`, if any
    pub fn user_for_connection(&self, connection_id: &ConnectionId) -> Option<UserId> {
        self.maps.lock().by_connection.get(connection_id).cloned()
    }

    /// Remove whichever user `connection_id` represents. No-op when the
    /// connection was never registered or has been superseded.
    pub fn unregister(&self, connection_id: &ConnectionId) -> Option<UserId> {
        let mut maps = self.maps.lock();
        let user_id = maps.by_connection.remove(connection_id)?;
        maps.by_user.remove(&user_id);
        info!("🔌 User {} offline (connection {})", user_id, connection_id);
        Some(user_id)
    }

    /// Snapshot of online users
    pub fn online_users(&self) -> HashSet<UserId> {
        self.maps.lock().by_user.keys().cloned().collect()
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.maps.lock().by_user.contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.maps.lock().by_user.len()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

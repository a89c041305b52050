//! Shared fixtures for unit tests

use parking_lot::Mutex;

use crate::config::MediaConfig;
use crate::directory::InMemoryDirectory;
use crate::signaling::hub::Notifier;
use crate::signaling::protocol::ServerEvent;
use crate::token::TokenIssuer;
use crate::types::{ConnectionId, Principal, UserId, UserProfile};

pub const MEDIA_URL: &str = "ws://media.test:7880";
pub const API_SECRET: &str = "test-livekit-secret";

pub fn media_config() -> MediaConfig {
    MediaConfig {
        url: MEDIA_URL.to_string(),
        api_key: "test-key".to_string(),
        api_secret: Some(API_SECRET.to_string()),
        ..MediaConfig::default()
    }
}

pub fn token_issuer() -> TokenIssuer {
    TokenIssuer::new(&media_config())
}

pub fn profile(id: &str, username: &str, display_name: &str) -> UserProfile {
    UserProfile {
        id: UserId::from(id),
        username: username.to_string(),
        display_name: display_name.to_string(),
    }
}

pub fn alice() -> Principal {
    profile("A", "alice", "Alice")
}

pub fn bob() -> Principal {
    profile("B", "bob", "Bob")
}

pub fn carol() -> Principal {
    profile("C", "carol", "Carol")
}

pub fn directory() -> InMemoryDirectory {
    InMemoryDirectory::with_users([alice(), bob(), carol()])
}

/// Notifier that keeps every push for inspection
#[derive(Default)]
pub struct RecordingNotifier {
    pushed: Mutex<Vec<(ConnectionId, ServerEvent)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events_for(&self, connection_id: &ConnectionId) -> Vec<ServerEvent> {
        self.pushed
            .lock()
            .iter()
            .filter(|(target, _)| target == connection_id)
            .map(|(_, event)| event.clone())
            .collect()
    }

    pub fn total(&self) -> usize {
        self.pushed.lock().len()
    }
}

impl Notifier for RecordingNotifier {
    fn push(&self, connection_id: &ConnectionId, event: ServerEvent) -> bool {
        self.pushed.lock().push((*connection_id, event));
        true
    }
}

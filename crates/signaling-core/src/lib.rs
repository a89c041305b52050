//! # Intercom Signaling Core
//!
//! Presence, call brokering and media grant issuance for a peer-to-peer
//! intercom whose audio/video runs through a LiveKit SFU.
//!
//! This crate provides:
//! - A presence registry mapping users to their live signaling connection
//! - HS256 LiveKit access grants scoped to a single room
//! - Call brokering: room allocation, invitation push, rejection and hangup routing
//! - The WebSocket signaling channel and REST API
//! - SQLite-backed user directory and call log
//!
//! ## Architecture
//!
//! Media never passes through this service. A call is a room name plus two
//! grants; the broker hands one to the caller over HTTP and pushes the other
//! to the callee over their signaling connection. Everything after that
//! happens between the clients and the media service.

pub mod api;
pub mod auth;
pub mod broker;
pub mod call_log;
pub mod config;
pub mod database;
pub mod directory;
pub mod error;
pub mod logging;
pub mod presence;
pub mod signaling;
pub mod token;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

pub use api::{create_router, AppState};
pub use auth::SessionVerifier;
pub use broker::{CallBroker, CallResponse, Delivery, InitiatedCall};
pub use call_log::{CallLog, InMemoryCallLog};
pub use config::IntercomConfig;
pub use database::SqliteStore;
pub use directory::{InMemoryDirectory, UserDirectory};
pub use error::{Result, SignalingError};
pub use presence::{PresenceRegistry, Registration};
pub use signaling::{ClientEvent, Notifier, ServerEvent, SignalingChannel, SignalingHub};
pub use token::{Grant, TokenIssuer};
pub use types::{CallRecord, CallStatus, ConnectionId, Principal, UserId, UserProfile};

/// Open the configured database and build the application state on it
pub async fn init(config: &IntercomConfig) -> Result<(AppState, SqliteStore)> {
    let store = SqliteStore::new(&config.database).await?;
    let shared = Arc::new(store.clone());
    let state = AppState::new(config, shared.clone(), shared)?;
    Ok((state, store))
}

pub mod prelude {
    pub use crate::{
        create_router, AppState, CallBroker, CallStatus, ClientEvent, IntercomConfig, Principal,
        PresenceRegistry, Result, ServerEvent, SignalingError, TokenIssuer, UserId,
    };
}

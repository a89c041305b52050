//! REST API and signaling socket routes
//!
//! - `GET  /health`
//! - `GET  /api/auth/me`
//! - `POST /api/initiate-call`
//! - `POST /api/livekit-token`
//! - `GET  /api/online-users`
//! - `WS   /socket`

use std::sync::Arc;

use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::SessionVerifier;
use crate::broker::CallBroker;
use crate::call_log::CallLog;
use crate::config::IntercomConfig;
use crate::directory::UserDirectory;
use crate::error::{Result, SignalingError};
use crate::presence::PresenceRegistry;
use crate::signaling::{socket, SignalingChannel, SignalingHub};
use crate::token::TokenIssuer;
use crate::types::{CallRecordId, Principal, UserId};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub presence: Arc<PresenceRegistry>,
    pub tokens: Arc<TokenIssuer>,
    pub broker: Arc<CallBroker>,
    pub signaling: Arc<SignalingChannel>,
    pub sessions: Arc<SessionVerifier>,
    pub cors_allow_any: bool,
}

impl AppState {
    /// Wire presence, grants, brokering and signaling together over the
    /// given collaborators
    pub fn new(
        config: &IntercomConfig,
        directory: Arc<dyn UserDirectory>,
        call_log: Arc<dyn CallLog>,
    ) -> Result<Self> {
        let presence = Arc::new(PresenceRegistry::new());
        let tokens = Arc::new(TokenIssuer::new(&config.livekit));
        let hub = Arc::new(SignalingHub::new());
        let sessions = Arc::new(SessionVerifier::new(&config.auth)?);

        let broker = Arc::new(CallBroker::new(
            presence.clone(),
            tokens.clone(),
            directory,
            call_log,
            hub.clone(),
            config.livekit.url.clone(),
        ));
        let signaling = Arc::new(SignalingChannel::new(presence.clone(), broker.clone(), hub));

        if !tokens.is_configured() {
            tracing::warn!("⚠️ LiveKit credentials missing, calls will fail until configured");
        }

        Ok(Self {
            presence,
            tokens,
            broker,
            signaling,
            sessions,
            cors_allow_any: config.server.cors_allow_any,
        })
    }
}

pub fn create_router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/api/auth/me", get(current_user))
        .route("/api/initiate-call", post(initiate_call))
        .route("/api/livekit-token", post(livekit_token))
        .route("/api/online-users", get(online_users))
        .route("/socket", get(socket::ws_handler))
        .layer(TraceLayer::new_for_http());

    if state.cors_allow_any {
        app = app.layer(CorsLayer::permissive());
    }

    app.with_state(state)
}

/// The principal behind a request, from its session token
pub struct Authenticated(pub Principal);

#[axum::async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = SignalingError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        state
            .sessions
            .principal_from_headers(&parts.headers)
            .map(Authenticated)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateCallRequest {
    pub to_user: UserId,
    #[serde(default)]
    pub contact_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateCallResponse {
    pub room_name: String,
    pub caller_token: String,
    pub ws_url: String,
    pub call_log_id: Option<CallRecordId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRequest {
    pub room_name: String,
    #[serde(default)]
    pub participant_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantResponse {
    pub token: String,
    pub ws_url: String,
    pub room_name: String,
    pub identity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUsersResponse {
    pub online_users: Vec<UserId>,
}

async fn health() -> &'static str {
    "OK"
}

async fn current_user(Authenticated(principal): Authenticated) -> Json<Principal> {
    Json(principal)
}

async fn initiate_call(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Json(request): Json<InitiateCallRequest>,
) -> Result<Json<InitiateCallResponse>> {
    let call = state
        .broker
        .initiate_call(&caller, &request.to_user, request.contact_name.as_deref())
        .await?;

    Ok(Json(InitiateCallResponse {
        room_name: call.room_name,
        caller_token: call.caller_grant.token,
        ws_url: call.media_service_url,
        call_log_id: call.call_log_id,
    }))
}

/// Grant for an arbitrary room, for clients that join rooms directly
async fn livekit_token(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Json(request): Json<GrantRequest>,
) -> Result<Json<GrantResponse>> {
    if request.room_name.trim().is_empty() {
        return Err(SignalingError::invalid_input("roomName is required"));
    }

    let identity = request
        .participant_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| principal.username.clone());

    let grant = state.tokens.issue(&request.room_name, &identity)?;
    info!("🎟️ {} requested a grant for {}", principal.username, grant.room_name);

    Ok(Json(GrantResponse {
        token: grant.token,
        ws_url: state.broker.media_service_url().to_string(),
        room_name: grant.room_name,
        identity: grant.identity,
    }))
}

async fn online_users(
    State(state): State<AppState>,
    Authenticated(_): Authenticated,
) -> Json<OnlineUsersResponse> {
    let mut online_users: Vec<UserId> = state.presence.online_users().into_iter().collect();
    online_users.sort();
    Json(OnlineUsersResponse { online_users })
}

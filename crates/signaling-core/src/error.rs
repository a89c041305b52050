use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;

use crate::types::{CallStatus, UserId};

/// Signaling and call brokering errors
#[derive(Error, Debug)]
pub enum SignalingError {
    /// Callee has no presence entry
    #[error("Target user not connected")]
    CalleeOffline(UserId),

    /// Callee id does not resolve in the user directory
    #[error("Target user not found")]
    UnknownCallee(UserId),

    /// Missing or invalid configuration (signing secrets, URLs)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No authenticated principal on the request
    #[error("Authentication required")]
    Unauthenticated,

    /// Session token was present but did not verify
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    /// Call state machine refused a transition
    #[error("Call {room_name} cannot move from {from} to {to}")]
    InvalidTransition {
        room_name: String,
        from: CallStatus,
        to: CallStatus,
    },

    /// Token encoding/decoding failures
    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    /// Backing store errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Call log collaborator failures
    #[error("Call log error: {0}")]
    CallLog(String),

    /// User directory collaborator failures
    #[error("Directory error: {0}")]
    Directory(String),

    /// Config file/environment loading errors
    #[error("Config source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    /// Malformed signaling frames
    #[error("Malformed message: {0}")]
    Protocol(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SignalingError {
    /// Create a new Configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a new CallLog error
    pub fn call_log<S: Into<String>>(msg: S) -> Self {
        Self::CallLog(msg.into())
    }

    /// Create a new Directory error
    pub fn directory<S: Into<String>>(msg: S) -> Self {
        Self::Directory(msg.into())
    }

    /// Create a new InvalidInput error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new Internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// HTTP status this error maps to on the request surface
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::CalleeOffline(_) | Self::UnknownCallee(_) => StatusCode::NOT_FOUND,
            Self::Unauthenticated | Self::InvalidSession(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::InvalidInput(_) | Self::Protocol(_) => StatusCode::BAD_REQUEST,
            Self::Configuration(_)
            | Self::Token(_)
            | Self::Database(_)
            | Self::CallLog(_)
            | Self::Directory(_)
            | Self::ConfigSource(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SignalingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("❌ Request failed: {}", self);
        }
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Result type for signaling operations
pub type Result<T> = std::result::Result<T, SignalingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callee_errors_map_to_not_found() {
        let offline = SignalingError::CalleeOffline(UserId::from("Z"));
        assert_eq!(offline.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(offline.to_string(), "Target user not connected");

        let unknown = SignalingError::UnknownCallee(UserId::from("Z"));
        assert_eq!(unknown.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_configuration_is_server_error() {
        let err = SignalingError::config("LiveKit API secret is not set");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

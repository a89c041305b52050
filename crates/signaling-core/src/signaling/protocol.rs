//! Signaling socket messages
//!
//! Every frame is a JSON text frame `{"event": "<name>", "data": {...}}`.

use serde::{Deserialize, Serialize};

use crate::types::{CallRecordId, UserId};

/// Client -> server events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    RegisterUser(RegisterUser),
    CallResponse(CallResponseEvent),
    Hangup(Hangup),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::RegisterUser(_) => "register-user",
            ClientEvent::CallResponse(_) => "call-response",
            ClientEvent::Hangup(_) => "hangup",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUser {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResponseEvent {
    pub accepted: bool,
    pub call_data: CallData,
}

/// The invitation echoed back by the callee. Clients send the whole
/// `incoming-call` payload; only the fields below are read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallData {
    /// Original caller
    pub from: UserId,
    #[serde(default)]
    pub room_name: Option<String>,
    #[serde(default)]
    pub call_log_id: Option<CallRecordId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hangup {
    pub room_name: String,
}

/// Server -> client events. Always addressed to one connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    UserRegistered(UserRegistered),
    IncomingCall(CallInvitation),
    CallRejected(CallRejected),
    CallEnded(CallEnded),
    Error(ErrorNotice),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::UserRegistered(_) => "user-registered",
            ServerEvent::IncomingCall(_) => "incoming-call",
            ServerEvent::CallRejected(_) => "call-rejected",
            ServerEvent::CallEnded(_) => "call-ended",
            ServerEvent::Error(_) => "error",
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorNotice {
            message: message.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRegistered {
    pub user_id: UserId,
    pub online_users: Vec<UserId>,
}

/// Call offer pushed to the callee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallInvitation {
    pub from: UserId,
    pub from_name: String,
    pub room_name: String,
    /// Grant for the callee, never the caller's
    pub callee_token: String,
    pub call_log_id: Option<CallRecordId>,
    #[serde(rename = "wsUrl")]
    pub media_service_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRejected {
    pub by: UserId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEnded {
    pub by: UserId,
    pub room_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorNotice {
    pub message: String,
}

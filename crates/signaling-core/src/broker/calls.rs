use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Result, SignalingError};
use crate::types::{CallRecordId, CallStatus, UserId};

/// A call the broker has issued grants for and not yet seen finish
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveCall {
    pub room_name: String,
    pub caller_id: UserId,
    pub callee_id: UserId,
    pub call_log_id: Option<CallRecordId>,
    pub status: CallStatus,
    pub initiated_at: DateTime<Utc>,
}

impl ActiveCall {
    pub fn involves(&self, user_id: &UserId) -> bool {
        &self.caller_id == user_id || &self.callee_id == user_id
    }

    /// The other participant, if `user_id` is one of the two
    pub fn peer_of(&self, user_id: &UserId) -> Option<&UserId> {
        if &self.caller_id == user_id {
            Some(&self.callee_id)
        } else if &self.callee_id == user_id {
            Some(&self.caller_id)
        } else {
            None
        }
    }
}

/// Who is asking for a transition
#[derive(Debug, Clone, Copy)]
pub enum Actor<'a> {
    /// Only the call's callee may answer
    Callee(&'a UserId),
    /// Either participant may hang up
    Participant(&'a UserId),
    /// Server-side cleanup
    System,
}

/// Per-call state machine table keyed by room name
pub struct ActiveCalls {
    calls: Mutex<HashMap<String, ActiveCall>>,
}

impl ActiveCalls {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, call: ActiveCall) {
        self.calls.lock().insert(call.room_name.clone(), call);
    }

    pub fn get(&self, room_name: &str) -> Option<ActiveCall> {
        self.calls.lock().get(room_name).cloned()
    }

    /// Move a call to `next` on behalf of `actor`. `Ok(None)` when the room
    /// is unknown.
    ///
    /// The actor check and the state change happen under one lock. Calls
    /// reaching a terminal state are removed from the table.
    pub fn transition(&self, room_name: &str, next: CallStatus, actor: Actor<'_>) -> Result<Option<ActiveCall>> {
        let mut calls = self.calls.lock();
        let Some(call) = calls.get_mut(room_name) else {
            return Ok(None);
        };

        match actor {
            Actor::Callee(user_id) if &call.callee_id != user_id => {
                return Err(SignalingError::invalid_input(format!(
                    "{} is not the callee of {}",
                    user_id, room_name
                )));
            }
            Actor::Participant(user_id) if !call.involves(user_id) => {
                return Err(SignalingError::invalid_input(format!(
                    "{} is not part of {}",
                    user_id, room_name
                )));
            }
            _ => {}
        }

        if !call.status.can_transition_to(next) {
            return Err(SignalingError::InvalidTransition {
                room_name: room_name.to_string(),
                from: call.status,
                to: next,
            });
        }

        debug!("🔄 Call {} {} -> {}", room_name, call.status, next);
        call.status = next;
        let updated = call.clone();

        if next.is_terminal() {
            calls.remove(room_name);
        }
        Ok(Some(updated))
    }

    /// Remove and return every call involving one of `users`, except the
    /// room `keep`
    pub fn take_involving(&self, users: &[&UserId], keep: &str) -> Vec<ActiveCall> {
        let mut calls = self.calls.lock();
        let stale: Vec<String> = calls
            .values()
            .filter(|call| call.room_name != keep && users.iter().any(|user| call.involves(user)))
            .map(|call| call.room_name.clone())
            .collect();

        stale.iter().filter_map(|room_name| calls.remove(room_name)).collect()
    }

    pub fn remove(&self, room_name: &str) -> Option<ActiveCall> {
        self.calls.lock().remove(room_name)
    }

    /// Calls in which `user_id` takes part
    pub fn involving(&self, user_id: &UserId) -> Vec<ActiveCall> {
        self.calls
            .lock()
            .values()
            .filter(|call| call.involves(user_id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }
}

impl Default for ActiveCalls {
    fn default() -> Self {
        Self::new()
    }
}

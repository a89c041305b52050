//! Call brokering between a caller's request and the callee's live connection
//!
//! Per call attempt:
//!
//! ```text
//! INITIATED --(callee accepts)--> ACCEPTED --(hangup / disconnect)--> ENDED
//! INITIATED --(callee rejects)--> REJECTED
//! INITIATED --(hangup)----------> ENDED
//! (callee offline at initiation)  -> CalleeOffline, nothing is created
//! ```
//!
//! Room membership after acceptance is left to the media service; the broker
//! only tracks what it needs to route rejections and end notices.

pub mod calls;
pub mod room;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::call_log::CallLog;
use crate::directory::UserDirectory;
use crate::error::{Result, SignalingError};
use crate::presence::PresenceRegistry;
use crate::signaling::hub::Notifier;
use crate::signaling::protocol::{CallEnded, CallInvitation, CallRejected, ServerEvent};
use crate::token::{Grant, TokenIssuer};
use crate::types::{CallRecordId, CallStatus, Principal, UserId};

pub use calls::{ActiveCall, ActiveCalls, Actor};
pub use room::RoomNameGenerator;

/// Outcome of a best-effort push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Recipient had no presence entry at push time
    RecipientOffline,
    /// Recipient was registered but its connection was already closing
    ConnectionClosed,
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered)
    }
}

/// What the caller gets back from a successful initiation
#[derive(Debug, Clone)]
pub struct InitiatedCall {
    pub room_name: String,
    pub caller_grant: Grant,
    pub media_service_url: String,
    pub call_log_id: Option<CallRecordId>,
    /// Internal only; the caller is told success either way
    pub invitation: Delivery,
}

/// A callee's answer as reported over the signaling channel
#[derive(Debug, Clone, PartialEq)]
pub struct CallResponse {
    pub accepted: bool,
    /// Original caller
    pub from: UserId,
    /// Responding callee
    pub to: UserId,
    pub room_name: Option<String>,
    pub call_log_id: Option<CallRecordId>,
}

/// Orchestrates call attempts
pub struct CallBroker {
    presence: Arc<PresenceRegistry>,
    tokens: Arc<TokenIssuer>,
    directory: Arc<dyn UserDirectory>,
    call_log: Arc<dyn CallLog>,
    notifier: Arc<dyn Notifier>,
    rooms: RoomNameGenerator,
    calls: ActiveCalls,
    media_service_url: String,
}

impl CallBroker {
    pub fn new(
        presence: Arc<PresenceRegistry>,
        tokens: Arc<TokenIssuer>,
        directory: Arc<dyn UserDirectory>,
        call_log: Arc<dyn CallLog>,
        notifier: Arc<dyn Notifier>,
        media_service_url: impl Into<String>,
    ) -> Self {
        Self {
            presence,
            tokens,
            directory,
            call_log,
            notifier,
            rooms: RoomNameGenerator::new(),
            calls: ActiveCalls::new(),
            media_service_url: media_service_url.into(),
        }
    }

    pub fn media_service_url(&self) -> &str {
        &self.media_service_url
    }

    pub fn active_call(&self, room_name: &str) -> Option<ActiveCall> {
        self.calls.get(room_name)
    }

    pub fn active_call_count(&self) -> usize {
        self.calls.len()
    }

    /// Place a call from `caller` to `callee_id`.
    ///
    /// Fails before anything is created when the callee is the caller, is
    /// offline or does not resolve. Once grants are issued the call succeeds
    /// for the caller even if the invitation cannot be delivered. Any older
    /// call the caller is still tracked in is closed first.
    pub async fn initiate_call(
        &self,
        caller: &Principal,
        callee_id: &UserId,
        callee_name_hint: Option<&str>,
    ) -> Result<InitiatedCall> {
        info!(
            "📞 {} ({}) calling {} ({})",
            caller.username,
            caller.id,
            callee_id,
            callee_name_hint.unwrap_or("unnamed contact")
        );

        if callee_id == &caller.id {
            return Err(SignalingError::invalid_input("Cannot call yourself"));
        }

        if self.presence.lookup(callee_id).is_none() {
            warn!("📵 Callee {} is not connected", callee_id);
            return Err(SignalingError::CalleeOffline(callee_id.clone()));
        }

        let callee = self
            .directory
            .get_user_by_id(callee_id)
            .await?
            .ok_or_else(|| {
                warn!("❓ Callee {} not in directory", callee_id);
                SignalingError::UnknownCallee(callee_id.clone())
            })?;

        let room_name = self.rooms.next(&caller.id, &callee.id);
        let caller_grant = self.tokens.issue(&room_name, &caller.username)?;
        let callee_grant = self.tokens.issue(&room_name, &callee.username)?;

        // Audit failures never block the invitation
        let call_log_id = match self
            .call_log
            .log_call(&caller.id, &callee.id, &room_name, CallStatus::Initiated)
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("⚠️ Failed to log call {}: {}", room_name, e);
                None
            }
        };

        let call = ActiveCall {
            room_name: room_name.clone(),
            caller_id: caller.id.clone(),
            callee_id: callee.id.clone(),
            call_log_id,
            status: CallStatus::Initiated,
            initiated_at: Utc::now(),
        };
        self.calls.insert(call.clone());
        self.supersede(&[&caller.id], &call).await;

        let invitation = ServerEvent::IncomingCall(CallInvitation {
            from: caller.id.clone(),
            from_name: caller.display_name.clone(),
            room_name: room_name.clone(),
            callee_token: callee_grant.token,
            call_log_id,
            media_service_url: self.media_service_url.clone(),
        });

        let delivery = self.deliver(&callee.id, invitation);
        match delivery {
            Delivery::Delivered => info!("🔔 Invitation for {} delivered to {}", room_name, callee.id),
            Delivery::RecipientOffline | Delivery::ConnectionClosed => warn!(
                "📭 Invitation for {} not delivered: {} went away after the presence check",
                room_name, callee.id
            ),
        }

        Ok(InitiatedCall {
            room_name,
            caller_grant,
            media_service_url: self.media_service_url.clone(),
            call_log_id,
            invitation: delivery,
        })
    }

    /// Apply a callee's answer.
    ///
    /// A rejection pushes one `call-rejected` to the caller's current
    /// connection and returns how that went. An acceptance pushes nothing;
    /// both sides join the media room with the grants they already hold.
    pub async fn respond_to_call(&self, response: CallResponse) -> Result<Option<Delivery>> {
        let next = if response.accepted {
            CallStatus::Accepted
        } else {
            CallStatus::Rejected
        };

        let known = match response.room_name.as_deref() {
            Some(room_name) => self
                .calls
                .transition(room_name, next, Actor::Callee(&response.to))?,
            None => None,
        };

        if let Some(call) = known.as_ref().filter(|_| response.accepted) {
            self.supersede(&[&call.caller_id, &call.callee_id], call).await;
        }

        // Tracked calls are authoritative over what the client echoed back
        let (caller_id, call_log_id) = match &known {
            Some(call) => (call.caller_id.clone(), call.call_log_id),
            None => {
                debug!("Response for untracked call from {} to {}", response.from, response.to);
                (response.from.clone(), response.call_log_id)
            }
        };

        if let Some(id) = call_log_id {
            let ended_at = (!response.accepted).then(Utc::now);
            if let Err(e) = self.call_log.update_call_status(id, next, ended_at).await {
                warn!("⚠️ Failed to mark call {} {}: {}", id, next, e);
            }
        }

        if response.accepted {
            info!("✅ {} accepted call from {}", response.to, caller_id);
            return Ok(None);
        }

        info!("❌ {} rejected call from {}", response.to, caller_id);
        let delivery = self.deliver(
            &caller_id,
            ServerEvent::CallRejected(CallRejected {
                by: response.to.clone(),
            }),
        );
        if !delivery.is_delivered() {
            debug!("Rejection notice for {} dropped ({:?})", caller_id, delivery);
        }
        Ok(Some(delivery))
    }

    /// End a call on behalf of one participant and tell the other.
    ///
    /// Unknown rooms are ignored.
    pub async fn hang_up(&self, user_id: &UserId, room_name: &str) -> Result<Option<Delivery>> {
        let Some(ended) = self
            .calls
            .transition(room_name, CallStatus::Ended, Actor::Participant(user_id))?
        else {
            debug!("Hangup for untracked room {} from {}", room_name, user_id);
            return Ok(None);
        };

        info!("📴 {} hung up {}", user_id, room_name);
        Ok(Some(self.finish(&ended, user_id).await))
    }

    /// Presence cleanup hook for a user whose connection closed.
    ///
    /// Accepted calls end and the peer is told; calls still ringing are
    /// forgotten silently. Returns the number of calls ended.
    pub async fn handle_disconnect(&self, user_id: &UserId) -> usize {
        let mut ended_count = 0;

        for call in self.calls.involving(user_id) {
            match call.status {
                CallStatus::Accepted => {
                    match self.calls.transition(&call.room_name, CallStatus::Ended, Actor::System) {
                        Ok(Some(ended)) => {
                            info!("📴 {} disconnected during {}", user_id, ended.room_name);
                            self.finish(&ended, user_id).await;
                            ended_count += 1;
                        }
                        Ok(None) => {}
                        Err(e) => debug!("Skipping {}: {}", call.room_name, e),
                    }
                }
                CallStatus::Initiated => {
                    debug!("Forgetting unanswered call {} after {} left", call.room_name, user_id);
                    self.calls.remove(&call.room_name);
                }
                CallStatus::Rejected | CallStatus::Ended => {}
            }
        }

        ended_count
    }

    /// A user is in at most one live call. Drop every other tracked call
    /// of `owners`: accepted ones end, ringing ones are forgotten. Peers
    /// outside `current` are told the old call ended.
    async fn supersede(&self, owners: &[&UserId], current: &ActiveCall) {
        for stale in self.calls.take_involving(owners, &current.room_name) {
            if stale.status != CallStatus::Accepted {
                debug!("Forgetting unanswered call {} for {}", stale.room_name, current.room_name);
                continue;
            }

            let Some(by) = owners.iter().copied().find(|owner| stale.involves(owner)) else {
                continue;
            };
            info!("📴 {} superseded by {}", stale.room_name, current.room_name);

            match stale.peer_of(by) {
                Some(peer) if !current.involves(peer) => {
                    self.finish(&stale, by).await;
                }
                _ => self.record_ended(&stale).await,
            }
        }
    }

    /// Record the end of `call` and notify the participant other than `by`
    async fn finish(&self, call: &ActiveCall, by: &UserId) -> Delivery {
        self.record_ended(call).await;

        match call.peer_of(by) {
            Some(peer) => self.deliver(
                peer,
                ServerEvent::CallEnded(CallEnded {
                    by: by.clone(),
                    room_name: call.room_name.clone(),
                }),
            ),
            None => Delivery::RecipientOffline,
        }
    }

    async fn record_ended(&self, call: &ActiveCall) {
        if let Some(id) = call.call_log_id {
            if let Err(e) = self
                .call_log
                .update_call_status(id, CallStatus::Ended, Some(Utc::now()))
                .await
            {
                warn!("⚠️ Failed to mark call {} ended: {}", id, e);
            }
        }
    }

    /// Push to whichever connection currently represents `user_id`
    fn deliver(&self, user_id: &UserId, event: ServerEvent) -> Delivery {
        match self.presence.lookup(user_id) {
            None => Delivery::RecipientOffline,
            Some(connection_id) => {
                if self.notifier.push(&connection_id, event) {
                    Delivery::Delivered
                } else {
                    Delivery::ConnectionClosed
                }
            }
        }
    }
}

//! Persistent client connections: registration, responses, hangups and
//! targeted pushes

pub mod hub;
pub mod protocol;
pub mod socket;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::broker::{CallBroker, CallResponse};
use crate::error::{Result, SignalingError};
use crate::presence::PresenceRegistry;
use crate::types::{ConnectionId, UserId};

pub use hub::{Notifier, SignalingHub};
pub use protocol::{ClientEvent, ServerEvent};

/// Routes inbound client events to presence and the broker
pub struct SignalingChannel {
    presence: Arc<PresenceRegistry>,
    broker: Arc<CallBroker>,
    hub: Arc<SignalingHub>,
}

impl SignalingChannel {
    pub fn new(presence: Arc<PresenceRegistry>, broker: Arc<CallBroker>, hub: Arc<SignalingHub>) -> Self {
        Self { presence, broker, hub }
    }

    pub fn hub(&self) -> &Arc<SignalingHub> {
        &self.hub
    }

    /// Accept a new connection. Nothing is registered until the client
    /// sends `register-user`.
    pub fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        self.hub.attach()
    }

    /// Handle one inbound text frame.
    ///
    /// Malformed frames and refused events are answered with an `error`
    /// event on the same connection; the connection stays open.
    pub async fn handle_frame(&self, connection_id: ConnectionId, frame: &str) {
        let outcome = match serde_json::from_str::<ClientEvent>(frame) {
            Ok(event) => self.dispatch(connection_id, event).await,
            Err(e) => Err(SignalingError::from(e)),
        };

        if let Err(e) = outcome {
            warn!("⚠️ Connection {}: {}", connection_id, e);
            self.hub.push(&connection_id, ServerEvent::error(e.to_string()));
        }
    }

    pub async fn dispatch(&self, connection_id: ConnectionId, event: ClientEvent) -> Result<()> {
        debug!("📥 {} from connection {}", event.name(), connection_id);

        match event {
            ClientEvent::RegisterUser(register) => {
                self.register(connection_id, register.user_id).await;
                Ok(())
            }
            ClientEvent::CallResponse(response) => {
                let responder = self.registered_user(&connection_id)?;
                self.broker
                    .respond_to_call(CallResponse {
                        accepted: response.accepted,
                        from: response.call_data.from,
                        to: responder,
                        room_name: response.call_data.room_name,
                        call_log_id: response.call_data.call_log_id,
                    })
                    .await?;
                Ok(())
            }
            ClientEvent::Hangup(hangup) => {
                let user_id = self.registered_user(&connection_id)?;
                self.broker.hang_up(&user_id, &hangup.room_name).await?;
                Ok(())
            }
        }
    }

    /// Tear down a closed connection. Only the user this connection still
    /// represents goes offline; a superseded connection changes nothing.
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        self.hub.detach(&connection_id);

        if let Some(user_id) = self.presence.unregister(&connection_id) {
            info!("👋 {} went offline", user_id);
            let ended = self.broker.handle_disconnect(&user_id).await;
            if ended > 0 {
                debug!("Ended {} call(s) for {}", ended, user_id);
            }
        }
    }

    async fn register(&self, connection_id: ConnectionId, user_id: UserId) {
        let registration = self.presence.register(user_id.clone(), connection_id);
        if let Some(previous) = registration.superseded {
            debug!("Connection {} superseded for {}", previous, user_id);
        }
        // The connection no longer speaks for its previous user
        if let Some(displaced) = registration.displaced {
            self.broker.handle_disconnect(&displaced).await;
        }

        let mut online_users: Vec<UserId> = self.presence.online_users().into_iter().collect();
        online_users.sort();

        self.hub.push(
            &connection_id,
            ServerEvent::UserRegistered(protocol::UserRegistered {
                user_id,
                online_users,
            }),
        );
    }

    fn registered_user(&self, connection_id: &ConnectionId) -> Result<UserId> {
        self.presence
            .user_for_connection(connection_id)
            .ok_or_else(|| SignalingError::invalid_input("register-user must be sent first"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_log::InMemoryCallLog;
    use crate::testing;

    struct Fixture {
        presence: Arc<PresenceRegistry>,
        broker: Arc<CallBroker>,
        channel: SignalingChannel,
    }

    fn fixture() -> Fixture {
        let presence = Arc::new(PresenceRegistry::new());
        let hub = Arc::new(SignalingHub::new());
        let broker = Arc::new(CallBroker::new(
            presence.clone(),
            Arc::new(testing::token_issuer()),
            Arc::new(testing::directory()),
            Arc::new(InMemoryCallLog::new()),
            hub.clone(),
            testing::MEDIA_URL,
        ));
        let channel = SignalingChannel::new(presence.clone(), broker.clone(), hub);
        Fixture {
            presence,
            broker,
            channel,
        }
    }

    fn register_frame(user_id: &str) -> String {
        format!(r#"{{"event":"register-user","data":{{"userId":"{}"}}}}"#, user_id)
    }

    #[tokio::test]
    async fn test_register_acknowledges_with_sorted_online_users() {
        let f = fixture();
        let (bob, mut bob_rx) = f.channel.connect();
        f.channel.handle_frame(bob, &register_frame("B")).await;
        bob_rx.recv().await.unwrap();

        let (alice, mut alice_rx) = f.channel.connect();
        f.channel.handle_frame(alice, &register_frame("A")).await;

        assert_eq!(
            alice_rx.recv().await,
            Some(ServerEvent::UserRegistered(protocol::UserRegistered {
                user_id: UserId::from("A"),
                online_users: vec![UserId::from("A"), UserId::from("B")],
            }))
        );
        assert_eq!(f.presence.lookup(&UserId::from("A")), Some(alice));
    }

    #[tokio::test]
    async fn test_numeric_user_id_registers() {
        let f = fixture();
        let (conn, _rx) = f.channel.connect();
        f.channel
            .handle_frame(conn, r#"{"event":"register-user","data":{"userId":7}}"#)
            .await;
        assert_eq!(f.presence.lookup(&UserId::from(7)), Some(conn));
    }

    #[tokio::test]
    async fn test_malformed_frame_answers_error() {
        let f = fixture();
        let (conn, mut rx) = f.channel.connect();
        f.channel.handle_frame(conn, "not json").await;

        assert!(matches!(rx.recv().await, Some(ServerEvent::Error(_))));
        assert!(f.channel.hub().is_attached(&conn));
    }

    #[tokio::test]
    async fn test_response_before_register_refused() {
        let f = fixture();
        let (conn, mut rx) = f.channel.connect();
        f.channel
            .handle_frame(
                conn,
                r#"{"event":"call-response","data":{"accepted":false,"callData":{"from":"A"}}}"#,
            )
            .await;

        let Some(ServerEvent::Error(notice)) = rx.recv().await else {
            panic!("Expected error event");
        };
        assert!(notice.message.contains("register-user"));
    }

    #[tokio::test]
    async fn test_reregistration_moves_pushes_to_newest_connection() {
        let f = fixture();
        let (old, mut old_rx) = f.channel.connect();
        f.channel.handle_frame(old, &register_frame("B")).await;
        let (new, mut new_rx) = f.channel.connect();
        f.channel.handle_frame(new, &register_frame("B")).await;
        old_rx.recv().await.unwrap();
        new_rx.recv().await.unwrap();

        f.broker
            .initiate_call(&testing::alice(), &UserId::from("B"), None)
            .await
            .unwrap();

        assert!(matches!(new_rx.recv().await, Some(ServerEvent::IncomingCall(_))));
        assert!(old_rx.try_recv().is_err());

        // Closing the superseded connection leaves B online
        f.channel.disconnect(old).await;
        assert_eq!(f.presence.lookup(&UserId::from("B")), Some(new));
    }

    #[tokio::test]
    async fn test_reject_over_channel_reaches_caller() {
        let f = fixture();
        let (alice, mut alice_rx) = f.channel.connect();
        f.channel.handle_frame(alice, &register_frame("A")).await;
        let (bob, mut bob_rx) = f.channel.connect();
        f.channel.handle_frame(bob, &register_frame("B")).await;
        alice_rx.recv().await.unwrap();
        bob_rx.recv().await.unwrap();

        f.broker
            .initiate_call(&testing::alice(), &UserId::from("B"), None)
            .await
            .unwrap();
        let Some(ServerEvent::IncomingCall(invitation)) = bob_rx.recv().await else {
            panic!("Expected incoming-call");
        };

        let frame = serde_json::json!({
            "event": "call-response",
            "data": { "accepted": false, "callData": invitation },
        });
        f.channel.handle_frame(bob, &frame.to_string()).await;

        assert_eq!(
            alice_rx.recv().await,
            Some(ServerEvent::CallRejected(protocol::CallRejected {
                by: UserId::from("B")
            }))
        );
    }

    #[tokio::test]
    async fn test_switching_user_on_a_connection_ends_previous_users_call() {
        let f = fixture();
        let (alice, mut alice_rx) = f.channel.connect();
        f.channel.handle_frame(alice, &register_frame("A")).await;
        let (bob, mut bob_rx) = f.channel.connect();
        f.channel.handle_frame(bob, &register_frame("B")).await;
        alice_rx.recv().await.unwrap();
        bob_rx.recv().await.unwrap();

        let call = f
            .broker
            .initiate_call(&testing::alice(), &UserId::from("B"), None)
            .await
            .unwrap();
        bob_rx.recv().await.unwrap();
        f.broker
            .respond_to_call(CallResponse {
                accepted: true,
                from: UserId::from("A"),
                to: UserId::from("B"),
                room_name: Some(call.room_name.clone()),
                call_log_id: None,
            })
            .await
            .unwrap();

        f.channel.handle_frame(alice, &register_frame("C")).await;

        assert_eq!(
            bob_rx.recv().await,
            Some(ServerEvent::CallEnded(protocol::CallEnded {
                by: UserId::from("A"),
                room_name: call.room_name.clone(),
            }))
        );
        assert!(!f.presence.is_online(&UserId::from("A")));
        assert_eq!(f.broker.active_call_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_clears_presence() {
        let f = fixture();
        let (conn, _rx) = f.channel.connect();
        f.channel.handle_frame(conn, &register_frame("A")).await;
        f.channel.disconnect(conn).await;

        assert!(!f.presence.is_online(&UserId::from("A")));
        assert!(!f.channel.hub().is_attached(&conn));
    }
}

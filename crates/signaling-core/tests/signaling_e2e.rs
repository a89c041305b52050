//! End-to-end signaling over real sockets: HTTP initiation plus WebSocket
//! pushes against a server bound to an ephemeral port

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use intercom_signaling_core::signaling::protocol::{CallEnded, CallInvitation, CallRejected};
use intercom_signaling_core::{
    create_router, AppState, InMemoryCallLog, InMemoryDirectory, IntercomConfig, ServerEvent,
    UserId, UserProfile,
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Server {
    addr: SocketAddr,
    state: AppState,
}

async fn start_server() -> Server {
    let mut config = IntercomConfig::default();
    config.livekit.api_secret = Some("livekit-secret".to_string());
    config.auth.session_secret = Some("session-secret".to_string());

    let directory = Arc::new(InMemoryDirectory::with_users([
        profile("1", "alice", "Alice"),
        profile("2", "bob", "Bob"),
    ]));
    let state = AppState::new(&config, directory, Arc::new(InMemoryCallLog::new())).unwrap();
    let router = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    Server { addr, state }
}

fn profile(id: &str, username: &str, display_name: &str) -> UserProfile {
    UserProfile {
        id: UserId::from(id),
        username: username.to_string(),
        display_name: display_name.to_string(),
    }
}

async fn connect(server: &Server, user_id: i64) -> Socket {
    let url = format!("ws://{}/socket", server.addr);
    let (mut socket, _) = connect_async(url).await.unwrap();
    send(&mut socket, json!({ "event": "register-user", "data": { "userId": user_id } })).await;

    match next_event(&mut socket).await {
        ServerEvent::UserRegistered(ack) => assert_eq!(ack.user_id, UserId::from(user_id)),
        other => panic!("Expected user-registered, got {:?}", other),
    }
    socket
}

async fn send(socket: &mut Socket, frame: Value) {
    socket.send(Message::Text(frame.to_string())).await.unwrap();
}

async fn next_event(socket: &mut Socket) -> ServerEvent {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a server event")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn initiate_call(server: &Server, caller: &UserProfile, to_user: i64) -> Value {
    let token = server.state.sessions.issue_session_token(caller).unwrap();
    let response = reqwest::Client::new()
        .post(format!("http://{}/api/initiate-call", server.addr))
        .bearer_auth(token)
        .json(&json!({ "toUser": to_user }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    response.json().await.unwrap()
}

async fn ring(server: &Server, bob: &mut Socket) -> CallInvitation {
    let call = initiate_call(server, &profile("1", "alice", "Alice"), 2).await;
    let invitation = match next_event(bob).await {
        ServerEvent::IncomingCall(invitation) => invitation,
        other => panic!("Expected incoming-call, got {:?}", other),
    };
    assert_eq!(invitation.room_name, call["roomName"].as_str().unwrap());
    invitation
}

async fn answer(bob: &mut Socket, invitation: &CallInvitation, accepted: bool) {
    send(
        bob,
        json!({
            "event": "call-response",
            "data": { "accepted": accepted, "callData": invitation },
        }),
    )
    .await;
}

#[tokio::test]
async fn rejected_call_notifies_caller() {
    let server = start_server().await;
    let mut alice = connect(&server, 1).await;
    let mut bob = connect(&server, 2).await;

    let invitation = ring(&server, &mut bob).await;
    assert_eq!(invitation.from_name, "Alice");
    let claims = server.state.tokens.verify(&invitation.callee_token).unwrap();
    assert_eq!(claims.sub, "bob");

    answer(&mut bob, &invitation, false).await;

    assert_eq!(
        next_event(&mut alice).await,
        ServerEvent::CallRejected(CallRejected {
            by: UserId::from("2")
        })
    );
}

#[tokio::test]
async fn hangup_after_accept_notifies_peer() {
    let server = start_server().await;
    let mut alice = connect(&server, 1).await;
    let mut bob = connect(&server, 2).await;

    let invitation = ring(&server, &mut bob).await;
    answer(&mut bob, &invitation, true).await;

    send(
        &mut alice,
        json!({ "event": "hangup", "data": { "roomName": invitation.room_name } }),
    )
    .await;

    assert_eq!(
        next_event(&mut bob).await,
        ServerEvent::CallEnded(CallEnded {
            by: UserId::from("1"),
            room_name: invitation.room_name.clone(),
        })
    );
}

#[tokio::test]
async fn disconnect_during_call_notifies_peer() {
    let server = start_server().await;
    let mut alice = connect(&server, 1).await;
    let mut bob = connect(&server, 2).await;

    let invitation = ring(&server, &mut bob).await;
    answer(&mut bob, &invitation, true).await;
    bob.close(None).await.unwrap();

    assert_eq!(
        next_event(&mut alice).await,
        ServerEvent::CallEnded(CallEnded {
            by: UserId::from("2"),
            room_name: invitation.room_name.clone(),
        })
    );
    assert!(!server.state.presence.is_online(&UserId::from("2")));
}

#[tokio::test]
async fn malformed_frame_gets_error_event() {
    let server = start_server().await;
    let mut alice = connect(&server, 1).await;

    alice.send(Message::Text("{not json".to_string())).await.unwrap();

    assert!(matches!(next_event(&mut alice).await, ServerEvent::Error(_)));
}

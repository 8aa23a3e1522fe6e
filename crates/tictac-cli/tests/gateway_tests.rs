//! End-to-end gateway tests over real WebSocket connections

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};

use tictac_cli::Gateway;
use tictac_core::{Identity, UserId};
use tictac_runtime::{RuntimeBuilder, SessionCoordinator, UserSeed};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start() -> (String, Arc<SessionCoordinator>) {
    let runtime = RuntimeBuilder::new()
        .with_user(UserSeed::new(Identity::new(UserId::new(1), "alice"), "alice-token"))
        .with_user(UserSeed::new(Identity::new(UserId::new(2), "bob"), "bob-token"))
        .build()
        .await
        .unwrap();
    let coordinator = runtime.coordinator();
    let gateway = Gateway::bind("127.0.0.1:0".parse().unwrap(), coordinator.clone())
        .await
        .unwrap();
    let url = format!("ws://{}", gateway.local_addr().unwrap());
    tokio::spawn(async move {
        let _runtime = runtime;
        gateway.run().await
    });
    (url, coordinator)
}

async fn open(url: &str) -> Socket {
    let (socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    socket
}

async fn next_json(socket: &mut Socket) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Send a request and wait for its reply, collecting events seen on the way
async fn call(socket: &mut Socket, id: u64, mut request: Value, events: &mut Vec<Value>) -> Value {
    request["id"] = json!(id);
    socket.send(Message::Text(request.to_string())).await.unwrap();
    loop {
        let frame = next_json(socket).await;
        if frame.get("event").is_some() {
            events.push(frame);
        } else if frame["id"] == json!(id) {
            return frame;
        }
    }
}

async fn next_event(socket: &mut Socket, name: &str) -> Value {
    loop {
        let frame = next_json(socket).await;
        if frame["event"] == json!(name) {
            return frame;
        }
    }
}

#[tokio::test]
async fn test_challenge_and_first_move_over_websocket() {
    let (url, _coordinator) = start().await;
    let mut alice = open(&url).await;
    let mut bob = open(&url).await;
    let mut seen = Vec::new();

    let reply = call(&mut alice, 1, json!({"op": "authenticate", "token": "alice-token"}), &mut seen).await;
    assert_eq!(reply["ok"], json!(true));
    assert_eq!(reply["data"]["username"], json!("alice"));
    call(&mut bob, 1, json!({"op": "authenticate", "token": "bob-token"}), &mut seen).await;

    let reply = call(&mut alice, 2, json!({"op": "challenge", "opponent_id": 2}), &mut seen).await;
    assert_eq!(reply["data"]["status"], json!("pending"));
    let session_id = reply["data"]["id"].clone();

    let update = next_event(&mut bob, "game-updated").await;
    assert_eq!(update["data"]["type"], json!("new-challenge"));
    assert_eq!(update["data"]["from"], json!("alice"));

    call(&mut alice, 3, json!({"op": "join-game", "session_id": session_id}), &mut seen).await;
    call(&mut bob, 2, json!({"op": "join-game", "session_id": session_id}), &mut seen).await;
    let reply = call(&mut bob, 3, json!({"op": "accept", "session_id": session_id}), &mut seen).await;
    assert_eq!(reply["data"]["status"], json!("playing"));

    let board = json!(["X", null, null, null, null, null, null, null, null]);
    let reply = call(
        &mut alice,
        4,
        json!({"op": "move", "session_id": session_id, "board": board, "next_turn": "O"}),
        &mut seen,
    )
    .await;
    assert_eq!(reply["ok"], json!(true));

    let moved = next_event(&mut bob, "move-made").await;
    assert_eq!(moved["data"]["board"], board);
    assert_eq!(moved["data"]["next_turn"], json!("O"));

    // Out of turn: refused, nothing broadcast
    let reply = call(
        &mut alice,
        5,
        json!({"op": "move", "session_id": session_id, "board": board, "next_turn": "O"}),
        &mut seen,
    )
    .await;
    assert_eq!(reply["ok"], json!(false));
    assert_eq!(reply["error"]["code"], json!("not_your_turn"));
}

#[tokio::test]
async fn test_unauthenticated_requests_are_refused() {
    let (url, _coordinator) = start().await;
    let mut socket = open(&url).await;
    let mut seen = Vec::new();

    let reply = call(&mut socket, 1, json!({"op": "sessions"}), &mut seen).await;
    assert_eq!(reply["ok"], json!(false));

    let reply = call(&mut socket, 2, json!({"op": "authenticate", "token": "forged"}), &mut seen).await;
    assert_eq!(reply["ok"], json!(false));

    socket.send(Message::Text("{not json".into())).await.unwrap();
    let reply = next_json(&mut socket).await;
    assert_eq!(reply["id"], Value::Null);
    assert_eq!(reply["error"]["code"], json!("bad_request"));
}

#[tokio::test]
async fn test_closing_the_socket_goes_offline() {
    let (url, coordinator) = start().await;
    let mut alice = open(&url).await;
    let mut seen = Vec::new();
    call(&mut alice, 1, json!({"op": "authenticate", "token": "alice-token"}), &mut seen).await;
    assert!(coordinator.presence().is_online("alice"));

    alice.close(None).await.unwrap();
    drop(alice);

    for _ in 0..50 {
        if !coordinator.presence().is_online("alice") {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("alice still online after the socket closed");
}

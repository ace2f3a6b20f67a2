//! Transport-level tests: the real router, auth middleware, and websocket
//! loop served on a local port, backed by the in-memory store.

mod common;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use uuid::Uuid;

/// Reads events until one of the wanted type arrives; unrelated events
/// (presence fan-out, the caller's own typing echo) are skipped.
async fn next_event_of(
    ws: &mut (impl StreamExt<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin),
    wanted: &str,
) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {wanted}"))
            .expect("ws stream ended")
            .expect("ws receive error");
        if let WsMessage::Text(txt) = msg {
            let event: serde_json::Value = serde_json::from_str(&txt).expect("ws event is not json");
            if event["type"] == wanted {
                return event;
            }
        }
    }
}

#[tokio::test]
async fn submit_history_and_read_receipt_over_http() {
    let state = common::test_state();
    let base = common::spawn_app(state).await;
    let client = reqwest::Client::new();

    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    // submit A -> B
    let resp = client
        .post(format!("{base}/api/v1/messages"))
        .bearer_auth(common::token_for(alice))
        .json(&json!({"recipient_id": bob, "content": "hello bob"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    let message: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(message["delivery_status"], "sent");
    let message_id = message["id"].as_str().unwrap().to_string();

    // B sees one unread message in the thread with A
    let resp = client
        .get(format!("{base}/api/v1/conversations/{alice}/unread"))
        .bearer_auth(common::token_for(bob))
        .send()
        .await
        .unwrap();
    let unread: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(unread["count"], 1);

    // B fetches history and marks the message read
    let resp = client
        .get(format!("{base}/api/v1/conversations/{alice}/messages"))
        .bearer_auth(common::token_for(bob))
        .send()
        .await
        .unwrap();
    let history: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["delivery_status"], "sent");

    let resp = client
        .post(format!("{base}/api/v1/messages/{message_id}/read"))
        .bearer_auth(common::token_for(bob))
        .send()
        .await
        .unwrap();
    let read: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(read["delivery_status"], "read");
    assert!(!read["read_at"].is_null());

    // the unread badge clears
    let resp = client
        .get(format!("{base}/api/v1/conversations/{alice}/unread"))
        .bearer_auth(common::token_for(bob))
        .send()
        .await
        .unwrap();
    let unread: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(unread["count"], 0);
}

#[tokio::test]
async fn requests_without_a_token_are_rejected() {
    let state = common::test_state();
    let base = common::spawn_app(state).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/v1/messages"))
        .json(&json!({"recipient_id": Uuid::new_v4(), "content": "hi"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);

    // introspection stays public
    let resp = client.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let resp = client.get(format!("{base}/metrics")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
}

#[tokio::test]
async fn empty_content_is_rejected_with_validation_envelope() {
    let state = common::test_state();
    let base = common::spawn_app(state).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/v1/messages"))
        .bearer_auth(common::token_for(Uuid::new_v4()))
        .json(&json!({"recipient_id": Uuid::new_v4(), "content": "  "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error_type"], "validation_error");
}

/// Polls the presence endpoint until the user's registration (which happens
/// in the upgraded socket task) is visible.
async fn wait_online(client: &reqwest::Client, base: &str, viewer: Uuid, user: Uuid) {
    for _ in 0..100 {
        let resp = client
            .get(format!("{base}/api/v1/presence/{user}"))
            .bearer_auth(common::token_for(viewer))
            .send()
            .await
            .unwrap();
        let presence: serde_json::Value = resp.json().await.unwrap();
        if presence["online"] == true {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("user {user} never came online");
}

#[tokio::test]
async fn ws_delivers_messages_and_room_scoped_typing() {
    let state = common::test_state();
    let base = common::spawn_app(state).await;
    let ws_base = base.replacen("http", "ws", 1);
    let client = reqwest::Client::new();

    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    let (mut alice_ws, _) = tokio_tungstenite::connect_async(format!(
        "{ws_base}/api/v1/ws?token={}",
        common::token_for(alice)
    ))
    .await
    .unwrap();
    wait_online(&client, &base, bob, alice).await;

    let (mut bob_ws, _) = tokio_tungstenite::connect_async(format!(
        "{ws_base}/api/v1/ws?token={}",
        common::token_for(bob)
    ))
    .await
    .unwrap();
    wait_online(&client, &base, alice, bob).await;

    // alice saw bob come online (registered after her)
    let online = next_event_of(&mut alice_ws, "presence:online").await;
    assert_eq!(online["user_id"], bob.to_string());

    // both open the thread
    let conversation = if alice <= bob {
        json!({"user_a": alice, "user_b": bob, "job_id": null})
    } else {
        json!({"user_a": bob, "user_b": alice, "job_id": null})
    };
    for ws in [&mut alice_ws, &mut bob_ws] {
        ws.send(WsMessage::Text(
            json!({"type": "room:join", "conversation": conversation}).to_string(),
        ))
        .await
        .unwrap();
    }
    // joins ride separate sockets; give the server loops a beat to apply them
    tokio::time::sleep(Duration::from_millis(250)).await;

    // alice starts typing; bob's session (joined to the room) sees it
    alice_ws
        .send(WsMessage::Text(
            json!({"type": "typing:start", "conversation": conversation}).to_string(),
        ))
        .await
        .unwrap();
    let typing = next_event_of(&mut bob_ws, "typing:start").await;
    assert_eq!(typing["user_id"], alice.to_string());

    // with no further keystrokes the indicator expires on its own
    let stopped = next_event_of(&mut bob_ws, "typing:stop").await;
    assert_eq!(stopped["user_id"], alice.to_string());

    // a message submitted over HTTP is pushed to bob's live session
    let resp = client
        .post(format!("{base}/api/v1/messages"))
        .bearer_auth(common::token_for(alice))
        .json(&json!({"recipient_id": bob, "content": "ping"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);

    let pushed = next_event_of(&mut bob_ws, "message:new").await;
    assert_eq!(pushed["message"]["content"], "ping");
    assert_eq!(pushed["message"]["sender_id"], alice.to_string());

    // the sender's session receives the delivered status
    let status = next_event_of(&mut alice_ws, "message:status").await;
    assert_eq!(status["delivery_status"], "delivered");
}

#[tokio::test]
async fn ws_rejects_invalid_tokens() {
    let state = common::test_state();
    let base = common::spawn_app(state).await;
    let ws_base = base.replacen("http", "ws", 1);

    let result =
        tokio_tungstenite::connect_async(format!("{ws_base}/api/v1/ws?token=not-a-jwt")).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn presence_endpoint_reflects_live_sessions() {
    let state = common::test_state();
    let base = common::spawn_app(state.clone()).await;
    let ws_base = base.replacen("http", "ws", 1);
    let client = reqwest::Client::new();

    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    let resp = client
        .get(format!("{base}/api/v1/presence/{bob}"))
        .bearer_auth(common::token_for(alice))
        .send()
        .await
        .unwrap();
    let presence: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(presence["online"], false);

    let (mut bob_ws, _) = tokio_tungstenite::connect_async(format!(
        "{ws_base}/api/v1/ws?token={}",
        common::token_for(bob)
    ))
    .await
    .unwrap();

    wait_online(&client, &base, alice, bob).await;

    bob_ws.close(None).await.unwrap();
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket session manager against a live mock socket endpoint.

mod support;

use std::time::Duration;

use chatter::bus::{ChatEvent, EventKind};
use chatter::socket::ConnectionState;
use chatter::test_support::{fresh_jwt, Recorder};
use chatter::token::storage::MemoryStorage;
use chatter::Client;

use support::{wait_for, MockServer, WsMode, PASSWORD, REFRESH_TOKEN, USERNAME};

const CHAT_FRAME: &str =
    r#"{"type":"chat.message","message":{"id":1,"conversation":7,"content":"hello"}}"#;

/// Client holding a token the mock server accepts.
fn signed_in_client(server: &MockServer) -> anyhow::Result<Client> {
    let access = fresh_jwt(1);
    server.state.set_access(&access);
    let client = Client::with_storage(server.config(), MemoryStorage::new());
    client.tokens().set_tokens(&access, REFRESH_TOKEN)?;
    Ok(client)
}

fn close_codes(recorder: &Recorder) -> Vec<u16> {
    recorder
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ChatEvent::Connection { state: ConnectionState::Disconnected, close_code } => close_code,
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn chat_message_frame_is_emitted_once() -> anyhow::Result<()> {
    let server = MockServer::start().await?;
    server.state.plan(WsMode::Script {
        frames: vec![
            CHAT_FRAME.to_owned(),
            r#"{"type":"presence.update"}"#.to_owned(),
            "not json".to_owned(),
        ],
        close: None,
    });
    let client = signed_in_client(&server)?;
    let messages = Recorder::attach(client.bus(), EventKind::Message);
    let socket = client.socket();

    assert!(socket.connect());
    wait_for(|| messages.len() == 1).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(messages.len(), 1);
    match &messages.events()[0] {
        ChatEvent::Message(m) => assert_eq!((m.id, m.content.as_str()), (1, "hello")),
        other => anyhow::bail!("unexpected event: {other:?}"),
    }
    assert_eq!(socket.state(), ConnectionState::Connected);
    Ok(())
}

#[tokio::test]
async fn auth_close_does_not_reconnect() -> anyhow::Result<()> {
    let server = MockServer::start().await?;
    server.state.set_ws_default(WsMode::Script { frames: vec![], close: Some(4001) });
    let client = signed_in_client(&server)?;
    let connection = Recorder::attach(client.bus(), EventKind::Connection);

    assert!(client.socket().connect());
    wait_for(|| !client.socket().is_running()).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(server.state.connects(), 1);
    assert_eq!(close_codes(&connection), vec![4001]);
    Ok(())
}

#[tokio::test]
async fn rejected_token_closes_with_4002_and_stays_down() -> anyhow::Result<()> {
    let server = MockServer::start().await?;
    let client = signed_in_client(&server)?;
    server.state.set_access("rotated-elsewhere");
    let connection = Recorder::attach(client.bus(), EventKind::Connection);

    assert!(client.socket().connect());
    wait_for(|| !client.socket().is_running()).await?;

    assert_eq!(server.state.connects(), 1);
    assert_eq!(close_codes(&connection), vec![4002]);
    Ok(())
}

#[tokio::test]
async fn abnormal_close_reconnects() -> anyhow::Result<()> {
    let server = MockServer::start().await?;
    server.state.plan(WsMode::Script { frames: vec![], close: Some(4000) });
    let client = signed_in_client(&server)?;
    let socket = client.socket();

    assert!(socket.connect());
    wait_for(|| server.state.connects() == 2 && socket.state() == ConnectionState::Connected)
        .await?;

    assert_eq!(socket.attempt(), 0, "attempt counter resets once reopened");
    assert!(socket.is_running());
    Ok(())
}

#[tokio::test]
async fn refused_handshakes_give_up_after_five_retries() -> anyhow::Result<()> {
    let server = MockServer::start().await?;
    server.state.set_ws_default(WsMode::Refuse);
    let client = signed_in_client(&server)?;
    let connection = Recorder::attach(client.bus(), EventKind::Connection);

    assert!(client.socket().connect());
    wait_for(|| !client.socket().is_running()).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(server.state.connects(), 6);
    assert_eq!(close_codes(&connection), vec![1006; 6]);
    assert_eq!(client.socket().state(), ConnectionState::Disconnected);
    Ok(())
}

#[tokio::test]
async fn typing_frames_reach_the_server() -> anyhow::Result<()> {
    let server = MockServer::start().await?;
    let client = signed_in_client(&server)?;
    let socket = client.socket();

    assert!(!socket.send_typing(7, true), "nothing is sent before connecting");
    assert!(socket.connect());
    wait_for(|| socket.state() == ConnectionState::Connected).await?;

    assert!(socket.send_typing(7, true));
    wait_for(|| !server.state.ws_received.lock().is_empty()).await?;

    let sent: serde_json::Value = serde_json::from_str(&server.state.ws_received.lock()[0])?;
    assert_eq!(sent, serde_json::json!({"type": "typing", "conversation_id": 7, "is_typing": true}));
    Ok(())
}

#[tokio::test]
async fn session_events_drive_the_socket() -> anyhow::Result<()> {
    let server = MockServer::start().await?;
    let client = Client::with_storage(server.config(), MemoryStorage::new());
    let connection = Recorder::attach(client.bus(), EventKind::Connection);
    let follower = client.follow_session();

    client.session().login(USERNAME, PASSWORD).await?;
    wait_for(|| client.socket().state() == ConnectionState::Connected).await?;

    client.session().logout()?;
    wait_for(|| !client.socket().is_running()).await?;

    assert_eq!(client.socket().state(), ConnectionState::Disconnected);
    assert_eq!(client.socket().attempt(), 0);
    assert_eq!(close_codes(&connection), vec![1000]);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.state.connects(), 1);

    follower.abort();
    Ok(())
}

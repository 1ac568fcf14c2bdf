// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mock chat server for integration tests: the REST endpoints the client
//! calls plus the `/ws/chat/` socket, with knobs for refresh and socket
//! behaviour.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};

use chatter::clock::epoch_secs;
use chatter::config::ClientConfig;
use chatter::test_support::{ensure_crypto, jwt};

pub const REFRESH_TOKEN: &str = "refresh-1";
pub const USERNAME: &str = "alice";
pub const PASSWORD: &str = "secret";

/// What the socket endpoint does with the next connection.
#[derive(Debug, Clone)]
pub enum WsMode {
    /// Answer the handshake with 503.
    Refuse,
    /// Accept, send `frames`, then close with `close` or stay open.
    Script { frames: Vec<String>, close: Option<u16> },
    /// Accept and record inbound frames until the client leaves.
    Hold,
}

pub struct MockState {
    access: Mutex<String>,
    pub refresh_calls: AtomicUsize,
    pub refresh_ok: AtomicBool,
    pub refresh_delay: Mutex<Duration>,
    pub me_calls: AtomicUsize,
    pub ws_connects: AtomicUsize,
    pub ws_plan: Mutex<VecDeque<WsMode>>,
    pub ws_default: Mutex<WsMode>,
    pub ws_received: Mutex<Vec<String>>,
    pub created: Mutex<Vec<Value>>,
    pub participants: Mutex<Vec<(i64, Value)>>,
    pub direct: Mutex<Option<Value>>,
    pub sent: Mutex<Vec<Value>>,
    pub user_queries: Mutex<Vec<HashMap<String, String>>>,
}

impl MockState {
    /// The access token the server currently accepts.
    pub fn access(&self) -> String {
        self.access.lock().clone()
    }

    pub fn set_access(&self, token: &str) {
        *self.access.lock() = token.to_owned();
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.ws_connects.load(Ordering::SeqCst)
    }

    pub fn plan(&self, mode: WsMode) {
        self.ws_plan.lock().push_back(mode);
    }

    pub fn set_ws_default(&self, mode: WsMode) {
        *self.ws_default.lock() = mode;
    }

    fn next_ws_mode(&self) -> WsMode {
        let planned = self.ws_plan.lock().pop_front();
        planned.unwrap_or_else(|| self.ws_default.lock().clone())
    }

    /// Mint a new, distinct access token and make it the accepted one.
    fn mint(&self) -> String {
        let n = self.refresh_calls.load(Ordering::SeqCst) as u64;
        let token = jwt(epoch_secs() + 3600 + n, 1);
        self.set_access(&token);
        token
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let expected = self.access();
        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        !expected.is_empty() && presented == Some(expected.as_str())
    }
}

pub struct MockServer {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
}

impl MockServer {
    pub async fn start() -> anyhow::Result<Self> {
        ensure_crypto();
        let state = Arc::new(MockState {
            access: Mutex::new(String::new()),
            refresh_calls: AtomicUsize::new(0),
            refresh_ok: AtomicBool::new(true),
            refresh_delay: Mutex::new(Duration::ZERO),
            me_calls: AtomicUsize::new(0),
            ws_connects: AtomicUsize::new(0),
            ws_plan: Mutex::new(VecDeque::new()),
            ws_default: Mutex::new(WsMode::Hold),
            ws_received: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            participants: Mutex::new(Vec::new()),
            direct: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            user_queries: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/api/login/", post(login))
            .route("/api/token/refresh/", post(refresh))
            .route("/api/users/me/", get(me))
            .route("/api/users/", get(users))
            .route("/api/conversations/", get(conversations).post(create_conversation))
            .route("/api/conversations/find-direct/", get(find_direct))
            .route("/api/conversations/{id}/add-participants/", post(add_participants))
            .route("/api/messages/", get(messages).post(send_message))
            .route("/api/forbidden/", get(forbidden))
            .route("/ws/chat/", get(ws_chat))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(Self { addr, state })
    }

    /// Client config pointed at this server with fast reconnects.
    pub fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::with_api_url(format!("http://{}", self.addr));
        config.reconnect_base_ms = 10;
        config.reconnect_max_ms = 40;
        config
    }
}

/// Poll `done` until it holds, failing after five seconds.
pub async fn wait_for(mut done: impl FnMut() -> bool) -> anyhow::Result<()> {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("condition not met within 5s"))
}

pub fn user_json(id: i64, username: &str) -> Value {
    json!({
        "id": id,
        "username": username,
        "email": format!("{username}@example.com"),
        "status": "online",
    })
}

fn unauthorized() -> Response {
    let body = json!({"detail": "Given token not valid for any token type"});
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

// ── REST handlers ─────────────────────────────────────────────────────

async fn login(State(s): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    let user = body.get("username_or_email").and_then(Value::as_str);
    let pass = body.get("password").and_then(Value::as_str);
    if user != Some(USERNAME) || pass != Some(PASSWORD) {
        let body = json!({"detail": "Invalid credentials"});
        return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
    }
    let access = s.mint();
    Json(json!({"access": access, "refresh": REFRESH_TOKEN, "user": user_json(1, USERNAME)}))
        .into_response()
}

async fn refresh(State(s): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    s.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let delay = *s.refresh_delay.lock();
    tokio::time::sleep(delay).await;

    let presented = body.get("refresh").and_then(Value::as_str);
    if !s.refresh_ok.load(Ordering::SeqCst) || presented != Some(REFRESH_TOKEN) {
        return unauthorized();
    }
    Json(json!({"access": s.mint()})).into_response()
}

async fn me(State(s): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    s.me_calls.fetch_add(1, Ordering::SeqCst);
    if !s.authorized(&headers) {
        return unauthorized();
    }
    Json(user_json(1, USERNAME)).into_response()
}

async fn users(
    State(s): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !s.authorized(&headers) {
        return unauthorized();
    }
    s.user_queries.lock().push(query);
    Json(json!({
        "count": 2,
        "total_pages": 1,
        "current_page": 1,
        "results": [user_json(1, USERNAME), user_json(2, "bob")],
    }))
    .into_response()
}

async fn conversations(
    State(s): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !s.authorized(&headers) {
        return unauthorized();
    }
    let all = vec![
        json!({"id": 1, "type": "group", "title": "general", "creator": 1}),
        json!({"id": 2, "type": "direct", "title": "Chat with bob", "creator": 1}),
    ];
    let results: Vec<Value> = match query.get("search") {
        Some(needle) => all
            .into_iter()
            .filter(|c| c["title"].as_str().is_some_and(|t| t.contains(needle.as_str())))
            .collect(),
        None => all,
    };
    Json(json!({"count": results.len(), "results": results})).into_response()
}

async fn create_conversation(
    State(s): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !s.authorized(&headers) {
        return unauthorized();
    }
    s.created.lock().push(body.clone());
    let conversation = json!({
        "id": 42,
        "type": body["type"],
        "title": body["title"],
        "description": body["description"],
        "creator": body["creator"],
    });
    *s.direct.lock() = Some(conversation.clone());
    (StatusCode::CREATED, Json(conversation)).into_response()
}

async fn find_direct(State(s): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if !s.authorized(&headers) {
        return unauthorized();
    }
    match s.direct.lock().clone() {
        Some(conversation) => Json(conversation).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"detail": "Not found."}))).into_response(),
    }
}

async fn add_participants(
    State(s): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Response {
    if !s.authorized(&headers) {
        return unauthorized();
    }
    s.participants.lock().push((id, body));
    Json(json!({"status": "ok"})).into_response()
}

async fn messages(State(s): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if !s.authorized(&headers) {
        return unauthorized();
    }
    // Newest first, as the API pages them.
    let results: Vec<Value> = (1..=3)
        .rev()
        .map(|id| json!({"id": id, "conversation": 7, "content": format!("m{id}")}))
        .collect();
    Json(json!({"count": 3, "results": results})).into_response()
}

async fn send_message(
    State(s): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !s.authorized(&headers) {
        return unauthorized();
    }
    let content = body.get("content").and_then(Value::as_str).unwrap_or_default();
    if content.is_empty() {
        let body = json!({"detail": "Message content cannot be empty."});
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    }
    s.sent.lock().push(body.clone());
    let message = json!({
        "id": 10,
        "conversation": body["conversation"],
        "type": body["type"],
        "content": content,
        "reply_to": body["reply_to"],
        "metadata": body["metadata"],
        "sender": user_json(1, USERNAME),
    });
    (StatusCode::CREATED, Json(message)).into_response()
}

async fn forbidden() -> Response {
    unauthorized()
}

// ── socket ────────────────────────────────────────────────────────────

async fn ws_chat(
    State(s): State<Arc<MockState>>,
    Query(query): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    s.ws_connects.fetch_add(1, Ordering::SeqCst);
    let mode = s.next_ws_mode();
    if matches!(mode, WsMode::Refuse) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let token_ok = query.get("token").is_some_and(|t| *t == s.access());
    ws.on_upgrade(move |socket| serve_socket(s, socket, mode, token_ok))
}

async fn close_with(socket: &mut WebSocket, code: u16) {
    let frame = CloseFrame { code, reason: "".into() };
    let _ = socket.send(WsMessage::Close(Some(frame))).await;
}

async fn serve_socket(s: Arc<MockState>, mut socket: WebSocket, mode: WsMode, token_ok: bool) {
    if !token_ok {
        close_with(&mut socket, 4002).await;
        return;
    }
    if let WsMode::Script { frames, close } = mode {
        for frame in frames {
            if socket.send(WsMessage::Text(frame.into())).await.is_err() {
                return;
            }
        }
        if let Some(code) = close {
            close_with(&mut socket, code).await;
            return;
        }
    }
    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            WsMessage::Text(text) => s.ws_received.lock().push(text.to_string()),
            WsMessage::Close(_) => break,
            _ => {}
        }
    }
}

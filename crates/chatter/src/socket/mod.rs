// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket session manager: one authenticated chat socket per session.
//!
//! [`SocketManager::connect`] spawns a driver task that owns the socket.
//! The driver reconnects with bounded exponential backoff on abnormal
//! closes, stops on normal or auth closes, and republishes inbound frames
//! on the [`EventBus`]. Other components write only through
//! [`SocketManager::send_message`].

pub mod backoff;
pub mod frame;

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, ReentrantMutex};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use self::backoff::{
    classify_close, describe_close, CloseAction, ReconnectPolicy, CLOSE_ABNORMAL,
    CLOSE_GENERAL_ERROR, CLOSE_INVALID_TOKEN, CLOSE_NORMAL, CLOSE_NO_TOKEN,
};
use self::frame::OutboundFrame;
use crate::bus::{ChatEvent, EventBus, SessionEvent};
use crate::config::ClientConfig;
use crate::token::TokenStore;

/// Close code reported when the peer closed without a status.
const CLOSE_NO_STATUS: u16 = 1005;

/// Connection lifecycle as seen by consumers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Default)]
struct ManagerState {
    conn: ConnectionState,
    /// Zero-based index of the next reconnect attempt.
    attempt: u32,
    outbound: Option<mpsc::UnboundedSender<WsMessage>>,
    /// Cancels the running driver. `Some` while a driver is alive.
    cancel: Option<CancellationToken>,
    /// Bumped on every connect/disconnect; a driver only touches state
    /// while its epoch is current.
    epoch: u64,
}

struct Inner {
    ws_base: String,
    policy: ReconnectPolicy,
    tokens: Arc<TokenStore>,
    bus: EventBus,
    state: Mutex<ManagerState>,
    /// Held while a connection event is checked and emitted, so events
    /// reach the bus in the order their state changes were applied.
    /// Reentrant so a bus handler may call back into the manager.
    events: ReentrantMutex<()>,
    shutdown: CancellationToken,
}

/// Owner of the chat socket.
///
/// Dropping the manager closes the connection and cancels any pending
/// reconnect timer. Requires a tokio runtime.
pub struct SocketManager {
    inner: Arc<Inner>,
}

impl SocketManager {
    pub fn new(
        ws_base: impl Into<String>,
        policy: ReconnectPolicy,
        tokens: Arc<TokenStore>,
        bus: EventBus,
    ) -> Self {
        let ws_base = ws_base.into().trim_end_matches('/').to_owned();
        Self {
            inner: Arc::new(Inner {
                ws_base,
                policy,
                tokens,
                bus,
                state: Mutex::new(ManagerState::default()),
                events: ReentrantMutex::new(()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn from_config(config: &ClientConfig, tokens: Arc<TokenStore>, bus: EventBus) -> Self {
        Self::new(config.ws_base(), config.reconnect_policy(), tokens, bus)
    }

    /// Start the connection driver.
    ///
    /// Returns `false` without touching the network when the token store
    /// holds no valid session. Calling it while a driver is already running
    /// is a no-op that returns `true`.
    pub fn connect(&self) -> bool {
        self.inner.connect()
    }

    /// Close the connection, cancel any pending reconnect and reset the
    /// attempt counter.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Serialize `payload` and write it to the socket.
    ///
    /// Only succeeds while connected; otherwise the payload is dropped.
    pub fn send_message<T: Serialize + ?Sized>(&self, payload: &T) -> bool {
        self.inner.send_message(payload)
    }

    /// Tell peers in `conversation_id` whether the local user is typing.
    pub fn send_typing(&self, conversation_id: i64, is_typing: bool) -> bool {
        self.send_message(&OutboundFrame::Typing { conversation_id, is_typing })
    }

    /// Connect on `LoggedIn`, disconnect on `LoggedOut` and `LoginRequired`.
    ///
    /// The returned task ends when the manager is dropped.
    pub fn follow_session(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let mut rx = inner.bus.subscribe();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = inner.shutdown.cancelled() => break,
                    event = rx.recv() => event,
                };
                match event {
                    Ok(ChatEvent::Session(SessionEvent::LoggedIn(user))) => {
                        debug!(user = %user.username, "session started, connecting socket");
                        inner.connect();
                    }
                    Ok(ChatEvent::Session(
                        SessionEvent::LoggedOut | SessionEvent::LoginRequired { .. },
                    )) => {
                        debug!("session ended, disconnecting socket");
                        inner.disconnect();
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "socket session follower lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().conn
    }

    /// Zero-based index of the next reconnect attempt.
    pub fn attempt(&self) -> u32 {
        self.inner.state.lock().attempt
    }

    /// Whether a driver task is alive (connected, connecting or waiting to
    /// reconnect).
    pub fn is_running(&self) -> bool {
        self.inner.state.lock().cancel.is_some()
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.inner.policy
    }
}

impl Drop for SocketManager {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
        self.inner.disconnect();
    }
}

impl std::fmt::Debug for SocketManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.inner.state.lock();
        f.debug_struct("SocketManager")
            .field("ws_base", &self.inner.ws_base)
            .field("state", &st.conn)
            .field("attempt", &st.attempt)
            .finish()
    }
}

impl Inner {
    fn connect(self: &Arc<Self>) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        if !self.tokens.is_authenticated() {
            error!("cannot connect socket: no authenticated session");
            return false;
        }

        let (cancel, epoch) = {
            let mut st = self.state.lock();
            if st.cancel.is_some() {
                debug!(state = %st.conn, "socket driver already running");
                return true;
            }
            let cancel = self.shutdown.child_token();
            st.epoch += 1;
            st.attempt = 0;
            st.cancel = Some(cancel.clone());
            (cancel, st.epoch)
        };

        info!(url = %self.ws_base, "starting socket driver");
        tokio::spawn(drive(Arc::clone(self), cancel, epoch));
        true
    }

    fn disconnect(&self) {
        let _events = self.events.lock();
        let was_connected = {
            let mut st = self.state.lock();
            if let Some(cancel) = st.cancel.take() {
                cancel.cancel();
            }
            st.epoch += 1;
            st.attempt = 0;
            st.outbound = None;
            std::mem::take(&mut st.conn) != ConnectionState::Disconnected
        };
        if was_connected {
            info!("socket disconnected");
            self.publish(ConnectionState::Disconnected, Some(CLOSE_NORMAL));
        }
    }

    fn send_message<T: Serialize + ?Sized>(&self, payload: &T) -> bool {
        let tx = {
            let st = self.state.lock();
            match (st.conn, st.outbound.as_ref()) {
                (ConnectionState::Connected, Some(tx)) => tx.clone(),
                (conn, _) => {
                    error!(state = %conn, "cannot send: socket is not connected");
                    return false;
                }
            }
        };
        let text = match serde_json::to_string(payload) {
            Ok(text) => text,
            Err(e) => {
                error!(err = %e, "cannot send: payload does not serialize");
                return false;
            }
        };
        tx.send(WsMessage::Text(text.into())).is_ok()
    }

    /// Apply `update` if `epoch` is still current.
    fn transition(&self, epoch: u64, update: impl FnOnce(&mut ManagerState)) -> bool {
        let mut st = self.state.lock();
        if st.epoch != epoch {
            return false;
        }
        update(&mut st);
        true
    }

    fn publish(&self, state: ConnectionState, close_code: Option<u16>) {
        self.bus.emit(ChatEvent::Connection { state, close_code });
    }

    /// Apply `update` and announce `state` if `epoch` is still current.
    ///
    /// A driver whose epoch was bumped by `disconnect` emits nothing.
    fn transition_publish(
        &self,
        epoch: u64,
        update: impl FnOnce(&mut ManagerState),
        state: ConnectionState,
        close_code: Option<u16>,
    ) -> bool {
        let _events = self.events.lock();
        if !self.transition(epoch, update) {
            return false;
        }
        self.publish(state, close_code);
        true
    }

    /// One connection lifetime. Returns the close code, or `None` when the
    /// driver was cancelled.
    async fn run_connection(&self, url: &str, cancel: &CancellationToken, epoch: u64) -> Option<u16> {
        let handshake = tokio::select! {
            _ = cancel.cancelled() => return None,
            result = tokio_tungstenite::connect_async(url) => result,
        };
        let ws_stream = match handshake {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                warn!(url = %self.ws_base, err = %e, "socket connect failed");
                return Some(CLOSE_ABNORMAL);
            }
        };

        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let opened = self.transition_publish(
            epoch,
            |st| {
                st.conn = ConnectionState::Connected;
                st.attempt = 0;
                st.outbound = Some(out_tx);
            },
            ConnectionState::Connected,
            None,
        );
        if !opened {
            return None;
        }
        info!(url = %self.ws_base, "socket connected");

        let (mut write, mut read) = ws_stream.split();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let close = CloseFrame { code: CloseCode::Normal, reason: "".into() };
                    let _ = write.send(WsMessage::Close(Some(close))).await;
                    return None;
                }
                Some(msg) = out_rx.recv() => {
                    if let Err(e) = write.send(msg).await {
                        warn!(err = %e, "socket write failed");
                        return Some(CLOSE_ABNORMAL);
                    }
                }
                msg = read.next() => match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        frame::dispatch_frame(&text, &self.bus);
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        let code = frame.map_or(CLOSE_NO_STATUS, |f| u16::from(f.code));
                        return Some(code);
                    }
                    Some(Ok(_)) => {} // Binary, ping, pong.
                    Some(Err(e)) => {
                        warn!(err = %e, "socket error");
                        return Some(CLOSE_ABNORMAL);
                    }
                    None => return Some(CLOSE_ABNORMAL),
                }
            }
        }
    }
}

/// Connection driver: connect, pump frames, and reconnect per policy until
/// cancelled, told to stop by the close code, or out of attempts.
async fn drive(inner: Arc<Inner>, cancel: CancellationToken, epoch: u64) {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let token = match inner.tokens.access_token() {
            Some(token) if inner.tokens.is_authenticated() => token,
            _ => {
                warn!("session no longer authenticated, socket driver stopping");
                break;
            }
        };

        let connecting = inner.transition_publish(
            epoch,
            |st| st.conn = ConnectionState::Connecting,
            ConnectionState::Connecting,
            None,
        );
        if !connecting {
            break;
        }

        let url = format!("{}/ws/chat/?token={}", inner.ws_base, token);
        let Some(code) = inner.run_connection(&url, &cancel, epoch).await else {
            break;
        };

        let mut attempt = 0;
        let current = inner.transition_publish(
            epoch,
            |st| {
                st.conn = ConnectionState::Disconnected;
                st.outbound = None;
                attempt = st.attempt;
            },
            ConnectionState::Disconnected,
            Some(code),
        );
        if !current {
            break;
        }

        if classify_close(code) == CloseAction::Terminal {
            info!(code, reason = describe_close(code), "socket closed");
            break;
        }
        let Some(delay) = inner.policy.next_delay(attempt) else {
            error!(code, attempts = attempt, "max reconnection attempts reached");
            break;
        };
        warn!(
            code,
            reason = describe_close(code),
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            "socket closed, reconnecting"
        );

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
        if !inner.transition(epoch, |st| st.attempt += 1) {
            break;
        }
    }

    inner.transition(epoch, |st| {
        st.cancel = None;
        st.outbound = None;
        st.conn = ConnectionState::Disconnected;
    });
    debug!("socket driver exited");
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

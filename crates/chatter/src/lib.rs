// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chatter: session layer for a real-time chat service.
//!
//! Persisted tokens, an HTTP gateway that refreshes an expired access token
//! once for every concurrent caller, a reconnecting chat socket, and an
//! event bus tying them to UI consumers.

pub mod api;
pub mod bus;
pub mod clock;
pub mod config;
pub mod debounce;
pub mod error;
pub mod http;
pub mod model;
pub mod refresh;
pub mod session;
pub mod socket;
pub mod test_support;
pub mod token;
pub mod typing;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::api::ChatApi;
use crate::bus::EventBus;
use crate::config::ClientConfig;
use crate::http::ApiClient;
use crate::session::SessionManager;
use crate::socket::SocketManager;
use crate::token::storage::{FileStorage, TokenStorage};
use crate::token::TokenStore;

/// Every component of a chat session, wired to one token store and bus.
pub struct Client {
    config: ClientConfig,
    tokens: Arc<TokenStore>,
    bus: EventBus,
    api: ChatApi,
    session: SessionManager,
    socket: Arc<SocketManager>,
}

impl Client {
    /// Build a client persisting its session under the configured state
    /// directory.
    pub fn open(config: ClientConfig) -> anyhow::Result<Self> {
        let path = config.session_file();
        debug!(path = %path.display(), "opening session file");
        let storage = FileStorage::open(path)?;
        Ok(Self::with_storage(config, storage))
    }

    pub fn with_storage(config: ClientConfig, storage: impl TokenStorage + 'static) -> Self {
        Self::with_tokens(config, Arc::new(TokenStore::new(storage)))
    }

    pub fn with_tokens(config: ClientConfig, tokens: Arc<TokenStore>) -> Self {
        let bus = EventBus::new();
        let client = Arc::new(ApiClient::new(&config, Arc::clone(&tokens), bus.clone()));
        let api = ChatApi::new(Arc::clone(&client));
        let session = SessionManager::new(client, bus.clone());
        let socket = Arc::new(SocketManager::from_config(&config, Arc::clone(&tokens), bus.clone()));
        Self { config, tokens, bus, api, session, socket }
    }

    /// Let session events drive the socket. Requires a tokio runtime.
    pub fn follow_session(&self) -> JoinHandle<()> {
        self.socket.follow_session()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn api(&self) -> &ChatApi {
        &self.api
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn socket(&self) -> &Arc<SocketManager> {
        &self.socket
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("api_url", &self.config.api_base())
            .field("session", &self.session)
            .field("socket", &self.socket)
            .finish()
    }
}

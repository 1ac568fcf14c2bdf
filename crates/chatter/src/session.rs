// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated session lifecycle: login, registration, logout and
//! startup restore. Each transition is published as a [`SessionEvent`].

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::bus::{ChatEvent, EventBus, SessionEvent};
use crate::error::{ApiError, ErrorCode};
use crate::http::ApiClient;
use crate::model::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, User};

pub const LOGIN_PATH: &str = "/api/login/";
pub const REGISTER_PATH: &str = "/api/register/";
pub const ME_PATH: &str = "/api/users/me/";

/// Tracks the signed-in user and keeps the token store in step with it.
pub struct SessionManager {
    client: Arc<ApiClient>,
    bus: EventBus,
    user: Mutex<Option<User>>,
}

impl SessionManager {
    pub fn new(client: Arc<ApiClient>, bus: EventBus) -> Self {
        Self { client, bus, user: Mutex::new(None) }
    }

    /// The signed-in user, if any. Cleared as soon as the tokens are gone,
    /// including when a failed refresh wiped them.
    pub fn user(&self) -> Option<User> {
        self.client.tokens().access_token()?;
        self.user.lock().clone()
    }

    pub async fn login(&self, username_or_email: &str, password: &str) -> Result<User, ApiError> {
        let request = LoginRequest {
            username_or_email: username_or_email.to_owned(),
            password: password.to_owned(),
        };
        let resp: LoginResponse = self.client.post_anonymous(LOGIN_PATH, &request).await?;
        self.store_tokens(&resp.access, &resp.refresh)?;
        info!(user = %resp.user.username, id = resp.user.id, "logged in");
        self.signed_in(resp.user.clone());
        Ok(resp.user)
    }

    /// Create an account. Signs in only when the server returns tokens.
    pub async fn register(&self, request: &RegisterRequest) -> Result<User, ApiError> {
        info!(user = %request.username, "registering");
        let resp: RegisterResponse = self.client.post_anonymous(REGISTER_PATH, request).await?;
        if let (Some(access), Some(refresh)) = (resp.access.as_deref(), resp.refresh.as_deref()) {
            self.store_tokens(access, refresh)?;
            self.signed_in(resp.user.clone());
        }
        info!(id = resp.user.id, "registration complete");
        Ok(resp.user)
    }

    /// Drop the tokens and sign out. The theme preference survives.
    pub fn logout(&self) -> anyhow::Result<()> {
        self.client.tokens().clear_tokens()?;
        self.user.lock().take();
        info!("logged out");
        self.bus.emit(ChatEvent::Session(SessionEvent::LoggedOut));
        Ok(())
    }

    /// Resume a stored session at startup.
    ///
    /// Returns `None` (with tokens cleared) when nothing valid is stored or
    /// the server no longer accepts the session.
    pub async fn restore(&self) -> Option<User> {
        let tokens = self.client.tokens();
        if !tokens.is_authenticated() {
            if let Err(e) = tokens.clear_tokens() {
                warn!(err = %e, "failed to clear stale tokens");
            }
            return None;
        }

        match self.client.get_json::<User>(ME_PATH, &[]).await {
            Ok(user) => {
                info!(user = %user.username, id = user.id, "session restored");
                self.signed_in(user.clone());
                Some(user)
            }
            Err(e) => {
                warn!(err = %e, "stored session rejected");
                if let Err(e) = tokens.clear_tokens() {
                    warn!(err = %e, "failed to clear stale tokens");
                }
                None
            }
        }
    }

    fn store_tokens(&self, access: &str, refresh: &str) -> Result<(), ApiError> {
        self.client
            .tokens()
            .set_tokens(access, refresh)
            .map_err(|e| ApiError::new(ErrorCode::Internal, format!("store tokens: {e:#}")))
    }

    fn signed_in(&self, user: User) {
        *self.user.lock() = Some(user.clone());
        self.bus.emit(ChatEvent::Session(SessionEvent::LoggedIn(Box::new(user))));
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let user = self.user.lock().as_ref().map(|u| u.username.clone());
        f.debug_struct("SessionManager").field("user", &user).finish()
    }
}

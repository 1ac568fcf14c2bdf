// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight access token refresh.
//!
//! The first caller that needs a new token becomes the refresher; callers
//! arriving while it runs wait on a FIFO queue and receive its outcome.
//! A failed refresh clears the stored tokens and announces
//! [`SessionEvent::LoginRequired`] on the bus.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::bus::{ChatEvent, EventBus, SessionEvent};
use crate::token::TokenStore;

/// Why a caller did not get a fresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// No refresh token is stored; the refresh endpoint was not called.
    NoRefreshToken,
    /// The refresh endpoint failed.
    Rejected(String),
    /// The refresher was cancelled before it finished.
    Abandoned,
}

impl std::fmt::Display for RefreshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoRefreshToken => f.write_str("no refresh token"),
            Self::Rejected(reason) => write!(f, "token refresh failed: {reason}"),
            Self::Abandoned => f.write_str("token refresh abandoned"),
        }
    }
}

impl std::error::Error for RefreshError {}

type RefreshOutcome = Result<String, RefreshError>;

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    pending: VecDeque<oneshot::Sender<RefreshOutcome>>,
}

enum Role {
    Refresher,
    Waiter(oneshot::Receiver<RefreshOutcome>),
    AlreadyFresh(String),
    /// The tokens were cleared after the request went out.
    SessionEnded,
}

/// Coordinates token refreshes for every request sharing one [`TokenStore`].
pub struct RefreshCoordinator {
    tokens: Arc<TokenStore>,
    bus: EventBus,
    state: Mutex<RefreshState>,
    refreshes: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(tokens: Arc<TokenStore>, bus: EventBus) -> Self {
        Self { tokens, bus, state: Mutex::new(RefreshState::default()), refreshes: AtomicU64::new(0) }
    }

    /// Obtain an access token to replace `stale`, the token a request was
    /// rejected with.
    ///
    /// - If a refresh is running, wait for it.
    /// - If the stored token already differs from `stale`, someone else
    ///   refreshed: return the stored token without calling `refresh_fn`.
    /// - If the tokens were cleared since, fail without another
    ///   `LoginRequired`.
    /// - Otherwise call `refresh_fn(refresh_token)` and share its result.
    pub async fn refresh<F, Fut>(&self, stale: Option<&str>, refresh_fn: F) -> RefreshOutcome
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = anyhow::Result<String>>,
    {
        let role = {
            let mut state = self.state.lock();
            if state.in_flight {
                let (tx, rx) = oneshot::channel();
                state.pending.push_back(tx);
                Role::Waiter(rx)
            } else {
                match self.tokens.access_token() {
                    Some(current) if Some(current.as_str()) != stale => Role::AlreadyFresh(current),
                    None if stale.is_some() => Role::SessionEnded,
                    _ => {
                        state.in_flight = true;
                        Role::Refresher
                    }
                }
            }
        };

        match role {
            Role::AlreadyFresh(token) => Ok(token),
            Role::SessionEnded => Err(RefreshError::NoRefreshToken),
            Role::Waiter(rx) => {
                debug!("waiting on in-flight token refresh");
                rx.await.unwrap_or(Err(RefreshError::Abandoned))
            }
            Role::Refresher => {
                let mut guard = InFlight { coordinator: self, finished: false };
                let outcome = self.run_refresh(refresh_fn).await;
                guard.finish(&outcome);
                if let Err(ref e) = outcome {
                    self.bus.emit(ChatEvent::Session(SessionEvent::LoginRequired {
                        reason: e.to_string(),
                    }));
                }
                outcome
            }
        }
    }

    async fn run_refresh<F, Fut>(&self, refresh_fn: F) -> RefreshOutcome
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = anyhow::Result<String>>,
    {
        let Some(refresh_token) = self.tokens.refresh_token() else {
            warn!("no refresh token stored, session expired");
            self.clear_tokens();
            return Err(RefreshError::NoRefreshToken);
        };

        self.refreshes.fetch_add(1, Ordering::Relaxed);
        match refresh_fn(refresh_token).await {
            Ok(access) => {
                if let Err(e) = self.tokens.set_access_token(&access) {
                    warn!(err = %e, "failed to persist refreshed access token");
                }
                info!("access token refreshed");
                Ok(access)
            }
            Err(e) => {
                warn!(err = %e, "token refresh failed, session expired");
                self.clear_tokens();
                Err(RefreshError::Rejected(e.to_string()))
            }
        }
    }

    fn clear_tokens(&self) {
        if let Err(e) = self.tokens.clear_tokens() {
            warn!(err = %e, "failed to clear stored tokens");
        }
    }

    /// Resolve every queued waiter, oldest first.
    fn drain(&self, outcome: &RefreshOutcome) {
        let pending = {
            let mut state = self.state.lock();
            state.in_flight = false;
            std::mem::take(&mut state.pending)
        };
        if !pending.is_empty() {
            debug!(waiters = pending.len(), ok = outcome.is_ok(), "draining refresh queue");
        }
        for waiter in pending {
            // Receiver gone means that request was cancelled.
            let _ = waiter.send(outcome.clone());
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.state.lock().in_flight
    }

    /// Callers currently queued behind the in-flight refresh.
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Number of times the refresh endpoint has been called.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }
}

/// Releases the in-flight flag even if the refresher's future is dropped.
struct InFlight<'a> {
    coordinator: &'a RefreshCoordinator,
    finished: bool,
}

impl InFlight<'_> {
    fn finish(&mut self, outcome: &RefreshOutcome) {
        self.finished = true;
        self.coordinator.drain(outcome);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.coordinator.drain(&Err(RefreshError::Abandoned));
        }
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;

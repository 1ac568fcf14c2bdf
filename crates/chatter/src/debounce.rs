// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delayed actions that collapse bursts of input.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::ChatApi;
use crate::error::ApiError;
use crate::model::Conversation;
use crate::socket::SocketManager;

/// How long after the last keystroke "stopped typing" is sent.
pub const TYPING_IDLE: Duration = Duration::from_millis(1000);
/// Delay between the last search keystroke and the search request.
pub const SEARCH_DELAY: Duration = Duration::from_millis(300);

/// Runs at most one pending action, `delay` after it was last scheduled.
///
/// Scheduling again replaces the pending action. [`cancel`](Self::cancel)
/// and drop discard it. Requires a tokio runtime.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Arc<Mutex<Option<CancellationToken>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, pending: Arc::new(Mutex::new(None)) }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `action` after the delay unless superseded or cancelled first.
    pub fn schedule<F>(&self, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        if let Some(previous) = self.pending.lock().replace(token.clone()) {
            previous.cancel();
        }
        let delay = self.delay;
        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    {
                        // A newer schedule() may have replaced us after the
                        // sleep finished.
                        let _pending = pending.lock();
                        if token.is_cancelled() {
                            return;
                        }
                        // Mark done before running so is_pending() reflects the fire.
                        token.cancel();
                    }
                    action.await;
                }
            }
        });
    }

    pub fn cancel(&self) {
        if let Some(token) = self.pending.lock().take() {
            token.cancel();
        }
    }

    /// Whether an action is waiting to fire.
    pub fn is_pending(&self) -> bool {
        self.pending.lock().as_ref().is_some_and(|t| !t.is_cancelled())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

type TypingSink = Arc<dyn Fn(bool) + Send + Sync>;

/// Sends "typing" on every keystroke and "stopped typing" once input goes
/// idle.
pub struct TypingNotifier {
    send: TypingSink,
    idle: Debouncer,
}

impl TypingNotifier {
    pub fn new(idle: Duration, send: impl Fn(bool) + Send + Sync + 'static) -> Self {
        Self { send: Arc::new(send), idle: Debouncer::new(idle) }
    }

    /// Notifier writing typing frames for `conversation_id` to `socket`.
    pub fn for_socket(socket: Arc<SocketManager>, conversation_id: i64) -> Self {
        Self::new(TYPING_IDLE, move |is_typing| {
            // Dropped silently while disconnected, like any other frame.
            socket.send_typing(conversation_id, is_typing);
        })
    }

    pub fn keystroke(&self) {
        (self.send)(true);
        let send = Arc::clone(&self.send);
        self.idle.schedule(async move { send(false) });
    }

    /// Send "stopped typing" now, e.g. after the message was submitted.
    pub fn stop(&self) {
        if self.idle.is_pending() {
            self.idle.cancel();
            (self.send)(false);
        }
    }
}

impl std::fmt::Debug for TypingNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypingNotifier").field("idle", &self.idle).finish()
    }
}

type SearchFn =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<Vec<Conversation>, ApiError>> + Send + Sync>;
type ResultsSink = Arc<dyn Fn(Vec<Conversation>) + Send + Sync>;

/// Debounced conversation search.
///
/// A blank query clears the results at once without a request. Results of
/// a query that was superseded, cancelled or dropped are discarded. A failed
/// search reports no results.
pub struct ConversationSearch {
    search: SearchFn,
    on_results: ResultsSink,
    generation: Arc<AtomicU64>,
    debouncer: Debouncer,
}

impl ConversationSearch {
    pub fn new<F, Fut>(
        delay: Duration,
        search: F,
        on_results: impl Fn(Vec<Conversation>) + Send + Sync + 'static,
    ) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Conversation>, ApiError>> + Send + 'static,
    {
        Self {
            search: Arc::new(move |query| search(query).boxed()),
            on_results: Arc::new(on_results),
            generation: Arc::new(AtomicU64::new(0)),
            debouncer: Debouncer::new(delay),
        }
    }

    /// Search through [`ChatApi::search_conversations`] after [`SEARCH_DELAY`].
    pub fn for_api(
        api: ChatApi,
        on_results: impl Fn(Vec<Conversation>) + Send + Sync + 'static,
    ) -> Self {
        Self::new(
            SEARCH_DELAY,
            move |query: String| {
                let api = api.clone();
                async move { api.search_conversations(&query).await.map(|page| page.results) }
            },
            on_results,
        )
    }

    /// Replace the query.
    pub fn set_query(&self, query: &str) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if query.trim().is_empty() {
            self.debouncer.cancel();
            (self.on_results)(Vec::new());
            return;
        }

        let search = Arc::clone(&self.search);
        let on_results = Arc::clone(&self.on_results);
        let current = Arc::clone(&self.generation);
        let query = query.to_owned();
        self.debouncer.schedule(async move {
            let results = match search(query.clone()).await {
                Ok(results) => results,
                Err(e) => {
                    warn!(query = %query, err = %e, "conversation search failed");
                    Vec::new()
                }
            };
            if current.load(Ordering::SeqCst) == generation {
                on_results(results);
            } else {
                debug!(query = %query, "discarding superseded search results");
            }
        });
    }

    /// Drop the pending search and any results still in flight.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.debouncer.cancel();
    }

    /// Whether a search is waiting for the input to settle.
    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending()
    }
}

impl Drop for ConversationSearch {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for ConversationSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationSearch")
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .field("debouncer", &self.debouncer)
            .finish()
    }
}

#[cfg(test)]
#[path = "debounce_tests.rs"]
mod tests;

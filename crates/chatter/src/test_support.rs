// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for unit and integration tests.

use std::sync::{Arc, Once};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;

use crate::bus::{ChatEvent, EventBus, EventKind, Subscription};
use crate::clock::{epoch_secs, ManualClock};
use crate::token::storage::MemoryStorage;
use crate::token::TokenStore;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times; only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Build an unsigned JWT whose payload is `{"exp": exp, "user_id": user_id}`.
pub fn jwt(exp: u64, user_id: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp},"user_id":{user_id}}}"#));
    format!("{header}.{payload}.signature")
}

/// A JWT valid for the next hour.
pub fn fresh_jwt(user_id: i64) -> String {
    jwt(epoch_secs() + 3600, user_id)
}

/// A JWT that expired an hour ago.
pub fn expired_jwt(user_id: i64) -> String {
    jwt(epoch_secs().saturating_sub(3600), user_id)
}

/// In-memory token store on the system clock.
pub fn memory_store() -> Arc<TokenStore> {
    Arc::new(TokenStore::new(MemoryStorage::new()))
}

/// In-memory token store on a manual clock starting at `now`.
pub fn manual_store(now: u64) -> (Arc<TokenStore>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(now));
    let store = Arc::new(TokenStore::with_clock(MemoryStorage::new(), clock.clone()));
    (store, clock)
}

/// Collects every event of one kind emitted on a bus.
pub struct Recorder {
    events: Arc<Mutex<Vec<ChatEvent>>>,
    _subscription: Subscription,
}

impl Recorder {
    pub fn attach(bus: &EventBus, kind: EventKind) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let subscription = bus.on(kind, move |event| sink.lock().push(event.clone()));
        Self { events, _subscription: subscription }
    }

    pub fn events(&self) -> Vec<ChatEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

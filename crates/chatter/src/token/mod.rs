// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token store: the persisted access/refresh pair and theme preference.
//!
//! Reads and writes go straight to the storage backend so every mutation is
//! durable when the call returns. Expiry is decided from the access token's
//! own `exp` claim against an injectable [`Clock`].

pub mod storage;

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::token::storage::TokenStorage;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const THEME_MODE_KEY: &str = "theme_mode";

/// Claims read from a JWT access token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Expiry as epoch seconds.
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

/// Decode the payload segment of a JWT without verifying its signature.
///
/// Returns `None` for anything that is not a three-segment token with a
/// base64url JSON payload carrying a numeric `exp`.
pub fn decode_claims(token: &str) -> Option<TokenClaims> {
    let mut parts = token.split('.');
    let (_header, payload, _sig) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Snapshot of the authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// `exp` of the access token, if it decodes.
    pub expires_at: Option<u64>,
}

/// Persisted UI colour scheme.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Light,
    Dark,
}

impl ThemeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }
}

impl std::fmt::Display for ThemeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ThemeMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            other => anyhow::bail!("invalid theme mode: {other}"),
        }
    }
}

/// Owner of the persisted credential pair.
pub struct TokenStore {
    storage: Box<dyn TokenStorage>,
    clock: Arc<dyn Clock>,
}

impl TokenStore {
    pub fn new(storage: impl TokenStorage + 'static) -> Self {
        Self::with_clock(storage, Arc::new(SystemClock))
    }

    pub fn with_clock(storage: impl TokenStorage + 'static, clock: Arc<dyn Clock>) -> Self {
        Self { storage: Box::new(storage), clock }
    }

    /// Store both tokens in one write.
    pub fn set_tokens(&self, access: &str, refresh: &str) -> anyhow::Result<()> {
        self.storage.set_many(&[(ACCESS_TOKEN_KEY, access), (REFRESH_TOKEN_KEY, refresh)])
    }

    /// Replace only the access token (after a refresh).
    pub fn set_access_token(&self, access: &str) -> anyhow::Result<()> {
        self.storage.set(ACCESS_TOKEN_KEY, access)
    }

    pub fn access_token(&self) -> Option<String> {
        self.storage.get(ACCESS_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.storage.get(REFRESH_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    /// Remove both tokens in one write. The theme preference is kept.
    pub fn clear_tokens(&self) -> anyhow::Result<()> {
        self.storage.remove_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY])
    }

    pub fn session(&self) -> Option<Session> {
        let access_token = self.access_token()?;
        let expires_at = decode_claims(&access_token).map(|c| c.exp);
        Some(Session { access_token, refresh_token: self.refresh_token(), expires_at })
    }

    /// True when an access token is stored, decodes, and has not expired.
    pub fn is_authenticated(&self) -> bool {
        match self.access_token() {
            Some(token) => !self.is_token_expired(&token),
            None => false,
        }
    }

    /// True when `token` is expired or cannot be decoded.
    pub fn is_token_expired(&self, token: &str) -> bool {
        match decode_claims(token) {
            Some(claims) => claims.exp <= self.clock.now_secs(),
            None => true,
        }
    }

    /// `user_id` claim of the stored access token.
    pub fn user_id(&self) -> Option<i64> {
        self.access_token().and_then(|t| decode_claims(&t)).and_then(|c| c.user_id)
    }

    /// Stored theme, falling back to light when unset or unrecognised.
    pub fn theme(&self) -> ThemeMode {
        self.storage
            .get(THEME_MODE_KEY)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }

    pub fn set_theme(&self, mode: ThemeMode) -> anyhow::Result<()> {
        self.storage.set(THEME_MODE_KEY, mode.as_str())
    }

    pub fn toggle_theme(&self) -> anyhow::Result<ThemeMode> {
        let next = self.theme().toggled();
        self.set_theme(next)?;
        Ok(next)
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("has_access", &self.access_token().is_some())
            .field("has_refresh", &self.refresh_token().is_some())
            .finish()
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

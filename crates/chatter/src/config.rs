// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use crate::socket::ReconnectPolicy;

/// Connection settings for the chat service.
#[derive(Debug, Clone, clap::Args)]
pub struct ClientConfig {
    /// Base URL of the chat REST API.
    #[arg(long, default_value = "http://127.0.0.1:8000", env = "CHATTER_API_URL")]
    pub api_url: String,

    /// Base URL of the chat socket. Derived from `--api-url` when unset.
    #[arg(long, env = "CHATTER_WS_URL")]
    pub ws_url: Option<String>,

    /// Directory holding the persisted session file.
    #[arg(long, env = "CHATTER_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Per-request HTTP timeout in milliseconds.
    #[arg(long, default_value_t = 10000, env = "CHATTER_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// First reconnect delay in milliseconds; doubles on every attempt.
    #[arg(long, default_value_t = 1000, env = "CHATTER_RECONNECT_BASE_MS")]
    pub reconnect_base_ms: u64,

    /// Upper bound for a single reconnect delay in milliseconds.
    #[arg(long, default_value_t = 30000, env = "CHATTER_RECONNECT_MAX_MS")]
    pub reconnect_max_ms: u64,

    /// Reconnect attempts before giving up until the next explicit connect.
    #[arg(long, default_value_t = 5, env = "CHATTER_MAX_RECONNECT_ATTEMPTS")]
    pub max_reconnect_attempts: u32,
}

impl ClientConfig {
    /// Defaults for everything except the API URL.
    pub fn with_api_url(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ws_url: None,
            state_dir: None,
            request_timeout_ms: 10000,
            reconnect_base_ms: 1000,
            reconnect_max_ms: 30000,
            max_reconnect_attempts: 5,
        }
    }

    pub fn api_base(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }

    /// Socket base URL: `--ws-url` if given, else the API URL with its
    /// scheme switched to `ws`/`wss`.
    pub fn ws_base(&self) -> String {
        if let Some(ref url) = self.ws_url {
            return url.trim_end_matches('/').to_owned();
        }
        let base = self.api_base();
        if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_owned()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base: Duration::from_millis(self.reconnect_base_ms),
            max_delay: Duration::from_millis(self.reconnect_max_ms),
            max_attempts: self.max_reconnect_attempts,
        }
    }

    /// Resolve the state directory.
    ///
    /// Checks `--state-dir`/`CHATTER_STATE_DIR`, then `$XDG_STATE_HOME/chatter`,
    /// then `$HOME/.local/state/chatter`.
    pub fn state_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.state_dir {
            return dir.clone();
        }
        if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
            return PathBuf::from(xdg).join("chatter");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local/state/chatter");
        }
        PathBuf::from(".chatter")
    }

    pub fn session_file(&self) -> PathBuf {
        self.state_dir().join("session.json")
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

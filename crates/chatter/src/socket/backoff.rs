// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reconnect timing and close-code classification.

use std::time::Duration;

pub const CLOSE_NORMAL: u16 = 1000;
/// Reported locally when the connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;
pub const CLOSE_GENERAL_ERROR: u16 = 4000;
pub const CLOSE_NO_TOKEN: u16 = 4001;
pub const CLOSE_INVALID_TOKEN: u16 = 4002;

/// What to do after the socket closed with a given code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// Stay disconnected until the next explicit connect.
    Terminal,
    Reconnect,
}

/// Classify a close code.
///
/// Normal closure and auth rejections are final: retrying with the same
/// token would be rejected the same way. Everything else is retried.
pub fn classify_close(code: u16) -> CloseAction {
    match code {
        CLOSE_NORMAL | CLOSE_NO_TOKEN | CLOSE_INVALID_TOKEN => CloseAction::Terminal,
        _ => CloseAction::Reconnect,
    }
}

/// Human-readable meaning of the close codes the chat server uses.
pub fn describe_close(code: u16) -> &'static str {
    match code {
        CLOSE_NORMAL => "normal closure",
        CLOSE_ABNORMAL => "abnormal closure",
        CLOSE_GENERAL_ERROR => "general error",
        CLOSE_NO_TOKEN => "no token provided",
        CLOSE_INVALID_TOKEN => "invalid token or user not found",
        _ => "unexpected close",
    }
}

/// Bounded exponential backoff: `min(base * 2^attempt, max_delay)` for at
/// most `max_attempts` attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30000),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Uncapped-count delay for the zero-based `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Delay before reconnect attempt `attempt`, or `None` once the attempt
    /// budget is spent.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            None
        } else {
            Some(self.delay_for(attempt))
        }
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;

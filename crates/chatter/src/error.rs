// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for failures surfaced by the chat client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The session could not be (re)authenticated; the user must log in.
    Unauthorized,
    /// The server rejected the request (validation or business rule).
    BadRequest,
    NotFound,
    /// The request never produced a response (DNS, connect, timeout).
    Network,
    /// The server answered 5xx.
    Upstream,
    Internal,
}

impl ErrorCode {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Unauthorized,
            404 => Self::NotFound,
            400..=499 => Self::BadRequest,
            500..=599 => Self::Upstream,
            _ => Self::Internal,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::Network => 503,
            Self::Upstream => 502,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::NotFound => "NOT_FOUND",
            Self::Network => "NETWORK",
            Self::Upstream => "UPSTREAM_ERROR",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed gateway call.
///
/// `message` carries the server's `detail` text when the response body has
/// one, so callers can show it to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub code: ErrorCode,
    /// HTTP status, or `None` when no response was received.
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, status: None, message: message.into() }
    }

    /// Build an error from a non-success response status and its body.
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = extract_detail(body).unwrap_or_else(|| format!("request failed ({status})"));
        Self { code: ErrorCode::from_status(status), status: Some(status), message }
    }

    pub fn network(err: &reqwest::Error) -> Self {
        Self::new(ErrorCode::Network, err.to_string())
    }

    pub fn is_unauthorized(&self) -> bool {
        self.code == ErrorCode::Unauthorized
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({status}): {}", self.code, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

impl std::error::Error for ApiError {}

/// Pull a human-readable message out of an error body.
///
/// Accepts `{"detail": "..."}`, `{"error": {"message": "..."}}`, and
/// field-error maps like `{"username": ["already taken"]}`.
fn extract_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    if let Some(detail) = value.get("detail").and_then(|v| v.as_str()) {
        return Some(detail.to_owned());
    }
    if let Some(msg) = value.pointer("/error/message").and_then(|v| v.as_str()) {
        return Some(msg.to_owned());
    }
    let fields = value.as_object()?;
    let parts: Vec<String> = fields
        .iter()
        .filter_map(|(field, errs)| {
            let first = errs.as_array()?.first()?.as_str()?;
            Some(format!("{field}: {first}"))
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

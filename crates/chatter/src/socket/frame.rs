// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket frame parsing and bus dispatch.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bus::{ChatEvent, EventBus, EventKind};
use crate::model::{Message, TypingNotification};

pub const CHAT_MESSAGE: &str = "chat.message";
pub const TYPING_NOTIFICATION: &str = "typing.notification";

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    ChatMessage(Message),
    Typing(TypingNotification),
    /// A well-formed frame with a `type` this client does not handle.
    Unknown(String),
}

/// Why an inbound frame could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    NotJson(String),
    MissingType,
    /// `chat.message` without a usable `message` body.
    BadMessage(String),
    BadTyping(String),
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotJson(e) => write!(f, "frame is not JSON: {e}"),
            Self::MissingType => f.write_str("frame has no type"),
            Self::BadMessage(e) => write!(f, "bad chat.message body: {e}"),
            Self::BadTyping(e) => write!(f, "bad typing.notification: {e}"),
        }
    }
}

impl std::error::Error for FrameError {}

/// Parse one text frame.
pub fn parse_frame(text: &str) -> Result<InboundFrame, FrameError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| FrameError::NotJson(e.to_string()))?;
    let frame_type =
        value.get("type").and_then(|t| t.as_str()).ok_or(FrameError::MissingType)?.to_owned();

    match frame_type.as_str() {
        CHAT_MESSAGE => {
            let body = value
                .get("message")
                .filter(|m| m.is_object())
                .ok_or_else(|| FrameError::BadMessage("missing message".to_owned()))?;
            let message = Message::deserialize(body)
                .map_err(|e| FrameError::BadMessage(e.to_string()))?;
            Ok(InboundFrame::ChatMessage(message))
        }
        TYPING_NOTIFICATION => {
            let typing = TypingNotification::deserialize(&value)
                .map_err(|e| FrameError::BadTyping(e.to_string()))?;
            Ok(InboundFrame::Typing(typing))
        }
        _ => Ok(InboundFrame::Unknown(frame_type)),
    }
}

/// Parse `text` and publish the result on `bus`.
///
/// Returns the kind emitted, or `None` when the frame was dropped.
pub fn dispatch_frame(text: &str, bus: &EventBus) -> Option<EventKind> {
    match parse_frame(text) {
        Ok(InboundFrame::ChatMessage(message)) => {
            debug!(id = message.id, conversation = message.conversation, "chat message received");
            bus.emit(ChatEvent::Message(message));
            Some(EventKind::Message)
        }
        Ok(InboundFrame::Typing(typing)) => {
            debug!(
                user = typing.user_id,
                conversation = typing.conversation_id,
                is_typing = typing.is_typing,
                "typing notification received"
            );
            bus.emit(ChatEvent::Typing(typing));
            Some(EventKind::Typing)
        }
        Ok(InboundFrame::Unknown(frame_type)) => {
            debug!(frame_type, "ignoring unknown frame type");
            None
        }
        Err(e) => {
            warn!(err = %e, "dropping malformed frame");
            None
        }
    }
}

/// Frames this client sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Typing { conversation_id: i64, is_typing: bool },
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;

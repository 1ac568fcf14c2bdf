// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Who is typing in the open conversation.

use crate::model::TypingNotification;

/// Typing peers of one conversation, in the order they started typing.
#[derive(Debug, Clone, Default)]
pub struct TypingTracker {
    conversation_id: i64,
    me: Option<i64>,
    users: Vec<(i64, String)>,
}

impl TypingTracker {
    /// Track `conversation_id`, ignoring notifications about `me`.
    pub fn new(conversation_id: i64, me: Option<i64>) -> Self {
        Self { conversation_id, me, users: Vec::new() }
    }

    /// Apply a notification. Returns whether the typing set changed.
    pub fn apply(&mut self, note: &TypingNotification) -> bool {
        if note.conversation_id != self.conversation_id || Some(note.user_id) == self.me {
            return false;
        }
        let present = self.users.iter().position(|(id, _)| *id == note.user_id);
        match (note.is_typing, present) {
            (true, None) => {
                self.users.push((note.user_id, note.username.clone()));
                true
            }
            (false, Some(index)) => {
                self.users.remove(index);
                true
            }
            _ => false,
        }
    }

    pub fn usernames(&self) -> Vec<&str> {
        self.users.iter().map(|(_, name)| name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn clear(&mut self) {
        self.users.clear();
    }

    /// `"alice is typing..."`, `"alice, bob are typing..."`, or `None`.
    pub fn indicator(&self) -> Option<String> {
        let verb = match self.users.len() {
            0 => return None,
            1 => "is",
            _ => "are",
        };
        Some(format!("{} {verb} typing...", self.usernames().join(", ")))
    }
}

#[cfg(test)]
#[path = "typing_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn note(user_id: i64, username: &str, conversation_id: i64, is_typing: bool) -> TypingNotification {
    TypingNotification { user_id, username: username.to_owned(), conversation_id, is_typing }
}

#[test]
fn indicator_text() {
    let mut tracker = TypingTracker::new(7, Some(1));
    assert_eq!(tracker.indicator(), None);

    assert!(tracker.apply(&note(2, "alice", 7, true)));
    assert_eq!(tracker.indicator().as_deref(), Some("alice is typing..."));

    assert!(tracker.apply(&note(3, "bob", 7, true)));
    assert_eq!(tracker.indicator().as_deref(), Some("alice, bob are typing..."));

    assert!(tracker.apply(&note(2, "alice", 7, false)));
    assert_eq!(tracker.indicator().as_deref(), Some("bob is typing..."));
}

#[yare::parameterized(
    self_typing = { note(1, "me", 7, true) },
    other_conversation = { note(2, "alice", 8, true) },
    stop_without_start = { note(2, "alice", 7, false) },
)]
fn ignored_notifications(n: TypingNotification) {
    let mut tracker = TypingTracker::new(7, Some(1));
    assert!(!tracker.apply(&n));
    assert!(tracker.is_empty());
}

#[test]
fn repeated_start_is_not_duplicated() {
    let mut tracker = TypingTracker::new(7, None);
    assert!(tracker.apply(&note(2, "alice", 7, true)));
    assert!(!tracker.apply(&note(2, "alice", 7, true)));
    assert_eq!(tracker.usernames(), vec!["alice"]);

    tracker.clear();
    assert!(tracker.is_empty());
}

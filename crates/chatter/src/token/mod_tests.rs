// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::storage::{FileStorage, MemoryStorage, TokenStorage};
use super::*;
use crate::test_support::{jwt, manual_store};

const NOW: u64 = 1_700_000_000;

// ── decode_claims ─────────────────────────────────────────────────────

#[test]
fn decode_reads_exp_and_user_id() {
    let claims = decode_claims(&jwt(NOW, 42));
    assert_eq!(claims, Some(TokenClaims { exp: NOW, user_id: Some(42) }));
}

#[yare::parameterized(
    empty = { "" },
    one_segment = { "abc" },
    two_segments = { "abc.def" },
    four_segments = { "a.b.c.d" },
    not_base64 = { "a.!!!.c" },
    not_json = { "a.bm90IGpzb24.c" },
    missing_exp = { "a.eyJ1c2VyX2lkIjoxfQ.c" },
)]
fn decode_rejects_malformed(token: &str) {
    assert!(decode_claims(token).is_none());
}

// ── is_authenticated / is_token_expired ───────────────────────────────

#[test]
fn unauthenticated_without_token() {
    let (store, _clock) = manual_store(NOW);
    assert!(!store.is_authenticated());
}

#[test]
fn authenticated_with_future_exp() -> anyhow::Result<()> {
    let (store, _clock) = manual_store(NOW);
    store.set_tokens(&jwt(NOW + 60, 1), "refresh")?;
    assert!(store.is_authenticated());
    Ok(())
}

#[test]
fn unauthenticated_with_past_exp() -> anyhow::Result<()> {
    let (store, _clock) = manual_store(NOW);
    store.set_tokens(&jwt(NOW - 60, 1), "refresh")?;
    assert!(!store.is_authenticated());
    Ok(())
}

#[test]
fn malformed_token_is_unauthenticated_not_a_panic() -> anyhow::Result<()> {
    let (store, _clock) = manual_store(NOW);
    store.set_tokens("definitely.not.a-jwt", "refresh")?;
    assert!(!store.is_authenticated());
    assert!(store.is_token_expired("garbage"));
    Ok(())
}

#[test]
fn expiry_follows_the_clock() -> anyhow::Result<()> {
    let (store, clock) = manual_store(NOW);
    store.set_tokens(&jwt(NOW + 60, 1), "refresh")?;
    assert!(store.is_authenticated());
    clock.advance(61);
    assert!(!store.is_authenticated());
    Ok(())
}

// ── mutation ──────────────────────────────────────────────────────────

#[test]
fn set_access_token_keeps_refresh() -> anyhow::Result<()> {
    let (store, _clock) = manual_store(NOW);
    store.set_tokens("a1", "r1")?;
    store.set_access_token("a2")?;
    assert_eq!(store.access_token().as_deref(), Some("a2"));
    assert_eq!(store.refresh_token().as_deref(), Some("r1"));
    Ok(())
}

#[test]
fn clear_removes_tokens_but_keeps_theme() -> anyhow::Result<()> {
    let (store, _clock) = manual_store(NOW);
    store.set_tokens("a1", "r1")?;
    store.set_theme(ThemeMode::Dark)?;
    store.clear_tokens()?;
    assert!(store.access_token().is_none());
    assert!(store.refresh_token().is_none());
    assert!(store.session().is_none());
    assert_eq!(store.theme(), ThemeMode::Dark);
    Ok(())
}

#[test]
fn session_snapshot_carries_expiry() -> anyhow::Result<()> {
    let (store, _clock) = manual_store(NOW);
    let access = jwt(NOW + 300, 7);
    store.set_tokens(&access, "r")?;
    let session = store.session();
    assert_eq!(
        session,
        Some(Session {
            access_token: access,
            refresh_token: Some("r".to_owned()),
            expires_at: Some(NOW + 300),
        })
    );
    assert_eq!(store.user_id(), Some(7));
    Ok(())
}

// ── theme ─────────────────────────────────────────────────────────────

#[test]
fn theme_defaults_to_light_and_toggles() -> anyhow::Result<()> {
    let store = TokenStore::new(MemoryStorage::new());
    assert_eq!(store.theme(), ThemeMode::Light);
    assert_eq!(store.toggle_theme()?, ThemeMode::Dark);
    assert_eq!(store.theme(), ThemeMode::Dark);
    assert_eq!(store.toggle_theme()?, ThemeMode::Light);
    Ok(())
}

#[test]
fn unknown_theme_value_falls_back_to_light() -> anyhow::Result<()> {
    let storage = MemoryStorage::new();
    storage.set(THEME_MODE_KEY, "sepia")?;
    let store = TokenStore::new(storage);
    assert_eq!(store.theme(), ThemeMode::Light);
    Ok(())
}

// ── file storage ──────────────────────────────────────────────────────

#[test]
fn file_storage_persists_across_reopen() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("nested").join("session.json");

    let store = TokenStore::new(FileStorage::open(&path)?);
    store.set_tokens("access", "refresh")?;
    store.set_theme(ThemeMode::Dark)?;
    drop(store);

    let reopened = TokenStore::new(FileStorage::open(&path)?);
    assert_eq!(reopened.access_token().as_deref(), Some("access"));
    assert_eq!(reopened.refresh_token().as_deref(), Some("refresh"));
    assert_eq!(reopened.theme(), ThemeMode::Dark);

    reopened.clear_tokens()?;
    let contents = std::fs::read_to_string(&path)?;
    assert!(!contents.contains("access_token"));
    assert!(!contents.contains("refresh_token"));
    Ok(())
}

#[test]
fn file_storage_rejects_corrupt_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.json");
    std::fs::write(&path, "{not json")?;
    assert!(FileStorage::open(&path).is_err());
    Ok(())
}

/// Replace the storage file's directory with a plain file so the next
/// flush fails.
fn break_state_dir(dir: &std::path::Path) -> anyhow::Result<()> {
    std::fs::remove_dir_all(dir)?;
    std::fs::write(dir, "not a directory")?;
    Ok(())
}

#[test]
fn failed_clear_keeps_token_pair_intact() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let state_dir = dir.path().join("state");
    let store = TokenStore::new(FileStorage::open(state_dir.join("session.json"))?);
    store.set_tokens("access-1", "refresh-1")?;

    break_state_dir(&state_dir)?;
    assert!(store.clear_tokens().is_err());

    assert_eq!(store.access_token().as_deref(), Some("access-1"));
    assert_eq!(store.refresh_token().as_deref(), Some("refresh-1"));
    Ok(())
}

#[test]
fn failed_write_leaves_memory_unchanged() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let state_dir = dir.path().join("state");
    let store = TokenStore::new(FileStorage::open(state_dir.join("session.json"))?);
    store.set_tokens("access-1", "refresh-1")?;

    break_state_dir(&state_dir)?;
    assert!(store.set_tokens("access-2", "refresh-2").is_err());
    assert!(store.set_theme(ThemeMode::Dark).is_err());

    assert_eq!(store.access_token().as_deref(), Some("access-1"));
    assert_eq!(store.refresh_token().as_deref(), Some("refresh-1"));
    assert_eq!(store.theme(), ThemeMode::Light);
    Ok(())
}

#[test]
fn clear_writes_the_pair_removal_at_once() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.json");
    let storage = FileStorage::open(&path)?;
    storage.set_many(&[("access_token", "a"), ("refresh_token", "r"), ("theme_mode", "dark")])?;

    storage.remove_many(&["access_token", "refresh_token", "missing"])?;

    let on_disk: std::collections::BTreeMap<String, String> =
        serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(on_disk.len(), 1);
    assert_eq!(on_disk.get("theme_mode").map(String::as_str), Some("dark"));
    assert_eq!(storage.get("access_token"), None);
    Ok(())
}

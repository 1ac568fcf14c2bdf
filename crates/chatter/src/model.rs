// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire types for the chat REST API and socket frames.
//!
//! Records are lenient on input: missing fields and explicit `null`s fall
//! back to defaults, so partial payloads pushed over the socket still decode.

use serde::{Deserialize, Deserializer, Serialize};

use crate::token::ThemeMode;

/// Deserialize `null` as `T::default()`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Online,
    #[default]
    Offline,
    Busy,
    Away,
    Invisible,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub notifications: bool,
    pub theme: ThemeMode,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self { notifications: true, theme: ThemeMode::Light }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    #[serde(deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub username: String,
    #[serde(deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(deserialize_with = "null_as_default")]
    pub first_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub last_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub phone: String,
    pub avatar_url: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub status: UserStatus,
    pub last_seen_at: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub is_verified: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub is_active: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub is_blocked: bool,
    pub settings: UserSettings,
    #[serde(deserialize_with = "null_as_default")]
    pub created_at: String,
    #[serde(deserialize_with = "null_as_default")]
    pub updated_at: String,
}

impl User {
    pub fn is_online(&self) -> bool {
        self.status == UserStatus::Online
    }

    /// "First Last", falling back to the username.
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_owned()
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    #[default]
    Direct,
    Group,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Owner,
    Admin,
    #[default]
    Member,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Participant {
    pub id: i64,
    pub conversation: i64,
    pub user: User,
    pub role: ParticipantRole,
    pub nickname: Option<String>,
    pub last_read_message: Option<i64>,
    pub is_muted: bool,
    pub joined_at: String,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Conversation {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: ConversationKind,
    pub title: String,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
    pub creator: i64,
    pub participants: Vec<Participant>,
    pub last_message: Option<serde_json::Value>,
    pub last_activity_at: String,
    pub created_at: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    #[serde(deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub conversation: i64,
    pub sender: Option<User>,
    pub reply_to: Option<i64>,
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub kind: MessageKind,
    #[serde(deserialize_with = "null_as_default")]
    pub content: String,
    pub metadata: Option<serde_json::Value>,
    #[serde(deserialize_with = "null_as_default")]
    pub is_edited: bool,
    pub delivered_at: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub created_at: String,
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub links: PageLinks,
    #[serde(default)]
    pub count: u64,
    #[serde(default = "one")]
    pub total_pages: u32,
    #[serde(default = "one")]
    pub current_page: u32,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn has_more(&self) -> bool {
        self.current_page < self.total_pages
    }
}

fn one() -> u32 {
    1
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLinks {
    pub next: Option<String>,
    pub previous: Option<String>,
}

/// A peer started or stopped typing in a conversation.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypingNotification {
    #[serde(deserialize_with = "null_as_default")]
    pub user_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub username: String,
    #[serde(deserialize_with = "null_as_default")]
    pub conversation_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub is_typing: bool,
}

// -- Requests / responses ----------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username_or_email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub settings: UserSettings,
}

/// Register responses always carry the user; tokens only when the server
/// logs the new account straight in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user: User,
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default)]
    pub refresh: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConversation {
    #[serde(rename = "type")]
    pub kind: ConversationKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub creator: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddParticipants {
    pub user_ids: Vec<i64>,
    pub role: ParticipantRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessage {
    pub conversation: i64,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    pub reply_to: Option<i64>,
    pub metadata: Option<serde_json::Value>,
    pub is_edited: bool,
}

impl SendMessage {
    pub fn text(conversation: i64, content: impl Into<String>) -> Self {
        Self {
            conversation,
            kind: MessageKind::Text,
            content: content.into(),
            reply_to: None,
            metadata: None,
            is_edited: false,
        }
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed wrappers over the chat REST endpoints.

use std::sync::Arc;

use tracing::debug;

use crate::error::ApiError;
use crate::http::ApiClient;
use crate::model::{
    AddParticipants, Conversation, ConversationKind, CreateConversation, Message, MessageKind,
    Page, ParticipantRole, SendMessage, User,
};

/// Default page size for listings.
pub const PAGE_SIZE: u32 = 20;

/// Parameters for [`ChatApi::users`].
#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub search: Option<String>,
}

/// Chat endpoints on top of the authenticated gateway.
#[derive(Debug, Clone)]
pub struct ChatApi {
    client: Arc<ApiClient>,
}

impl ChatApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    pub async fn conversations(&self, page: u32, page_size: u32) -> Result<Page<Conversation>, ApiError> {
        let query = [("page", page.to_string()), ("page_size", page_size.to_string())];
        self.client.get_json("/api/conversations/", &query).await
    }

    pub async fn search_conversations(&self, search: &str) -> Result<Page<Conversation>, ApiError> {
        self.client.get_json("/api/conversations/", &[("search", search.to_owned())]).await
    }

    /// The direct conversation between two users, if one exists.
    pub async fn find_direct(&self, user1: i64, user2: i64) -> Result<Option<Conversation>, ApiError> {
        let query = [("user1", user1.to_string()), ("user2", user2.to_string())];
        match self.client.get_json("/api/conversations/find-direct/", &query).await {
            Ok(conversation) => Ok(Some(conversation)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn create_conversation(&self, data: &CreateConversation) -> Result<Conversation, ApiError> {
        self.client.post_json("/api/conversations/", data).await
    }

    pub async fn add_participants(
        &self,
        conversation_id: i64,
        user_ids: Vec<i64>,
        role: ParticipantRole,
    ) -> Result<(), ApiError> {
        let path = format!("/api/conversations/{conversation_id}/add-participants/");
        let _: serde_json::Value =
            self.client.post_json(&path, &AddParticipants { user_ids, role }).await?;
        Ok(())
    }

    /// Find or create the direct conversation between `me` and `other`.
    pub async fn open_direct(&self, me: i64, other: &User) -> Result<Conversation, ApiError> {
        if let Some(existing) = self.find_direct(me, other.id).await? {
            debug!(conversation = existing.id, peer = other.id, "reusing direct conversation");
            return Ok(existing);
        }

        let data = CreateConversation {
            kind: ConversationKind::Direct,
            title: format!("Chat with {}", other.username),
            description: Some("Direct conversation".to_owned()),
            avatar_url: None,
            creator: me,
        };
        let conversation = self.create_conversation(&data).await?;
        self.add_participants(conversation.id, vec![other.id], ParticipantRole::Member).await?;
        debug!(conversation = conversation.id, peer = other.id, "created direct conversation");
        Ok(conversation)
    }

    /// One page of a conversation's history, oldest message first.
    pub async fn messages(
        &self,
        conversation_id: i64,
        page: u32,
        page_size: u32,
    ) -> Result<Page<Message>, ApiError> {
        let query = [
            ("conversation", conversation_id.to_string()),
            ("page", page.to_string()),
            ("page_size", page_size.to_string()),
        ];
        let mut page: Page<Message> = self.client.get_json("/api/messages/", &query).await?;
        page.results.reverse();
        Ok(page)
    }

    pub async fn send_message(&self, message: &SendMessage) -> Result<Message, ApiError> {
        self.client.post_json("/api/messages/", message).await
    }

    /// Send a plain text message.
    pub async fn send_text(&self, conversation_id: i64, content: &str) -> Result<Message, ApiError> {
        self.send_message(&SendMessage::text(conversation_id, content)).await
    }

    /// Send a message of any kind, optionally as a reply.
    pub async fn send_with(
        &self,
        conversation_id: i64,
        content: &str,
        kind: MessageKind,
        reply_to: Option<i64>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Message, ApiError> {
        let message = SendMessage {
            kind,
            reply_to,
            metadata,
            ..SendMessage::text(conversation_id, content)
        };
        self.send_message(&message).await
    }

    pub async fn users(&self, query: &UserQuery) -> Result<Page<User>, ApiError> {
        let mut params = Vec::new();
        if let Some(page) = query.page {
            params.push(("page", page.to_string()));
        }
        if let Some(page_size) = query.page_size {
            params.push(("page_size", page_size.to_string()));
        }
        if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
            params.push(("search", search.to_owned()));
        }
        self.client.get_json("/api/users/", &params).await
    }

    pub async fn me(&self) -> Result<User, ApiError> {
        self.client.get_json("/api/users/me/", &[]).await
    }
}

// ABOUTME: Conversation CRUD service with ownership checks and cascading deletes
// ABOUTME: Validates titles and paging, and keeps delete retryable when a cascade fails
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Braid Project

use std::sync::Arc;

use tracing::info;

use crate::errors::{AppError, AppResult};
use crate::models::{Conversation, MessageNode, MAX_TITLE_LEN};
use crate::store::{ConversationStore, MessageStore, Page};

/// Upper bound for `page_size` on listings
const MAX_PAGE_SIZE: u32 = 100;

/// Conversation CRUD operations
#[derive(Clone)]
pub struct ConversationService {
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
}

impl ConversationService {
    /// Create the service
    #[must_use]
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            conversations,
            messages,
        }
    }

    /// Create a conversation with an empty title
    ///
    /// No message is created here; the client sends the first question to
    /// `/chat` afterwards.
    ///
    /// # Errors
    ///
    /// Returns validation or store errors.
    pub async fn create(&self, user_id: &str, model: &str) -> AppResult<Conversation> {
        if user_id.trim().is_empty() {
            return Err(AppError::missing_field("user_id"));
        }
        if model.trim().is_empty() {
            return Err(AppError::missing_field("model"));
        }

        let conversation = self.conversations.create(user_id, model).await?;
        info!("Created conversation {}", conversation.id);
        Ok(conversation)
    }

    /// List a user's conversations, most recently updated first
    ///
    /// # Errors
    ///
    /// Returns validation or store errors.
    pub async fn list(
        &self,
        user_id: &str,
        page: u32,
        page_size: u32,
    ) -> AppResult<Page<Conversation>> {
        if user_id.trim().is_empty() {
            return Err(AppError::missing_field("user_id"));
        }
        if page == 0 {
            return Err(AppError::invalid_input("page must be >= 1"));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(AppError::invalid_input(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        self.conversations.list(user_id, page, page_size).await
    }

    /// All messages of a conversation as a flat list for client-side DAG rebuilding
    ///
    /// # Errors
    ///
    /// Returns a not-found error for unknown conversations and store errors.
    pub async fn history(&self, conversation_id: &str) -> AppResult<Vec<MessageNode>> {
        self.conversations
            .get(conversation_id)
            .await?
            .ok_or_else(|| AppError::not_found("Conversation"))?;

        self.messages.list_by_conversation(conversation_id).await
    }

    /// Rename a conversation, enforcing ownership and the title bound
    ///
    /// # Errors
    ///
    /// Returns validation errors for bad titles and a not-found error when
    /// no conversation matches `(id, user_id)`.
    pub async fn rename(&self, conversation_id: &str, user_id: &str, title: &str) -> AppResult<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::invalid_input("Title must not be empty"));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(AppError::invalid_input(format!(
                "Title must be at most {MAX_TITLE_LEN} characters"
            )));
        }

        let renamed = self
            .conversations
            .rename(conversation_id, user_id, title)
            .await?;
        if renamed {
            Ok(())
        } else {
            Err(AppError::not_found("Conversation"))
        }
    }

    /// Delete a conversation and cascade its messages
    ///
    /// Messages go first: if their deletion fails, the conversation row is
    /// kept and the error surfaces, so a retry completes the cleanup.
    ///
    /// # Errors
    ///
    /// Returns a not-found error when no conversation matches `(id, user_id)`
    /// and store errors from either stage of the cascade.
    pub async fn delete(&self, conversation_id: &str, user_id: &str) -> AppResult<()> {
        let owned = self
            .conversations
            .get(conversation_id)
            .await?
            .is_some_and(|c| c.user_id == user_id);
        if !owned {
            return Err(AppError::not_found("Conversation"));
        }

        let removed = self.messages.delete_by_conversation(conversation_id).await?;

        let deleted = self.conversations.delete(conversation_id, user_id).await?;
        if !deleted {
            // Raced with another delete; the messages are gone either way.
            return Err(AppError::not_found("Conversation"));
        }

        info!("Deleted conversation {conversation_id} and {removed} message(s)");
        Ok(())
    }
}

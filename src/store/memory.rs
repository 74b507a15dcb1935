// ABOUTME: In-memory store implementations with deterministic ID assignment
// ABOUTME: Used by the test suites and for running the server without a database
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Braid Project

//! In-memory stores
//!
//! Mutex-guarded maps implementing the store traits. Message IDs are
//! sequential (`m-000001`, `m-000002`, …) so tests get stable IDs, and
//! zero-padding keeps lexicographic order equal to insertion order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{ConversationStore, MessageStore, Page};
use crate::errors::{AppError, AppResult};
use crate::models::{Conversation, MessageNode, NewMessage};

/// In-memory conversation store
#[derive(Default)]
pub struct MemoryConversationStore {
    conversations: Mutex<HashMap<String, Conversation>>,
}

impl MemoryConversationStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn create(&self, user_id: &str, initial_model: &str) -> AppResult<Conversation> {
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_owned(),
            title: String::new(),
            models: vec![initial_model.to_owned()],
            created_at: now,
            updated_at: now,
        };

        let mut guard = lock(&self.conversations)?;
        guard.insert(conversation.id.clone(), conversation.clone());
        Ok(conversation)
    }

    async fn get(&self, id: &str) -> AppResult<Option<Conversation>> {
        Ok(lock(&self.conversations)?.get(id).cloned())
    }

    async fn list(
        &self,
        user_id: &str,
        page: u32,
        page_size: u32,
    ) -> AppResult<Page<Conversation>> {
        let guard = lock(&self.conversations)?;
        let mut items: Vec<Conversation> = guard
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        // updated_at descending, ID as a stable secondary key
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));

        let total = items.len() as u64;
        let offset = (page.saturating_sub(1) as usize) * page_size as usize;
        let items = items
            .into_iter()
            .skip(offset)
            .take(page_size as usize)
            .collect();

        Ok(Page { items, total })
    }

    async fn rename(&self, id: &str, user_id: &str, title: &str) -> AppResult<bool> {
        let mut guard = lock(&self.conversations)?;
        match guard.get_mut(id) {
            Some(conversation) if conversation.user_id == user_id => {
                conversation.title = title.to_owned();
                conversation.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, id: &str, user_id: &str) -> AppResult<bool> {
        let mut guard = lock(&self.conversations)?;
        match guard.get(id) {
            Some(conversation) if conversation.user_id == user_id => {
                guard.remove(id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn touch(&self, id: &str, model: &str) -> AppResult<()> {
        let mut guard = lock(&self.conversations)?;
        let conversation = guard
            .get_mut(id)
            .ok_or_else(|| AppError::not_found("Conversation"))?;
        if !conversation.models.iter().any(|m| m == model) {
            conversation.models.push(model.to_owned());
        }
        conversation.updated_at = Utc::now();
        Ok(())
    }

    async fn set_title(&self, id: &str, title: &str) -> AppResult<()> {
        let mut guard = lock(&self.conversations)?;
        let conversation = guard
            .get_mut(id)
            .ok_or_else(|| AppError::not_found("Conversation"))?;
        conversation.title = title.to_owned();
        conversation.updated_at = Utc::now();
        Ok(())
    }
}

/// In-memory message store with sequential node IDs
#[derive(Default)]
pub struct MemoryMessageStore {
    nodes: Mutex<HashMap<String, MessageNode>>,
    next_id: AtomicU64,
}

impl MemoryMessageStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully-formed node, bypassing ID assignment
    ///
    /// Test hook: lets suites inject synthetic graphs (including cycles)
    /// that the invariant-preserving `insert` path cannot produce.
    pub fn insert_raw(&self, node: MessageNode) -> AppResult<()> {
        let mut guard = lock(&self.nodes)?;
        guard.insert(node.id.clone(), node);
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn insert(&self, message: NewMessage) -> AppResult<String> {
        let seq = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let id = format!("m-{seq:06}");

        let node = MessageNode {
            id: id.clone(),
            conversation_id: message.conversation_id,
            role: message.role,
            content: message.content,
            reasoning: message.reasoning,
            model: message.model,
            parent_ids: message.parent_ids,
            children: Vec::new(),
            created_at: Utc::now(),
        };

        let mut guard = lock(&self.nodes)?;
        guard.insert(id.clone(), node);
        Ok(id)
    }

    async fn append_child(&self, parent_id: &str, child_id: &str) -> AppResult<()> {
        let mut guard = lock(&self.nodes)?;
        let parent = guard
            .get_mut(parent_id)
            .ok_or_else(|| AppError::not_found("Parent message"))?;
        if !parent.children.iter().any(|c| c == child_id) {
            parent.children.push(child_id.to_owned());
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> AppResult<Option<MessageNode>> {
        Ok(lock(&self.nodes)?.get(id).cloned())
    }

    async fn get_many(&self, ids: &[String]) -> AppResult<HashMap<String, MessageNode>> {
        let guard = lock(&self.nodes)?;
        Ok(ids
            .iter()
            .filter_map(|id| guard.get(id).map(|n| (id.clone(), n.clone())))
            .collect())
    }

    async fn list_by_conversation(&self, conversation_id: &str) -> AppResult<Vec<MessageNode>> {
        let guard = lock(&self.nodes)?;
        let mut nodes: Vec<MessageNode> = guard
            .values()
            .filter(|n| n.conversation_id == conversation_id)
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(nodes)
    }

    async fn delete_by_conversation(&self, conversation_id: &str) -> AppResult<u64> {
        let mut guard = lock(&self.nodes)?;
        let before = guard.len();
        guard.retain(|_, n| n.conversation_id != conversation_id);
        Ok((before - guard.len()) as u64)
    }
}

/// Lock a store mutex, mapping poisoning to a store error
fn lock<T>(mutex: &Mutex<T>) -> AppResult<std::sync::MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| AppError::database("Store mutex poisoned"))
}

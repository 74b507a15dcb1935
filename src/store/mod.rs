// ABOUTME: Store abstraction layer for conversation metadata and DAG message nodes
// ABOUTME: Defines the ConversationStore and MessageStore traits with pluggable backends
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Braid Project

//! # Store Abstraction Layer
//!
//! Two logical stores back the engine:
//!
//! - [`ConversationStore`]: relational metadata (id, user, title, models,
//!   timestamps)
//! - [`MessageStore`]: one document per DAG node, keyed by a store-assigned
//!   opaque ID
//!
//! Both are shared, thread-safe, and mediate all mutation; the core keeps no
//! in-memory cache of conversations or messages. Backends: sqlite (`sqlite`)
//! for production, in-memory (`memory`) for tests and local experiments.

pub mod memory;
pub mod sqlite;

pub use memory::{MemoryConversationStore, MemoryMessageStore};
pub use sqlite::{SqliteConversationStore, SqliteMessageStore};

use std::collections::HashMap;

use async_trait::async_trait;

use crate::errors::AppResult;
use crate::models::{Conversation, MessageNode, NewMessage};

/// One page of a listing plus the unpaged total
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Total matching items across all pages
    pub total: u64,
}

/// Persistence for conversation metadata
///
/// All writes are scoped by `(id, user_id)` to prevent cross-user mutation;
/// reads by bare `id` are used internally by the chat pipeline after
/// ownership has been established.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create a conversation with an empty title
    async fn create(&self, user_id: &str, initial_model: &str) -> AppResult<Conversation>;

    /// Fetch a conversation by ID
    async fn get(&self, id: &str) -> AppResult<Option<Conversation>>;

    /// List a user's conversations ordered by `updated_at` descending
    ///
    /// `page` is 1-based.
    async fn list(&self, user_id: &str, page: u32, page_size: u32)
        -> AppResult<Page<Conversation>>;

    /// Rename a conversation; returns false when no row matched `(id, user_id)`
    async fn rename(&self, id: &str, user_id: &str, title: &str) -> AppResult<bool>;

    /// Delete a conversation row; returns false when no row matched
    ///
    /// The caller cascades message deletion *before* calling this, so a
    /// failed cascade leaves the row in place and the delete retryable.
    async fn delete(&self, id: &str, user_id: &str) -> AppResult<bool>;

    /// Bump `updated_at` and append `model` to the model list if absent
    async fn touch(&self, id: &str, model: &str) -> AppResult<()>;

    /// Set the title without ownership scoping (auto-title job)
    async fn set_title(&self, id: &str, title: &str) -> AppResult<()>;
}

/// Persistence for DAG message nodes
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Assign a unique ID and atomically write the node; returns the ID
    async fn insert(&self, message: NewMessage) -> AppResult<String>;

    /// Add `child_id` to the parent's `children` set
    ///
    /// Idempotent; concurrent calls for the same parent converge to
    /// set-union semantics.
    async fn append_child(&self, parent_id: &str, child_id: &str) -> AppResult<()>;

    /// Fetch a single node
    async fn get(&self, id: &str) -> AppResult<Option<MessageNode>>;

    /// Fetch a batch of nodes; missing IDs are silently skipped
    async fn get_many(&self, ids: &[String]) -> AppResult<HashMap<String, MessageNode>>;

    /// All nodes of a conversation, ordered by creation time ascending
    async fn list_by_conversation(&self, conversation_id: &str) -> AppResult<Vec<MessageNode>>;

    /// Bulk removal for the conversation-delete cascade; returns rows removed
    async fn delete_by_conversation(&self, conversation_id: &str) -> AppResult<u64>;
}

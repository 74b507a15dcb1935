// ABOUTME: Core data models for conversations and DAG message nodes
// ABOUTME: Defines the persisted entities shared by stores, services, and routes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Braid Project

//! Core data models
//!
//! A conversation is not a linear transcript: its messages form a directed
//! acyclic graph. Users branch by asking an alternative follow-up under any
//! assistant answer, and merge by asking one question under several answers
//! at once. `parent_ids` is the authoritative edge set; `children` is a
//! denormalized reverse edge kept for client rendering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::MessageRole;

/// Maximum length of a conversation title, matching the VARCHAR(64) column
pub const MAX_TITLE_LEN: usize = 64;

/// A conversation row: metadata only, no message content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation ID (UUID string)
    pub id: String,
    /// Owning user
    pub user_id: String,
    /// Title; empty until auto-titled or renamed
    pub title: String,
    /// Distinct model identifiers ever used, in first-use order
    pub models: Vec<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp (bumped by every new answer and rename)
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Render the model list the way the store persists it
    #[must_use]
    pub fn models_column(&self) -> String {
        self.models.join(",")
    }

    /// Parse the persisted comma-joined model column
    #[must_use]
    pub fn parse_models_column(column: &str) -> Vec<String> {
        column
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(ToOwned::to_owned)
            .collect()
    }
}

/// A message node in the conversation DAG
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageNode {
    /// Node ID, assigned by the message store on insert
    pub id: String,
    /// Conversation this node belongs to
    pub conversation_id: String,
    /// `user` or `assistant` (never `system` in persisted nodes)
    pub role: MessageRole,
    /// Message text
    pub content: String,
    /// Thinking trace, assistant nodes only, when the adapter emitted one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Model that produced this node (assistant nodes)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Parent node IDs within the same conversation; empty for the root
    pub parent_ids: Vec<String>,
    /// Child node IDs (denormalized reverse edges)
    pub children: Vec<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl MessageNode {
    /// Whether this node is the conversation root
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_ids.is_empty()
    }
}

/// Insert payload for a new message node
///
/// The ID and creation timestamp are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// Conversation this node belongs to
    pub conversation_id: String,
    /// `user` or `assistant`
    pub role: MessageRole,
    /// Message text
    pub content: String,
    /// Thinking trace, if any
    pub reasoning: Option<String>,
    /// Model identifier, if any
    pub model: Option<String>,
    /// Parent node IDs; must reference already-persisted nodes of the same
    /// conversation, which is what keeps the graph acyclic
    pub parent_ids: Vec<String>,
}

impl NewMessage {
    /// A user question under the given parents
    #[must_use]
    pub fn user(
        conversation_id: impl Into<String>,
        content: impl Into<String>,
        parent_ids: Vec<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            role: MessageRole::User,
            content: content.into(),
            reasoning: None,
            model: None,
            parent_ids,
        }
    }

    /// An assistant answer under a single user question
    #[must_use]
    pub fn assistant(
        conversation_id: impl Into<String>,
        content: impl Into<String>,
        reasoning: Option<String>,
        model: impl Into<String>,
        user_node_id: String,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            role: MessageRole::Assistant,
            content: content.into(),
            reasoning,
            model: Some(model.into()),
            parent_ids: vec![user_node_id],
        }
    }
}

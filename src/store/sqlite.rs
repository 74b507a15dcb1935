// ABOUTME: sqlite-backed store implementations for conversations and DAG message nodes
// ABOUTME: Message nodes are stored as documents with JSON-encoded edge sets
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Braid Project

//! sqlite stores
//!
//! The conversation store is a plain relational table. The message store
//! keeps one row per DAG node with `parent_ids` and `children` as
//! JSON-encoded TEXT columns; `append_child` performs its read-modify-write
//! inside a transaction so concurrent appends to the same parent converge to
//! set union.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, SqlitePool};
use uuid::Uuid;

use super::{ConversationStore, MessageStore, Page};
use crate::errors::{AppError, AppResult};
use crate::llm::MessageRole;
use crate::models::{Conversation, MessageNode, NewMessage};

// ============================================================================
// Conversation Store
// ============================================================================

/// sqlite-backed conversation store
#[derive(Clone)]
pub struct SqliteConversationStore {
    pool: SqlitePool,
}

impl SqliteConversationStore {
    /// Create a store over an existing pool
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the schema if it does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation fails.
    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                models TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conversations_updated ON conversations(updated_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_conversation(row: &SqliteRow) -> Conversation {
        let models: String = row.get("models");
        Conversation {
            id: row.get("id"),
            user_id: row.get("user_id"),
            title: row.get("title"),
            models: Conversation::parse_models_column(&models),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn create(&self, user_id: &str, initial_model: &str) -> AppResult<Conversation> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r"
            INSERT INTO conversations (id, user_id, title, models, created_at, updated_at)
            VALUES ($1, $2, '', $3, $4, $4)
            ",
        )
        .bind(&id)
        .bind(user_id)
        .bind(initial_model)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create conversation: {e}")))?;

        Ok(Conversation {
            id,
            user_id: user_id.to_owned(),
            title: String::new(),
            models: vec![initial_model.to_owned()],
            created_at: now,
            updated_at: now,
        })
    }

    async fn get(&self, id: &str) -> AppResult<Option<Conversation>> {
        let row = sqlx::query(
            "SELECT id, user_id, title, models, created_at, updated_at
             FROM conversations WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get conversation: {e}")))?;

        Ok(row.as_ref().map(Self::row_to_conversation))
    }

    async fn list(
        &self,
        user_id: &str,
        page: u32,
        page_size: u32,
    ) -> AppResult<Page<Conversation>> {
        let offset = i64::from(page.saturating_sub(1)) * i64::from(page_size);

        let rows = sqlx::query(
            "SELECT id, user_id, title, models, created_at, updated_at
             FROM conversations
             WHERE user_id = $1
             ORDER BY updated_at DESC, id ASC
             LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(i64::from(page_size))
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to list conversations: {e}")))?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM conversations WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| AppError::database(format!("Failed to count conversations: {e}")))?;

        Ok(Page {
            items: rows.iter().map(Self::row_to_conversation).collect(),
            total: total.try_into().unwrap_or(0),
        })
    }

    async fn rename(&self, id: &str, user_id: &str, title: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE conversations SET title = $1, updated_at = $2
             WHERE id = $3 AND user_id = $4",
        )
        .bind(title)
        .bind(Utc::now())
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to rename conversation: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &str, user_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete conversation: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn touch(&self, id: &str, model: &str) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT models FROM conversations WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to read conversation: {e}")))?
            .ok_or_else(|| AppError::not_found("Conversation"))?;

        let column: String = row.get("models");
        let mut models = Conversation::parse_models_column(&column);
        if !models.iter().any(|m| m == model) {
            models.push(model.to_owned());
        }

        sqlx::query("UPDATE conversations SET models = $1, updated_at = $2 WHERE id = $3")
            .bind(models.join(","))
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to touch conversation: {e}")))?;

        tx.commit().await?;
        Ok(())
    }

    async fn set_title(&self, id: &str, title: &str) -> AppResult<()> {
        sqlx::query("UPDATE conversations SET title = $1, updated_at = $2 WHERE id = $3")
            .bind(title)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to set title: {e}")))?;
        Ok(())
    }
}

// ============================================================================
// Message Store
// ============================================================================

/// sqlite-backed message node store
#[derive(Clone)]
pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    /// Create a store over an existing pool
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the schema if it does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation fails.
    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS message_nodes (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                reasoning TEXT,
                model TEXT,
                parent_ids TEXT NOT NULL DEFAULT '[]',
                children TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_message_nodes_conversation
             ON message_nodes(conversation_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_node(row: &SqliteRow) -> AppResult<MessageNode> {
        let role: String = row.get("role");
        let role = match role.as_str() {
            "user" => MessageRole::User,
            "assistant" => MessageRole::Assistant,
            "system" => MessageRole::System,
            other => {
                return Err(AppError::database(format!(
                    "Unknown message role in store: {other}"
                )))
            }
        };

        let parent_ids: String = row.get("parent_ids");
        let children: String = row.get("children");

        Ok(MessageNode {
            id: row.get("id"),
            conversation_id: row.get("conversation_id"),
            role,
            content: row.get("content"),
            reasoning: row.get("reasoning"),
            model: row.get("model"),
            parent_ids: serde_json::from_str(&parent_ids)?,
            children: serde_json::from_str(&children)?,
            created_at: row.get::<DateTime<Utc>, _>("created_at"),
        })
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn insert(&self, message: NewMessage) -> AppResult<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r"
            INSERT INTO message_nodes
                (id, conversation_id, role, content, reasoning, model, parent_ids, children, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, '[]', $8)
            ",
        )
        .bind(&id)
        .bind(&message.conversation_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&message.reasoning)
        .bind(&message.model)
        .bind(serde_json::to_string(&message.parent_ids)?)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to insert message: {e}")))?;

        Ok(id)
    }

    async fn append_child(&self, parent_id: &str, child_id: &str) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT children FROM message_nodes WHERE id = $1")
            .bind(parent_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to read parent message: {e}")))?
            .ok_or_else(|| AppError::not_found("Parent message"))?;

        let column: String = row.get("children");
        let mut children: Vec<String> = serde_json::from_str(&column)?;

        if !children.iter().any(|c| c == child_id) {
            children.push(child_id.to_owned());
            sqlx::query("UPDATE message_nodes SET children = $1 WHERE id = $2")
                .bind(serde_json::to_string(&children)?)
                .bind(parent_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| AppError::database(format!("Failed to append child: {e}")))?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> AppResult<Option<MessageNode>> {
        let row = sqlx::query(
            "SELECT id, conversation_id, role, content, reasoning, model,
                    parent_ids, children, created_at
             FROM message_nodes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get message: {e}")))?;

        row.as_ref().map(Self::row_to_node).transpose()
    }

    async fn get_many(&self, ids: &[String]) -> AppResult<HashMap<String, MessageNode>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut builder = QueryBuilder::new(
            "SELECT id, conversation_id, role, content, reasoning, model,
                    parent_ids, children, created_at
             FROM message_nodes WHERE id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        builder.push(")");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to batch-get messages: {e}")))?;

        let mut nodes = HashMap::with_capacity(rows.len());
        for row in &rows {
            let node = Self::row_to_node(row)?;
            nodes.insert(node.id.clone(), node);
        }
        Ok(nodes)
    }

    async fn list_by_conversation(&self, conversation_id: &str) -> AppResult<Vec<MessageNode>> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, role, content, reasoning, model,
                    parent_ids, children, created_at
             FROM message_nodes
             WHERE conversation_id = $1
             ORDER BY created_at ASC, id ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to list messages: {e}")))?;

        rows.iter().map(Self::row_to_node).collect()
    }

    async fn delete_by_conversation(&self, conversation_id: &str) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM message_nodes WHERE conversation_id = $1")
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete messages: {e}")))?;

        Ok(result.rows_affected())
    }
}

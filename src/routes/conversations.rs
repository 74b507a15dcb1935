// ABOUTME: Route handlers for conversation CRUD and history retrieval
// ABOUTME: Thin extractors over the conversation service, answering in the envelope
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Braid Project

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::ApiResponse;
use crate::models::MessageNode;
use crate::server::ServerResources;

// ============================================================================
// Request / Response Types
// ============================================================================

/// Body of `POST /api/v1/create-conversation`
#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    /// Owning user
    pub user_id: String,
    /// Model the client intends to chat with
    #[serde(default)]
    pub model: String,
    /// The first question; held client-side until the `/chat` call
    #[serde(default)]
    pub message: String,
}

/// Query of `GET /api/v1/dialogue/list`
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Owning user
    pub user_id: String,
    /// 1-based page number
    #[serde(default = "default_page")]
    pub page: u32,
    /// Page size (1..=100)
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

const fn default_page() -> u32 {
    1
}

const fn default_page_size() -> u32 {
    20
}

/// Query of `GET /api/v1/dialogue/history`
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Conversation to read
    pub dialogue_id: String,
}

/// Query of `PUT /api/v1/dialogue/rename`
#[derive(Debug, Deserialize)]
pub struct RenameQuery {
    /// Conversation to rename
    pub conversation_id: String,
    /// Owning user
    pub user_id: String,
    /// Replacement title (1..=64 chars)
    pub new_title: String,
}

/// Query of `DELETE /api/v1/dialogue/delete`
#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    /// Conversation to delete
    pub conversation_id: String,
    /// Owning user
    pub user_id: String,
}

/// One conversation row in the listing payload
#[derive(Debug, Serialize)]
pub struct ConversationView {
    /// Conversation ID
    pub id: String,
    /// Owning user
    pub user_id: String,
    /// Title; empty until auto-titled
    pub title: String,
    /// Models used, first-use order
    pub models: Vec<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// One message node in the history payload
///
/// Carries everything the client needs to rebuild the DAG.
#[derive(Debug, Serialize)]
pub struct MessageView {
    /// Node ID
    pub id: String,
    /// `user` or `assistant`
    pub role: String,
    /// Message text
    pub content: String,
    /// Thinking trace, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Model that produced the node, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Parent node IDs
    pub parent_ids: Vec<String>,
    /// Child node IDs
    pub children: Vec<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl From<MessageNode> for MessageView {
    fn from(node: MessageNode) -> Self {
        Self {
            id: node.id,
            role: node.role.as_str().to_owned(),
            content: node.content,
            reasoning: node.reasoning,
            model: node.model,
            parent_ids: node.parent_ids,
            children: node.children,
            created_at: node.created_at,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// `POST /api/v1/create-conversation`
pub async fn create(
    State(resources): State<Arc<ServerResources>>,
    Json(body): Json<CreateConversationRequest>,
) -> Json<serde_json::Value> {
    match resources
        .conversations
        .create(&body.user_id, &body.model)
        .await
    {
        Ok(conversation) => Json(json!({ "conversation_id": conversation.id })),
        Err(error) => Json(
            serde_json::to_value(ApiResponse::<()>::failure(&error)).unwrap_or_default(),
        ),
    }
}

/// `GET /api/v1/dialogue/list`
pub async fn list(
    State(resources): State<Arc<ServerResources>>,
    Query(query): Query<ListQuery>,
) -> Json<ApiResponse<serde_json::Value>> {
    let result = resources
        .conversations
        .list(&query.user_id, query.page, query.page_size)
        .await
        .map(|page| {
            let items: Vec<ConversationView> = page
                .items
                .into_iter()
                .map(|c| ConversationView {
                    id: c.id,
                    user_id: c.user_id,
                    title: c.title,
                    models: c.models,
                    created_at: c.created_at,
                    updated_at: c.updated_at,
                })
                .collect();
            json!({
                "list": items,
                "total": page.total,
                "page": query.page,
                "page_size": query.page_size,
            })
        });

    Json(ApiResponse::from_result(result))
}

/// `GET /api/v1/dialogue/history`
pub async fn history(
    State(resources): State<Arc<ServerResources>>,
    Query(query): Query<HistoryQuery>,
) -> Json<ApiResponse<Vec<MessageView>>> {
    let result = resources
        .conversations
        .history(&query.dialogue_id)
        .await
        .map(|nodes| nodes.into_iter().map(MessageView::from).collect());

    Json(ApiResponse::from_result(result))
}

/// `PUT /api/v1/dialogue/rename`
pub async fn rename(
    State(resources): State<Arc<ServerResources>>,
    Query(query): Query<RenameQuery>,
) -> Json<ApiResponse<()>> {
    let result = resources
        .conversations
        .rename(&query.conversation_id, &query.user_id, &query.new_title)
        .await;

    match result {
        Ok(()) => Json(ApiResponse::ok_empty()),
        Err(error) => Json(ApiResponse::failure(&error)),
    }
}

/// `DELETE /api/v1/dialogue/delete`
pub async fn remove(
    State(resources): State<Arc<ServerResources>>,
    Query(query): Query<DeleteQuery>,
) -> Json<ApiResponse<()>> {
    let result = resources
        .conversations
        .delete(&query.conversation_id, &query.user_id)
        .await;

    match result {
        Ok(()) => Json(ApiResponse::ok_empty()),
        Err(error) => Json(ApiResponse::failure(&error)),
    }
}

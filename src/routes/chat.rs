// ABOUTME: The /chat route: request decoding, SSE framing, and disconnect handling
// ABOUTME: Bridges the chat orchestrator's event stream onto an axum SSE response
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Braid Project

//! Streaming chat endpoint
//!
//! Each event is one JSON object on a `data:` line. A keep-alive comment
//! (`: ping`) goes out after 15 seconds of silence to defeat proxy idle
//! timeouts. When the client disconnects, axum drops the response stream;
//! the drop guard then cancels the request token, which closes the upstream
//! model connection within one poll cycle.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::error;

use super::ApiResponse;
use crate::server::ServerResources;
use crate::services::chat::{ChatStreamEvent, ChatStreamRequest};

/// Interval between keep-alive comments on an otherwise silent stream
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Body of `POST /api/v1/chat`
#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    /// Target conversation; must exist before the first `/chat` call
    pub conversation_id: String,
    /// Requesting user
    pub user_id: String,
    /// Public model identifier; empty selects the configured default
    #[serde(default)]
    pub model: String,
    /// The new question
    pub message: String,
    /// Parent message IDs for branching and merging; empty for the first question
    #[serde(default)]
    pub parent_ids: Vec<String>,
    /// Request a reasoning trace
    #[serde(default)]
    pub deep_thinking: bool,
    /// Request live-search augmentation
    #[serde(default)]
    pub search_enabled: bool,
}

/// `POST /api/v1/chat`
///
/// Validation failures answer with a plain envelope before any SSE byte is
/// written; afterwards all outcomes, including errors, arrive as stream
/// frames.
pub async fn chat(
    State(resources): State<Arc<ServerResources>>,
    Json(body): Json<ChatRequestBody>,
) -> Response {
    let request = ChatStreamRequest {
        conversation_id: body.conversation_id,
        user_id: body.user_id,
        model: body.model,
        message: body.message,
        parent_ids: body.parent_ids,
        deep_thinking: body.deep_thinking,
        search_enabled: body.search_enabled,
    };

    let cancel = CancellationToken::new();

    let events = match resources.chat.stream_chat(request, cancel.clone()).await {
        Ok(events) => events,
        Err(e) => return Json(ApiResponse::<()>::failure(&e)).into_response(),
    };

    // Held by the SSE stream; dropped on client disconnect, which cancels
    // the orchestrator token.
    let guard = cancel.drop_guard();

    let sse_stream = async_stream::stream! {
        let _guard = guard;
        tokio::pin!(events);
        while let Some(event) = events.next().await {
            match serde_json::to_string(&event) {
                Ok(json) => yield Ok::<Event, Infallible>(Event::default().data(json)),
                Err(e) => {
                    error!("Failed to serialize SSE frame: {e}");
                    let fallback = serde_json::to_string(&ChatStreamEvent::Error {
                        error: "Internal serialization error".to_owned(),
                    })
                    .unwrap_or_else(|_| r#"{"error":"Internal serialization error"}"#.to_owned());
                    yield Ok(Event::default().data(fallback));
                    return;
                }
            }
        }
    };

    Sse::new(sse_stream)
        .keep_alive(
            KeepAlive::new()
                .interval(KEEP_ALIVE_INTERVAL)
                .text("ping"),
        )
        .into_response()
}

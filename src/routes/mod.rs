// ABOUTME: HTTP route assembly and the uniform response envelope
// ABOUTME: Wires conversation CRUD, chat streaming, model listing, and health endpoints
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Braid Project

//! HTTP surface
//!
//! Non-streaming endpoints answer with the uniform envelope
//! `{code, message, data}` where `code = 0` on success. Business failures
//! keep HTTP 200 and carry a non-zero `code`; only transport-level problems
//! produce 4xx/5xx statuses.

pub mod chat;
pub mod conversations;

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::warn;

use crate::errors::AppError;
use crate::server::ServerResources;

/// Uniform response envelope for non-streaming endpoints
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// 0 on success; the error's HTTP-class code otherwise
    pub code: u16,
    /// "success" or the sanitized error message
    pub message: String,
    /// Payload, omitted on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Successful envelope with a payload
    #[must_use]
    pub fn ok(data: T) -> Self {
        Self {
            code: 0,
            message: "success".to_owned(),
            data: Some(data),
        }
    }

    /// Successful envelope without a payload
    #[must_use]
    pub fn ok_empty() -> Self {
        Self {
            code: 0,
            message: "success".to_owned(),
            data: None,
        }
    }

    /// Failure envelope from an application error
    ///
    /// Full details are logged here, before sanitization strips them from
    /// the client-facing message.
    #[must_use]
    pub fn failure(error: &AppError) -> Self {
        warn!("API error: {}", error.internal_details());
        Self {
            code: error.http_status(),
            message: error.sanitized_message(),
            data: None,
        }
    }

    /// Envelope from a service result
    #[must_use]
    pub fn from_result(result: Result<T, AppError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(error) => Self::failure(&error),
        }
    }
}

/// Build the full application router
pub fn router(resources: Arc<ServerResources>) -> Router {
    Router::new()
        .route("/api/v1/create-conversation", post(conversations::create))
        .route("/api/v1/chat", post(chat::chat))
        .route("/api/v1/dialogue/list", get(conversations::list))
        .route("/api/v1/dialogue/history", get(conversations::history))
        .route("/api/v1/dialogue/rename", put(conversations::rename))
        .route("/api/v1/dialogue/delete", delete(conversations::remove))
        .route("/api/v1/models", get(models))
        .route("/health", get(health))
        .with_state(resources)
}

/// List available models from the adapter registry
async fn models(State(resources): State<Arc<ServerResources>>) -> Json<serde_json::Value> {
    let models = resources.registry.list_models();
    let count = models.len();
    Json(json!({
        "models": models,
        "count": count,
    }))
}

/// Liveness probe
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "braid-server",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shapes() {
        let ok = serde_json::to_value(ApiResponse::ok(vec![1, 2])).unwrap();
        assert_eq!(ok["code"], 0);
        assert_eq!(ok["message"], "success");
        assert_eq!(ok["data"], json!([1, 2]));

        let failure =
            serde_json::to_value(ApiResponse::<()>::failure(&AppError::not_found("Conversation")))
                .unwrap();
        assert_eq!(failure["code"], 404);
        assert!(failure.get("data").is_none());
    }
}

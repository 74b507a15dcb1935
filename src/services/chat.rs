// ABOUTME: Chat orchestration service: validation, DAG history, streaming, persistence
// ABOUTME: Drives one /chat request from parent reconciliation to the terminal SSE frame
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Braid Project

//! # Chat Orchestrator
//!
//! One `/chat` request runs through a fixed sequence:
//!
//! 1. validate the model, the conversation, and every parent ID;
//! 2. rebuild history by linearizing the parents' ancestor sub-DAG;
//! 3. persist the user node and wire it under its parents, then emit its ID;
//! 4. stream adapter events to the client while accumulating buffers;
//! 5. on a clean end, persist the assistant node, close the Q/A pair, touch
//!    the conversation, and emit the terminal frame.
//!
//! On cancellation or adapter failure the partial answer is discarded: no
//! assistant node is written, which keeps Q/A atomicity strict. The user
//! node from step 3 is retained unconditionally so the question survives a
//! failed answer.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::Serialize;
use tokio::time::Instant;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ChatConfig;
use crate::dag;
use crate::errors::{AppError, AppResult};
use crate::llm::{ChatEvent, ChatMessage, ChatRequest, ProviderRegistry};
use crate::models::{NewMessage, MAX_TITLE_LEN};
use crate::store::{ConversationStore, MessageStore};

/// Timeouts applied to one adapter call
#[derive(Debug, Clone, Copy)]
pub struct ChatLimits {
    /// Overall deadline for the whole stream
    pub total_timeout: Duration,
    /// Maximum silence between consecutive adapter events
    pub idle_timeout: Duration,
}

impl ChatLimits {
    /// Derive limits from configuration
    #[must_use]
    pub const fn from_config(config: &ChatConfig) -> Self {
        Self {
            total_timeout: config.total_timeout(),
            idle_timeout: config.idle_timeout(),
        }
    }
}

impl Default for ChatLimits {
    fn default() -> Self {
        Self {
            total_timeout: Duration::from_secs(120),
            idle_timeout: Duration::from_secs(30),
        }
    }
}

/// A validated `/chat` request
#[derive(Debug, Clone)]
pub struct ChatStreamRequest {
    /// Target conversation
    pub conversation_id: String,
    /// Requesting user
    pub user_id: String,
    /// Public model identifier; empty string selects the configured default
    pub model: String,
    /// The new question
    pub message: String,
    /// Parents of the new question; empty for the conversation's first question
    pub parent_ids: Vec<String>,
    /// Request a reasoning trace
    pub deep_thinking: bool,
    /// Request live-search augmentation
    pub search_enabled: bool,
}

/// One frame of the `/chat` SSE stream
///
/// Serialization produces exactly the wire shapes clients rely on:
/// `{"reasoning": …}`, `{"content": …}`, `{"user_message_id": …}`,
/// `{"message_id": …, "complete": true}`, `{"error": …}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChatStreamEvent {
    /// Incremental thinking tokens
    Reasoning {
        /// Delta text
        reasoning: String,
    },
    /// Incremental answer tokens
    Content {
        /// Delta text
        content: String,
    },
    /// The persisted user node's store-assigned ID, emitted early so the
    /// client can replace its temporary ID before the stream ends
    UserMessage {
        /// User node ID
        user_message_id: String,
    },
    /// Terminal success frame carrying the assistant node's ID
    Complete {
        /// Assistant node ID
        message_id: String,
        /// Always true
        complete: bool,
    },
    /// Terminal failure frame
    Error {
        /// Sanitized error text
        error: String,
    },
}

impl ChatStreamEvent {
    fn reasoning(text: impl Into<String>) -> Self {
        Self::Reasoning {
            reasoning: text.into(),
        }
    }

    fn content(text: impl Into<String>) -> Self {
        Self::Content {
            content: text.into(),
        }
    }

    fn user_message(id: impl Into<String>) -> Self {
        Self::UserMessage {
            user_message_id: id.into(),
        }
    }

    fn complete(id: impl Into<String>) -> Self {
        Self::Complete {
            message_id: id.into(),
            complete: true,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }
}

/// Streaming chat orchestrator
#[derive(Clone)]
pub struct ChatService {
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
    registry: Arc<ProviderRegistry>,
    limits: ChatLimits,
    default_model: String,
}

impl ChatService {
    /// Create the orchestrator
    #[must_use]
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
        registry: Arc<ProviderRegistry>,
        limits: ChatLimits,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            conversations,
            messages,
            registry,
            limits,
            default_model: default_model.into(),
        }
    }

    /// Run one `/chat` request, returning the SSE event stream
    ///
    /// Everything that can be rejected without side effects is checked here,
    /// before any SSE byte is produced; the user node is also persisted here
    /// so a store failure fails the whole request cleanly. The returned
    /// stream then carries the adapter tokens and the terminal frame.
    ///
    /// # Errors
    ///
    /// Returns validation, lookup, `InvalidDag`, or store errors. Adapter
    /// failures after this point arrive as [`ChatStreamEvent::Error`] frames
    /// instead.
    pub async fn stream_chat(
        &self,
        request: ChatStreamRequest,
        cancel: CancellationToken,
    ) -> AppResult<impl Stream<Item = ChatStreamEvent> + Send + 'static> {
        // 1. Validate and reconcile parents.
        if request.message.trim().is_empty() {
            return Err(AppError::invalid_input("Message must not be empty"));
        }

        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        };
        self.registry.get(&model)?;

        let conversation = self
            .conversations
            .get(&request.conversation_id)
            .await?
            .filter(|c| c.user_id == request.user_id)
            .ok_or_else(|| AppError::not_found("Conversation"))?;

        let parent_ids = dedup_preserving_order(&request.parent_ids);
        if !parent_ids.is_empty() {
            let found = self.messages.get_many(&parent_ids).await?;
            for parent_id in &parent_ids {
                let node = found
                    .get(parent_id)
                    .ok_or_else(|| AppError::not_found("Parent message"))?;
                if node.conversation_id != request.conversation_id {
                    return Err(AppError::invalid_input(
                        "Parent message belongs to another conversation",
                    ));
                }
            }
        }

        // 2. Build history and append the new question as the tail.
        let mut history = dag::build_history(self.messages.as_ref(), &parent_ids).await?;
        let first_question = history.is_empty();
        history.push(ChatMessage::user(request.message.clone()));

        let chat_request = ChatRequest::new(history)
            .with_deep_thinking(request.deep_thinking)
            .with_search(request.search_enabled);

        // 3. Persist the user node before any streaming.
        let user_node_id = self
            .messages
            .insert(NewMessage::user(
                request.conversation_id.clone(),
                request.message.clone(),
                parent_ids.clone(),
            ))
            .await?;
        for parent_id in &parent_ids {
            if let Err(e) = self.messages.append_child(parent_id, &user_node_id).await {
                // Partial write: the node exists but one reverse edge is
                // missing. History reads still work off parent_ids.
                error!(
                    "Partial write: user node {user_node_id} inserted but reverse edge on \
                     {parent_id} failed: {e}"
                );
            }
        }

        info!(
            "Chat stream starting: conversation={}, model={model}, parents={}, first={first_question}",
            request.conversation_id,
            parent_ids.len()
        );

        let service = self.clone();
        let needs_title = conversation.title.is_empty() && first_question;
        let limits = self.limits;
        let conversation_id = request.conversation_id.clone();
        let question = request.message;

        // 4.-6. The stream: forward adapter events, then finalize or discard.
        let events = async_stream::stream! {
            yield ChatStreamEvent::user_message(user_node_id.clone());

            let provider = match service.registry.get(&model) {
                Ok(provider) => provider,
                Err(e) => {
                    yield ChatStreamEvent::error(e.sanitized_message());
                    return;
                }
            };

            let mut adapter_events =
                match provider.stream_chat(&chat_request, cancel.child_token()).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!("Adapter call failed: {}", e.internal_details());
                        yield ChatStreamEvent::error(e.sanitized_message());
                        return;
                    }
                };

            let deadline = Instant::now() + limits.total_timeout;
            let mut content = String::new();
            let mut reasoning = String::new();

            loop {
                let wait = limits
                    .idle_timeout
                    .min(deadline.saturating_duration_since(Instant::now()));

                let next = tokio::select! {
                    // Client disconnected: stop silently, discard the partial
                    // answer, keep the user node.
                    () = cancel.cancelled() => return,
                    next = tokio::time::timeout(wait, adapter_events.next()) => next,
                };

                match next {
                    Err(_elapsed) => {
                        cancel.cancel();
                        yield ChatStreamEvent::error("Model response timed out");
                        return;
                    }
                    Ok(None) | Ok(Some(ChatEvent::Done)) => break,
                    Ok(Some(ChatEvent::Reasoning(text))) => {
                        reasoning.push_str(&text);
                        yield ChatStreamEvent::reasoning(text);
                    }
                    Ok(Some(ChatEvent::Content(text))) => {
                        content.push_str(&text);
                        yield ChatStreamEvent::content(text);
                    }
                    Ok(Some(ChatEvent::Error(message))) => {
                        cancel.cancel();
                        yield ChatStreamEvent::error(message);
                        return;
                    }
                }
            }

            // 5. Finalize: assistant node, reverse edge, conversation touch.
            match service
                .finalize_assistant(&conversation_id, &model, &user_node_id, content, reasoning)
                .await
            {
                Ok(assistant_id) => {
                    if needs_title {
                        service.spawn_auto_title(
                            conversation_id.clone(),
                            model.clone(),
                            question.clone(),
                        );
                    }
                    yield ChatStreamEvent::complete(assistant_id);
                }
                Err(e) => {
                    error!("Failed to persist assistant node: {}", e.internal_details());
                    yield ChatStreamEvent::error(e.sanitized_message());
                }
            }
        };

        Ok(events)
    }

    /// Persist the assistant node and close the Q/A pair
    async fn finalize_assistant(
        &self,
        conversation_id: &str,
        model: &str,
        user_node_id: &str,
        content: String,
        reasoning: String,
    ) -> AppResult<String> {
        let payload = NewMessage::assistant(
            conversation_id,
            content,
            (!reasoning.is_empty()).then_some(reasoning),
            model,
            user_node_id.to_owned(),
        );
        let assistant_id = self.messages.insert(payload).await?;

        if let Err(e) = self.messages.append_child(user_node_id, &assistant_id).await {
            error!(
                "Partial write: assistant {assistant_id} inserted but reverse edge on \
                 {user_node_id} failed: {e}"
            );
        }

        if let Err(e) = self.conversations.touch(conversation_id, model).await {
            warn!("Failed to touch conversation {conversation_id}: {e}");
        }

        debug!("Assistant node {assistant_id} persisted under {user_node_id}");
        Ok(assistant_id)
    }

    /// Schedule the auto-title job, detached from the HTTP response
    fn spawn_auto_title(&self, conversation_id: String, model: String, first_message: String) {
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service
                .auto_title(&conversation_id, &model, &first_message)
                .await
            {
                // Non-fatal: the conversation simply stays untitled.
                warn!("Auto-title failed for {conversation_id}: {e}");
            }
        });
    }

    async fn auto_title(
        &self,
        conversation_id: &str,
        model: &str,
        first_message: &str,
    ) -> AppResult<()> {
        let provider = self.registry.get(model)?;
        let prompt = format!(
            "Summarize the following question in 16 characters or fewer. \
             Reply with the title only.\n\n{first_message}"
        );
        let request = ChatRequest::new(vec![ChatMessage::user(prompt)])
            .with_temperature(0.3)
            .with_max_tokens(20);

        let reply = provider.complete(&request).await?;
        let title = sanitize_title(&reply);
        if title.is_empty() {
            return Ok(());
        }

        self.conversations.set_title(conversation_id, &title).await?;
        info!("Conversation {conversation_id} auto-titled: {title}");
        Ok(())
    }
}

/// Deduplicate parent IDs while keeping first-occurrence order
fn dedup_preserving_order(ids: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.iter()
        .filter(|id| !id.is_empty() && seen.insert(id.as_str()))
        .cloned()
        .collect()
}

/// Strip model decoration from a generated title and bound its length
fn sanitize_title(raw: &str) -> String {
    let first_line = raw.lines().next().unwrap_or_default();
    let stripped = first_line
        .trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '\u{201c}' | '\u{201d}'))
        .trim_end_matches(['.', '!', '?', '\u{3002}'])
        .trim();
    stripped.chars().take(MAX_TITLE_LEN).collect()
}

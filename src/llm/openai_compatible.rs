// ABOUTME: Streaming chat adapter for OpenAI-compatible vendor APIs
// ABOUTME: Handles SSE line buffering, reasoning deltas, cancellation, and error mapping
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Braid Project

//! # OpenAI-Compatible Provider
//!
//! One adapter implementation covers every vendor speaking the
//! `chat/completions` wire format (`DeepSeek`, Qwen via `DashScope`,
//! Moonshot, Zhipu). Vendors differ only in base URL, credentials, model
//! identifiers, and which optional delta fields they emit
//! (`reasoning_content` for thinking models).
//!
//! SSE framing is handled with a line buffer so that events split across TCP
//! chunk boundaries, or batched several to a chunk, are both parsed
//! correctly.

use async_stream::stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::{
    ChatEvent, ChatEventStream, ChatMessage, ChatRequest, ModelProvider, ProviderCapabilities,
};
use crate::errors::{AppError, AppResult};

// ============================================================================
// Configuration
// ============================================================================

/// Static configuration for one OpenAI-compatible vendor
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleConfig {
    /// Public model identifier clients use (e.g. "deepseek")
    pub provider_name: String,
    /// Human-readable display name
    pub display_name: String,
    /// Base URL of the vendor API, without the `/chat/completions` suffix
    pub base_url: String,
    /// Bearer token
    pub api_key: String,
    /// Upstream model for plain chat
    pub chat_model: String,
    /// Upstream model used when a reasoning trace is requested; for vendors
    /// that switch models (`DeepSeek`, Moonshot) rather than taking a flag
    pub reasoning_model: Option<String>,
    /// Upstream model for non-streaming one-shot completions; falls back to
    /// `chat_model`
    pub title_model: Option<String>,
    /// Vendor takes a `thinking` request-body toggle instead of a separate
    /// reasoning model (Zhipu convention); the toggle is sent on every
    /// request, enabled or disabled per `deep_thinking`
    pub thinking_toggle: bool,
    /// Vendor capabilities
    pub capabilities: ProviderCapabilities,
}

// ============================================================================
// Wire Types (chat/completions format)
// ============================================================================

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
    /// DashScope extension for live-search augmentation
    #[serde(skip_serializing_if = "Option::is_none")]
    enable_search: Option<bool>,
    /// Zhipu extension toggling the reasoning trace
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<WireThinking>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct WireThinking {
    #[serde(rename = "type")]
    mode: &'static str,
}

impl WireThinking {
    const fn for_request(deep_thinking: bool) -> Self {
        Self {
            mode: if deep_thinking { "enabled" } else { "disabled" },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

impl From<&ChatMessage> for WireMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role.as_str().to_owned(),
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Completion {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireErrorResponse {
    error: WireErrorDetail,
}

#[derive(Debug, Deserialize)]
struct WireErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

// ============================================================================
// SSE Line Buffering
// ============================================================================

/// A parsed SSE event from the vendor stream
#[derive(Debug, Clone, PartialEq, Eq)]
enum SseEvent {
    /// A `data:` payload with the JSON string (prefix stripped)
    Data(String),
    /// The `data: [DONE]` termination signal
    Done,
}

/// Line-buffering SSE parser handling partial lines across TCP chunk boundaries
///
/// SSE streams are newline-delimited, and TCP does not align network chunks
/// with event boundaries. Incomplete lines stay buffered until the
/// terminating `\n` arrives; multiple events in one chunk are all emitted.
#[derive(Debug, Default)]
struct SseLineBuffer {
    buffer: String,
}

impl SseLineBuffer {
    fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning any complete SSE events
    fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut events = Vec::new();
        while let Some(newline_pos) = self.buffer.find('\n') {
            let line = self.buffer[..newline_pos].trim_end_matches('\r').to_owned();
            self.buffer = self.buffer[newline_pos + 1..].to_owned();

            if let Some(event) = Self::parse_line(line.trim()) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing partial line when the byte stream ends
    fn flush(&mut self) -> Option<SseEvent> {
        let remaining = std::mem::take(&mut self.buffer);
        Self::parse_line(remaining.trim())
    }

    fn parse_line(trimmed: &str) -> Option<SseEvent> {
        if trimmed.is_empty() {
            return None;
        }
        if trimmed == "data: [DONE]" {
            return Some(SseEvent::Done);
        }
        // Non-data SSE fields (event:, id:, retry:, comment lines) are ignored
        let data = trimmed.strip_prefix("data: ")?;
        if data.trim().is_empty() {
            None
        } else {
            Some(SseEvent::Data(data.to_owned()))
        }
    }
}

// ============================================================================
// Provider Implementation
// ============================================================================

/// Chat adapter for OpenAI-compatible vendor APIs
pub struct OpenAiCompatibleProvider {
    config: OpenAiCompatibleConfig,
    client: Client,
}

impl OpenAiCompatibleProvider {
    /// Create an adapter from vendor configuration
    #[must_use]
    pub fn new(config: OpenAiCompatibleConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// Pick the upstream model for a request
    fn upstream_model(&self, request: &ChatRequest) -> &str {
        if request.deep_thinking {
            if let Some(reasoning) = &self.config.reasoning_model {
                return reasoning;
            }
        }
        &self.config.chat_model
    }

    fn wire_request(&self, request: &ChatRequest, stream: bool) -> WireRequest {
        let enable_search = (self.config.capabilities.supports_search()
            && request.search_enabled)
            .then_some(true);
        let thinking = self
            .config
            .thinking_toggle
            .then(|| WireThinking::for_request(request.deep_thinking));

        WireRequest {
            model: self.upstream_model(request).to_owned(),
            messages: request.messages.iter().map(WireMessage::from).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream,
            enable_search,
            thinking,
        }
    }

    /// Map a non-2xx vendor response to an `AppError`
    fn parse_error_response(&self, status: reqwest::StatusCode, body: &str) -> AppError {
        let name = self.config.display_name.clone();
        if let Ok(parsed) = serde_json::from_str::<WireErrorResponse>(body) {
            let error_type = parsed.error.error_type.unwrap_or_else(|| "unknown".to_owned());
            AppError::external_service(
                name,
                format!("{error_type} ({status}): {}", parsed.error.message),
            )
        } else {
            AppError::external_service(
                name,
                format!(
                    "API error ({status}): {}",
                    body.chars().take(200).collect::<String>()
                ),
            )
        }
    }

    /// Parse one `data:` JSON payload into zero or more chat events
    ///
    /// A chunk can carry both a reasoning delta and a content delta; the
    /// reasoning delta is emitted first.
    fn parse_data(json_str: &str, provider_name: &str) -> Vec<ChatEvent> {
        let chunk: StreamChunk = match serde_json::from_str(json_str) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("Failed to parse {provider_name} stream chunk: {e}");
                return Vec::new();
            }
        };

        let mut events = Vec::new();
        if let Some(choice) = chunk.choices.into_iter().next() {
            if let Some(reasoning) = choice.delta.reasoning_content {
                if !reasoning.is_empty() {
                    events.push(ChatEvent::Reasoning(reasoning));
                }
            }
            if let Some(content) = choice.delta.content {
                if !content.is_empty() {
                    events.push(ChatEvent::Content(content));
                }
            }
        }
        events
    }
}

#[async_trait]
impl ModelProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.config.provider_name
    }

    fn display_name(&self) -> &str {
        &self.config.display_name
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.config.capabilities
    }

    async fn stream_chat(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> AppResult<ChatEventStream> {
        let wire = self.wire_request(request, true);
        debug!(
            "Streaming chat via {} model {} ({} messages)",
            self.config.provider_name,
            wire.model,
            wire.messages.len()
        );

        let response = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.config.api_key)
            .json(&wire)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to reach {} API: {e}", self.config.provider_name);
                AppError::external_service(
                    self.config.display_name.clone(),
                    format!("Failed to connect: {e}"),
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.parse_error_response(status, &body));
        }

        let provider_name = self.config.provider_name.clone();
        let display_name = self.config.display_name.clone();
        let mut byte_stream = Box::pin(response.bytes_stream());

        let events = stream! {
            let mut parser = SseLineBuffer::new();
            loop {
                let chunk = tokio::select! {
                    // Dropping the byte stream closes the upstream connection
                    () = cancel.cancelled() => return,
                    chunk = byte_stream.next() => chunk,
                };

                match chunk {
                    Some(Ok(bytes)) => {
                        for sse_event in parser.feed(&bytes) {
                            match sse_event {
                                SseEvent::Data(json_str) => {
                                    for event in
                                        Self::parse_data(&json_str, &provider_name)
                                    {
                                        yield event;
                                    }
                                }
                                SseEvent::Done => {
                                    yield ChatEvent::Done;
                                    return;
                                }
                            }
                        }
                    }
                    Some(Err(e)) => {
                        error!("Error reading {provider_name} stream: {e}");
                        yield ChatEvent::Error(format!(
                            "{display_name}: stream read error: {e}"
                        ));
                        return;
                    }
                    None => {
                        // Stream ended without the [DONE] marker; flush and
                        // treat the end of bytes as a clean terminal.
                        if let Some(SseEvent::Data(json_str)) = parser.flush() {
                            for event in Self::parse_data(&json_str, &provider_name) {
                                yield event;
                            }
                        }
                        yield ChatEvent::Done;
                        return;
                    }
                }
            }
        };

        Ok(Box::pin(events))
    }

    async fn complete(&self, request: &ChatRequest) -> AppResult<String> {
        let mut wire = self.wire_request(request, false);
        if let Some(title_model) = &self.config.title_model {
            wire.model.clone_from(title_model);
        }

        let response = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.config.api_key)
            .json(&wire)
            .send()
            .await
            .map_err(|e| {
                AppError::external_service(
                    self.config.display_name.clone(),
                    format!("Failed to connect: {e}"),
                )
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AppError::external_service(
                self.config.display_name.clone(),
                format!("Failed to read response: {e}"),
            )
        })?;

        if !status.is_success() {
            return Err(self.parse_error_response(status, &body));
        }

        let completion: Completion = serde_json::from_str(&body).map_err(|e| {
            AppError::external_service(
                self.config.display_name.clone(),
                format!("Failed to parse response: {e}"),
            )
        })?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                AppError::external_service(
                    self.config.display_name.clone(),
                    "API returned no choices",
                )
            })?;

        Ok(content)
    }
}

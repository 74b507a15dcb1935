// ABOUTME: Model adapter abstraction layer for pluggable chat vendor integration
// ABOUTME: Defines the streaming chat contract, capability flags, and the adapter registry
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Braid Project

//! # Model Adapter Service Provider Interface
//!
//! This module defines the contract that model vendors must implement to
//! plug into the braid chat pipeline.
//!
//! ## Key Concepts
//!
//! - **`ProviderCapabilities`**: Bitflags describing vendor features
//!   (streaming, reasoning traces, live search, system messages)
//! - **`ModelProvider`**: Async trait for streaming chat completion
//! - **`ChatEvent`**: The tagged streaming unit forwarded to clients
//! - **`ProviderRegistry`**: Startup-initialized, read-only lookup from the
//!   public model identifier to its adapter

mod openai_compatible;
pub mod vendors;

pub use openai_compatible::{OpenAiCompatibleConfig, OpenAiCompatibleProvider};

use std::pin::Pin;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::errors::{AppError, AppResult};

// ============================================================================
// Capability Flags
// ============================================================================

bitflags::bitflags! {
    /// Vendor capability flags
    ///
    /// Options a vendor does not support are silently ignored: requesting
    /// `deep_thinking` from a vendor without `REASONING` simply yields a
    /// stream with no reasoning events.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ProviderCapabilities: u8 {
        /// Vendor supports streaming responses
        const STREAMING = 0b0000_0001;
        /// Vendor can emit a thinking trace before the answer
        const REASONING = 0b0000_0010;
        /// Vendor supports live-search augmentation
        const SEARCH = 0b0000_0100;
        /// Vendor supports system messages
        const SYSTEM_MESSAGES = 0b0000_1000;
    }
}

impl ProviderCapabilities {
    /// Capabilities of a plain streaming chat vendor
    #[must_use]
    pub const fn text_only() -> Self {
        Self::STREAMING.union(Self::SYSTEM_MESSAGES)
    }

    /// Check if reasoning traces are supported
    #[must_use]
    pub const fn supports_reasoning(&self) -> bool {
        self.contains(Self::REASONING)
    }

    /// Check if live search is supported
    #[must_use]
    pub const fn supports_search(&self) -> bool {
        self.contains(Self::SEARCH)
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// Role of a message in a chat history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instruction message
    System,
    /// User input message
    User,
    /// Assistant response message
    Assistant,
}

impl MessageRole {
    /// Convert to the string representation used on the wire
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single message in a chat history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender
    pub role: MessageRole,
    /// Content of the message
    pub content: String,
}

impl ChatMessage {
    /// Create a new chat message
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

// ============================================================================
// Request / Event Types
// ============================================================================

/// Configuration for a chat completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Conversation history plus the new prompt as the final user message
    pub messages: Vec<ChatMessage>,
    /// Temperature for response randomness
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Request a reasoning trace where the vendor supports it
    pub deep_thinking: bool,
    /// Request live-search augmentation where the vendor supports it
    pub search_enabled: bool,
}

impl ChatRequest {
    /// Create a new chat request with messages
    #[must_use]
    pub const fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: None,
            max_tokens: None,
            deep_thinking: false,
            search_enabled: false,
        }
    }

    /// Set the temperature
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the maximum tokens
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Request a reasoning trace
    #[must_use]
    pub const fn with_deep_thinking(mut self, enabled: bool) -> Self {
        self.deep_thinking = enabled;
        self
    }

    /// Request live-search augmentation
    #[must_use]
    pub const fn with_search(mut self, enabled: bool) -> Self {
        self.search_enabled = enabled;
        self
    }
}

/// One unit of a streaming chat response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Incremental thinking tokens; never emitted after the first `Content`
    Reasoning(String),
    /// Incremental answer tokens
    Content(String),
    /// Terminal vendor error
    Error(String),
    /// Clean terminal marker
    Done,
}

/// Stream type for chat completion events
pub type ChatEventStream = Pin<Box<dyn Stream<Item = ChatEvent> + Send>>;

// ============================================================================
// Provider Trait
// ============================================================================

/// Model adapter trait
///
/// Implement this trait to add a new chat vendor. Adapters must be safely
/// callable from many concurrent tasks and must honor the cancellation token
/// by closing the upstream HTTP connection.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Public model identifier clients send in requests (e.g. "deepseek")
    fn name(&self) -> &str;

    /// Human-readable display name
    fn display_name(&self) -> &str;

    /// Vendor capabilities
    fn capabilities(&self) -> ProviderCapabilities;

    /// Perform a streaming chat completion
    ///
    /// Vendor failures after the stream starts arrive as
    /// [`ChatEvent::Error`]; a clean end is marked by [`ChatEvent::Done`].
    async fn stream_chat(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> AppResult<ChatEventStream>;

    /// Perform a non-streaming completion, returning the answer text
    ///
    /// Used by background jobs (auto-titling) that need a small one-shot
    /// reply rather than a stream.
    async fn complete(&self, request: &ChatRequest) -> AppResult<String>;
}

impl<'a> std::fmt::Debug for dyn ModelProvider + 'a {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelProvider").field("name", &self.name()).finish()
    }
}

// ============================================================================
// Provider Registry
// ============================================================================

/// Public description of a registered model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Public model identifier
    pub name: String,
    /// Human-readable display name
    pub display_name: String,
    /// Vendor capabilities
    pub capabilities: ProviderCapabilities,
}

/// Registry mapping public model identifiers to adapters
///
/// Built once at startup from configuration, then read-only.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Box<dyn ModelProvider>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Register an adapter
    pub fn register(&mut self, provider: Box<dyn ModelProvider>) {
        self.providers.push(provider);
    }

    /// Get an adapter by public model identifier
    ///
    /// # Errors
    ///
    /// Returns an `UnknownModel` error when no adapter is registered under
    /// the given name.
    pub fn get(&self, name: &str) -> AppResult<&dyn ModelProvider> {
        self.providers
            .iter()
            .find(|p| p.name() == name)
            .map(AsRef::as_ref)
            .ok_or_else(|| AppError::unknown_model(name))
    }

    /// Check whether a model identifier is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.providers.iter().any(|p| p.name() == name)
    }

    /// List all registered models
    #[must_use]
    pub fn list_models(&self) -> Vec<ModelInfo> {
        self.providers
            .iter()
            .map(|p| ModelInfo {
                name: p.name().to_owned(),
                display_name: p.display_name().to_owned(),
                capabilities: p.capabilities(),
            })
            .collect()
    }

    /// Number of registered adapters
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

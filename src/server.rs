// ABOUTME: Process-wide resource container and server bootstrap
// ABOUTME: Builds stores, the adapter registry, and services, then serves the router
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Braid Project

//! Server bootstrap
//!
//! [`ServerResources`] is the dependency container handed to every route
//! handler. It is assembled once at startup: store pools are opened and
//! migrated, the adapter registry is built from vendor configuration, and
//! the two domain services are wired over shared `Arc`s.

use std::str::FromStr;
use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::config::ServerConfig;
use crate::errors::{AppError, AppResult};
use crate::llm::{vendors, ProviderRegistry};
use crate::routes;
use crate::services::{ChatLimits, ChatService, ConversationService};
use crate::store::{
    ConversationStore, MessageStore, SqliteConversationStore, SqliteMessageStore,
};

/// Centralized resource container for dependency injection
pub struct ServerResources {
    /// Loaded configuration
    pub config: ServerConfig,
    /// Model adapter registry; read-only after startup
    pub registry: Arc<ProviderRegistry>,
    /// Streaming chat orchestrator
    pub chat: ChatService,
    /// Conversation CRUD service
    pub conversations: ConversationService,
}

impl ServerResources {
    /// Wire resources from already-constructed stores and registry
    ///
    /// Tests use this entry point with in-memory stores and mock adapters.
    #[must_use]
    pub fn new(
        config: ServerConfig,
        conversation_store: Arc<dyn ConversationStore>,
        message_store: Arc<dyn MessageStore>,
        registry: Arc<ProviderRegistry>,
    ) -> Self {
        let chat = ChatService::new(
            Arc::clone(&conversation_store),
            Arc::clone(&message_store),
            Arc::clone(&registry),
            ChatLimits::from_config(&config.chat),
            config.chat.default_model.clone(),
        );
        let conversations = ConversationService::new(conversation_store, message_store);

        Self {
            config,
            registry,
            chat,
            conversations,
        }
    }
}

/// Open a sqlite pool, creating the database file when missing
async fn open_pool(url: &str) -> AppResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .map_err(|e| AppError::config(format!("Invalid store DSN '{url}': {e}")))?
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .map_err(|e| AppError::database(format!("Failed to open store at '{url}': {e}")))
}

/// Build production resources: sqlite stores plus the vendor registry
///
/// # Errors
///
/// Returns configuration and store errors.
pub async fn build_resources(config: ServerConfig) -> AppResult<Arc<ServerResources>> {
    let conversation_pool = open_pool(&config.database.url).await?;
    let message_pool = if config.database.message_url == config.database.url {
        conversation_pool.clone()
    } else {
        open_pool(&config.database.message_url).await?
    };

    let conversation_store = SqliteConversationStore::new(conversation_pool);
    conversation_store.migrate().await?;
    let message_store = SqliteMessageStore::new(message_pool);
    message_store.migrate().await?;
    info!("Stores migrated and ready");

    let registry = Arc::new(vendors::registry_from_config(&config.providers));

    Ok(Arc::new(ServerResources::new(
        config,
        Arc::new(conversation_store),
        Arc::new(message_store),
        registry,
    )))
}

/// Bind and serve until the process is stopped
///
/// # Errors
///
/// Returns bind and accept-loop errors.
pub async fn serve(config: ServerConfig) -> AppResult<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let resources = build_resources(config).await?;
    let app = routes::router(resources);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::config(format!("Failed to bind {addr}: {e}")))?;
    info!("Braid server listening on {addr}");

    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::internal(format!("Server error: {e}")))
}

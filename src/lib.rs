// ABOUTME: Main library entry point for the braid DAG-chat server
// ABOUTME: Exposes the DAG engine, stores, model adapters, services, and HTTP surface
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Braid Project

#![deny(unsafe_code)]

//! # Braid Server
//!
//! The server-side core of a chat application whose conversations are
//! directed acyclic graphs of messages rather than linear transcripts.
//! Users branch off any prior answer with an alternative follow-up, and
//! merge several answers as joint context for a new question.
//!
//! ## Architecture
//!
//! - **Stores**: a relational conversation store and a document message
//!   store behind traits, with sqlite and in-memory backends
//! - **DAG engine**: sub-DAG construction from a parent set and a
//!   chain-preserving deterministic topological sort
//! - **Model adapters**: one streaming chat capability over the
//!   OpenAI-compatible vendors, behind a startup-built registry
//! - **Chat orchestrator**: validates a request, persists the question,
//!   streams the answer token-by-token over SSE, then persists the answer
//!   while keeping Q/A atomicity strict
//! - **HTTP surface**: axum routes for chat streaming and conversation CRUD
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use braid_server::config::ServerConfig;
//! use braid_server::errors::AppResult;
//!
//! #[tokio::main]
//! async fn main() -> AppResult<()> {
//!     braid_server::logging::init_from_env()?;
//!     let config = ServerConfig::from_env()?;
//!     braid_server::server::serve(config).await
//! }
//! ```

/// Configuration management from environment variables
pub mod config;

/// Sub-DAG construction, topological linearization, and history building
pub mod dag;

/// Unified error handling with standard error codes and HTTP mapping
pub mod errors;

/// Model adapter abstraction and the vendor registry
pub mod llm;

/// Structured logging setup
pub mod logging;

/// Core data models for conversations and message nodes
pub mod models;

/// HTTP routes and the response envelope
pub mod routes;

/// Resource container and server bootstrap
pub mod server;

/// Domain services: chat orchestration and conversation CRUD
pub mod services;

/// Store abstraction with sqlite and in-memory backends
pub mod store;

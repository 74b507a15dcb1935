// ABOUTME: Configuration management for deployment-specific settings
// ABOUTME: Re-exports environment and provider configuration types
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Braid Project

//! Configuration management
//!
//! All configuration is sourced from environment variables (optionally via a
//! `.env` file). `environment` holds the top-level [`ServerConfig`];
//! `providers` holds per-vendor model adapter settings.

pub mod environment;
pub mod providers;

pub use environment::{ChatConfig, DatabaseConfig, ServerConfig};
pub use providers::{ProvidersConfig, VendorConfig};

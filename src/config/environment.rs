// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Orchestrates loading of all configuration sections from environment variables
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Braid Project

//! Environment-based configuration management for production deployment

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::providers::ProvidersConfig;
use crate::errors::{AppError, AppResult};

/// Store connection configuration
///
/// The conversation store is relational; the message store is a document
/// table keyed by node ID. Both default to the same sqlite DSN so a single
/// file serves development setups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// DSN for the conversation store
    pub url: String,
    /// DSN for the message store
    pub message_url: String,
}

impl DatabaseConfig {
    fn from_env() -> Self {
        let url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:braid.db".to_owned());
        let message_url = env::var("MESSAGE_DATABASE_URL").unwrap_or_else(|_| url.clone());
        Self { url, message_url }
    }
}

/// Chat pipeline limits and defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Overall deadline for one adapter call, in seconds
    pub total_timeout_secs: u64,
    /// Inter-token idle timeout, in seconds
    pub idle_timeout_secs: u64,
    /// Model used when a request does not specify one (also the auto-title model)
    pub default_model: String,
}

impl ChatConfig {
    fn from_env() -> Self {
        Self {
            total_timeout_secs: env_parse("CHAT_TOTAL_TIMEOUT_SEC", 120),
            idle_timeout_secs: env_parse("CHAT_IDLE_TIMEOUT_SEC", 30),
            default_model: env::var("DEFAULT_MODEL").unwrap_or_else(|_| "deepseek".to_owned()),
        }
    }

    /// Overall deadline as a [`Duration`]
    #[must_use]
    pub const fn total_timeout(&self) -> Duration {
        Duration::from_secs(self.total_timeout_secs)
    }

    /// Idle timeout as a [`Duration`]
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Top-level server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// HTTP port
    pub port: u16,
    /// Store connection settings
    pub database: DatabaseConfig,
    /// Chat pipeline settings
    pub chat: ChatConfig,
    /// Model vendor settings
    pub providers: ProvidersConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values.
    pub fn from_env() -> AppResult<Self> {
        // Load .env file if it exists
        if let Err(e) = dotenvy::dotenv() {
            warn!("No .env file found or failed to load: {}", e);
        }

        let config = Self {
            host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_owned()),
            port: env_parse("API_PORT", 8000),
            database: DatabaseConfig::from_env(),
            chat: ChatConfig::from_env(),
            providers: ProvidersConfig::from_env(),
        };

        config.validate()?;
        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns an error if configuration values are invalid or conflicting.
    pub fn validate(&self) -> AppResult<()> {
        if self.port == 0 {
            return Err(AppError::config("API_PORT must be non-zero"));
        }
        if self.chat.total_timeout_secs == 0 || self.chat.idle_timeout_secs == 0 {
            return Err(AppError::config("Chat timeouts must be non-zero"));
        }
        if self.chat.idle_timeout_secs > self.chat.total_timeout_secs {
            warn!(
                "CHAT_IDLE_TIMEOUT_SEC ({}) exceeds CHAT_TOTAL_TIMEOUT_SEC ({}); the total deadline wins",
                self.chat.idle_timeout_secs, self.chat.total_timeout_secs
            );
        }
        if self.providers.configured_count() == 0 {
            warn!("No model vendor API keys configured; /chat will reject every model");
        }
        Ok(())
    }

    /// Get a summary of the configuration for logging (without secrets)
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Braid Server Configuration:\n\
             - Bind: {}:{}\n\
             - Conversation store: {}\n\
             - Message store: {}\n\
             - Default model: {}\n\
             - Chat timeouts: total {}s, idle {}s\n\
             - Configured vendors: {}",
            self.host,
            self.port,
            redact_dsn(&self.database.url),
            redact_dsn(&self.database.message_url),
            self.chat.default_model,
            self.chat.total_timeout_secs,
            self.chat.idle_timeout_secs,
            self.providers.configured_count(),
        )
    }
}

/// Parse an env var as a number, falling back to a default
fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Strip credentials from a DSN for log output
fn redact_dsn(dsn: &str) -> String {
    match dsn.split_once('@') {
        Some((scheme_and_creds, rest)) => match scheme_and_creds.split_once("://") {
            Some((scheme, _)) => format!("{scheme}://***@{rest}"),
            None => format!("***@{rest}"),
        },
        None => dsn.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_credentials_in_dsn() {
        assert_eq!(
            redact_dsn("mysql://user:pw@localhost:3306/braid"),
            "mysql://***@localhost:3306/braid"
        );
        assert_eq!(redact_dsn("sqlite:braid.db"), "sqlite:braid.db");
    }

    #[test]
    fn validate_rejects_zero_timeouts() {
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 8000,
            database: DatabaseConfig {
                url: "sqlite::memory:".into(),
                message_url: "sqlite::memory:".into(),
            },
            chat: ChatConfig {
                total_timeout_secs: 0,
                idle_timeout_secs: 30,
                default_model: "deepseek".into(),
            },
            providers: ProvidersConfig::from_env(),
        };
        assert!(config.validate().is_err());
    }
}

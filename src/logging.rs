// ABOUTME: Logging configuration and structured logging setup for observability
// ABOUTME: Configures log levels, formats, and output destinations from the environment
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Braid Project

//! Production-ready logging configuration with structured output

use std::env;

use crate::errors::{AppError, AppResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error) or a full directive
    pub level: String,
    /// Output format (json, pretty, compact)
    pub format: LogFormat,
    /// Include source file and line numbers
    pub include_location: bool,
}

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON format for production logging
    Json,
    /// Pretty format for development
    Pretty,
    /// Compact format for space-constrained environments
    Compact,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Pretty,
            include_location: false,
        }
    }
}

impl LoggingConfig {
    /// Create logging configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info".into());

        let format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") => LogFormat::Compact,
            _ => LogFormat::Pretty,
        };

        Self {
            level,
            format,
            include_location: env::var("LOG_INCLUDE_LOCATION").is_ok(),
        }
    }

    /// Install this configuration as the global tracing subscriber
    ///
    /// # Errors
    ///
    /// Returns an error if the level directive cannot be parsed or a global
    /// subscriber is already installed.
    pub fn init(&self) -> AppResult<()> {
        let filter = EnvFilter::try_new(&self.level)
            .map_err(|e| AppError::config(format!("Invalid log filter '{}': {e}", self.level)))?;

        let registry = tracing_subscriber::registry().with(filter);

        let result = match self.format {
            LogFormat::Json => registry
                .with(
                    fmt::layer()
                        .json()
                        .with_file(self.include_location)
                        .with_line_number(self.include_location),
                )
                .try_init(),
            LogFormat::Pretty => registry
                .with(
                    fmt::layer()
                        .with_file(self.include_location)
                        .with_line_number(self.include_location),
                )
                .try_init(),
            LogFormat::Compact => registry
                .with(
                    fmt::layer()
                        .compact()
                        .with_file(self.include_location)
                        .with_line_number(self.include_location),
                )
                .try_init(),
        };

        result.map_err(|e| AppError::config(format!("Failed to install subscriber: {e}")))
    }
}

/// Initialize logging from environment variables
///
/// # Errors
///
/// Returns an error if the subscriber cannot be installed.
pub fn init_from_env() -> AppResult<()> {
    LoggingConfig::from_env().init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_pretty_info() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(!config.include_location);
    }
}

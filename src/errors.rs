// ABOUTME: Centralized error handling and error types for the braid API
// ABOUTME: Defines error codes, HTTP status mapping, and response envelope formatting
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Braid Project

//! # Unified Error Handling System
//!
//! This module provides the centralized error handling system for braid.
//! It defines standard error codes, HTTP status mapping, and the sanitized
//! messages exposed to clients.

use std::fmt::{self, Display};
use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error as ThisError;
use uuid::Error as UuidError;

/// Standard error codes used throughout the application
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Validation
    /// Input validation failed
    InvalidInput,
    /// Required field is missing from request
    MissingRequiredField,

    // Resource Management
    /// Requested resource (conversation or message) was not found
    ResourceNotFound,

    // Chat pipeline
    /// Requested model has no registered adapter
    UnknownModel,
    /// Message graph contained a cycle or an unsatisfiable dependency
    InvalidDag,

    // External Services
    /// Model vendor returned an error
    ExternalServiceError,
    /// Model vendor is unavailable or timed out
    ExternalServiceUnavailable,

    // Configuration
    /// Configuration error occurred
    ConfigError,
    /// Required configuration is missing
    ConfigMissing,

    // Internal Errors
    /// Internal server error
    InternalError,
    /// Store operation failed
    DatabaseError,
    /// Serialization/deserialization failed
    SerializationError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            // 400 Bad Request
            Self::InvalidInput | Self::MissingRequiredField | Self::UnknownModel => 400,

            // 404 Not Found
            Self::ResourceNotFound => 404,

            // 502 Bad Gateway
            Self::ExternalServiceError => 502,

            // 503 Service Unavailable
            Self::ExternalServiceUnavailable => 503,

            // 500 Internal Server Error
            Self::InvalidDag
            | Self::ConfigError
            | Self::ConfigMissing
            | Self::InternalError
            | Self::DatabaseError
            | Self::SerializationError => 500,
        }
    }

    /// Get a user-friendly description of this error
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::InvalidInput => "The provided input is invalid",
            Self::MissingRequiredField => "A required field is missing from the request",
            Self::ResourceNotFound => "The requested resource was not found",
            Self::UnknownModel => "The requested model is not supported",
            Self::InvalidDag => "The conversation graph is inconsistent",
            Self::ExternalServiceError => "The model service encountered an error",
            Self::ExternalServiceUnavailable => "The model service is currently unavailable",
            Self::ConfigError => "Configuration error encountered",
            Self::ConfigMissing => "Required configuration is missing",
            Self::InternalError => "An internal server error occurred",
            Self::DatabaseError => "Store operation failed",
            Self::SerializationError => "Data serialization/deserialization failed",
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&format!("{self:?}"))
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "InvalidInput" => Ok(Self::InvalidInput),
            "MissingRequiredField" => Ok(Self::MissingRequiredField),
            "ResourceNotFound" => Ok(Self::ResourceNotFound),
            "UnknownModel" => Ok(Self::UnknownModel),
            "InvalidDag" => Ok(Self::InvalidDag),
            "ExternalServiceError" => Ok(Self::ExternalServiceError),
            "ExternalServiceUnavailable" => Ok(Self::ExternalServiceUnavailable),
            "ConfigError" => Ok(Self::ConfigError),
            "ConfigMissing" => Ok(Self::ConfigMissing),
            "InternalError" => Ok(Self::InternalError),
            "DatabaseError" => Ok(Self::DatabaseError),
            "SerializationError" => Ok(Self::SerializationError),
            _ => Err(serde::de::Error::unknown_variant(&s, &[])),
        }
    }
}

/// Application error type carried through every fallible path
#[derive(Debug, Clone, ThisError)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
}

impl AppError {
    /// Create a new `AppError` with the given code and message
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Get sanitized message safe for client exposure
    ///
    /// Validation and lookup failures carry actionable detail; store and
    /// internal failures are replaced with their generic description.
    #[must_use]
    pub fn sanitized_message(&self) -> String {
        match self.code {
            ErrorCode::InvalidInput
            | ErrorCode::MissingRequiredField
            | ErrorCode::ResourceNotFound
            | ErrorCode::UnknownModel
            | ErrorCode::ExternalServiceError
            | ErrorCode::ExternalServiceUnavailable => self.message.clone(),
            _ => self.code.description().to_owned(),
        }
    }

    /// Get full error details for internal logging
    #[must_use]
    pub fn internal_details(&self) -> String {
        format!("{:?}: {}", self.code, self.message)
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

// AppError deliberately does not implement axum's IntoResponse: business
// errors always ship inside the `routes::ApiResponse` envelope with HTTP
// 200, so a handler returning `Result<_, AppError>` directly will not
// compile instead of silently picking the wrong status.

/// Convenience constructors for common errors
impl AppError {
    /// Invalid input
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Required field missing
    #[must_use]
    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("Missing required field: {field}"),
        )
    }

    /// Resource not found
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        let resource_str = resource.into();
        Self::new(
            ErrorCode::ResourceNotFound,
            format!("{resource_str} not found"),
        )
    }

    /// Unknown model identifier
    #[must_use]
    pub fn unknown_model(model: impl Into<String>) -> Self {
        let model_str = model.into();
        Self::new(
            ErrorCode::UnknownModel,
            format!("Unsupported model: {model_str}"),
        )
    }

    /// Cycle or unsatisfiable dependency in the message graph
    #[must_use]
    pub fn invalid_dag(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidDag, message)
    }

    /// External model service error
    #[must_use]
    pub fn external_service(service: impl Into<String>, message: impl Into<String>) -> Self {
        let service_str = service.into();
        let message_str = message.into();
        Self::new(
            ErrorCode::ExternalServiceError,
            format!("{service_str}: {message_str}"),
        )
    }

    /// Internal server error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Store error
    #[must_use]
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }
}

/// Conversion from `std::io::Error` to `AppError`
impl From<io::Error> for AppError {
    fn from(error: io::Error) -> Self {
        Self::new(ErrorCode::InternalError, format!("IO error: {error}"))
    }
}

/// Conversion from `serde_json::Error` to `AppError`
impl From<JsonError> for AppError {
    fn from(error: JsonError) -> Self {
        Self::new(
            ErrorCode::SerializationError,
            format!("JSON error: {error}"),
        )
    }
}

/// Conversion from `sqlx::Error` to `AppError`
impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        Self::database(format!("Store operation failed: {error}"))
    }
}

/// Conversion from `uuid::Error` to `AppError`
impl From<UuidError> for AppError {
    fn from(error: UuidError) -> Self {
        Self::new(ErrorCode::InvalidInput, format!("UUID error: {error}"))
    }
}

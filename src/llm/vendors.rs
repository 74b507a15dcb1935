// ABOUTME: Vendor catalog mapping public model identifiers to configured adapters
// ABOUTME: Builds the process-wide provider registry from environment configuration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Braid Project

//! Supported chat vendors
//!
//! All four vendors speak the OpenAI-compatible wire format, so each is an
//! [`OpenAiCompatibleProvider`] with vendor-specific models and capability
//! flags. Only vendors with an API key configured are registered.

use tracing::info;

use super::{OpenAiCompatibleConfig, OpenAiCompatibleProvider, ProviderCapabilities, ProviderRegistry};
use crate::config::providers::{ProvidersConfig, VendorConfig};

fn deepseek(vendor: &VendorConfig, api_key: String) -> OpenAiCompatibleProvider {
    OpenAiCompatibleProvider::new(OpenAiCompatibleConfig {
        provider_name: "deepseek".into(),
        display_name: "DeepSeek".into(),
        base_url: vendor.base_url.clone(),
        api_key,
        chat_model: "deepseek-chat".into(),
        reasoning_model: Some("deepseek-reasoner".into()),
        title_model: None,
        thinking_toggle: false,
        capabilities: ProviderCapabilities::STREAMING
            | ProviderCapabilities::REASONING
            | ProviderCapabilities::SYSTEM_MESSAGES,
    })
}

fn qwen(vendor: &VendorConfig, api_key: String) -> OpenAiCompatibleProvider {
    OpenAiCompatibleProvider::new(OpenAiCompatibleConfig {
        provider_name: "qwen".into(),
        display_name: "Qwen".into(),
        base_url: vendor.base_url.clone(),
        api_key,
        chat_model: "qwen-plus".into(),
        reasoning_model: None,
        title_model: None,
        thinking_toggle: false,
        capabilities: ProviderCapabilities::STREAMING
            | ProviderCapabilities::SEARCH
            | ProviderCapabilities::SYSTEM_MESSAGES,
    })
}

fn kimi(vendor: &VendorConfig, api_key: String) -> OpenAiCompatibleProvider {
    OpenAiCompatibleProvider::new(OpenAiCompatibleConfig {
        provider_name: "kimi".into(),
        display_name: "Kimi".into(),
        base_url: vendor.base_url.clone(),
        api_key,
        chat_model: "kimi-k2-turbo-preview".into(),
        reasoning_model: Some("kimi-k2-thinking-turbo".into()),
        title_model: Some("moonshot-v1-8k".into()),
        thinking_toggle: false,
        capabilities: ProviderCapabilities::STREAMING
            | ProviderCapabilities::REASONING
            | ProviderCapabilities::SYSTEM_MESSAGES,
    })
}

fn glm(vendor: &VendorConfig, api_key: String) -> OpenAiCompatibleProvider {
    OpenAiCompatibleProvider::new(OpenAiCompatibleConfig {
        provider_name: "glm".into(),
        display_name: "GLM".into(),
        base_url: vendor.base_url.clone(),
        api_key,
        chat_model: "glm-4.6".into(),
        reasoning_model: None,
        title_model: None,
        thinking_toggle: true,
        capabilities: ProviderCapabilities::STREAMING
            | ProviderCapabilities::REASONING
            | ProviderCapabilities::SYSTEM_MESSAGES,
    })
}

/// Build the adapter registry from vendor configuration
///
/// Vendors without an API key are skipped so a deployment can run with any
/// subset of the catalog.
#[must_use]
pub fn registry_from_config(config: &ProvidersConfig) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    if let Some(key) = config.deepseek.api_key.clone() {
        registry.register(Box::new(deepseek(&config.deepseek, key)));
    }
    if let Some(key) = config.qwen.api_key.clone() {
        registry.register(Box::new(qwen(&config.qwen, key)));
    }
    if let Some(key) = config.kimi.api_key.clone() {
        registry.register(Box::new(kimi(&config.kimi, key)));
    }
    if let Some(key) = config.glm.api_key.clone() {
        registry.register(Box::new(glm(&config.glm, key)));
    }

    info!(
        "Model registry initialized with {} adapter(s): {:?}",
        registry.len(),
        registry
            .list_models()
            .iter()
            .map(|m| m.name.clone())
            .collect::<Vec<_>>()
    );

    registry
}

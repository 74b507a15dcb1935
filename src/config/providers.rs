// ABOUTME: Per-vendor model adapter configuration loaded from environment variables
// ABOUTME: Covers API keys and base URLs for the OpenAI-compatible chat vendors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Braid Project

use std::env;

use serde::{Deserialize, Serialize};

/// Settings for one OpenAI-compatible chat vendor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorConfig {
    /// API key; the vendor is only registered when this is set
    pub api_key: Option<String>,
    /// Base URL of the vendor's OpenAI-compatible endpoint
    pub base_url: String,
}

impl VendorConfig {
    fn from_env(key_var: &str, url_var: &str, default_url: &str) -> Self {
        Self {
            api_key: env::var(key_var).ok().filter(|k| !k.is_empty()),
            base_url: env::var(url_var).unwrap_or_else(|_| default_url.to_owned()),
        }
    }

    /// Whether this vendor has credentials and can be registered
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Configuration for all supported model vendors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// `DeepSeek` (deepseek-chat / deepseek-reasoner)
    pub deepseek: VendorConfig,
    /// Qwen via `DashScope`'s compatible-mode endpoint
    pub qwen: VendorConfig,
    /// Kimi (Moonshot)
    pub kimi: VendorConfig,
    /// GLM (Zhipu)
    pub glm: VendorConfig,
}

impl ProvidersConfig {
    /// Load vendor settings from environment variables
    ///
    /// Each vendor reads `<VENDOR>_API_KEY` and `<VENDOR>_API_BASE_URL`, with
    /// the official endpoint as the URL default. Vendors without an API key
    /// are skipped at registry construction time.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            deepseek: VendorConfig::from_env(
                "DEEPSEEK_API_KEY",
                "DEEPSEEK_API_BASE_URL",
                "https://api.deepseek.com/v1",
            ),
            qwen: VendorConfig::from_env(
                "QWEN_API_KEY",
                "QWEN_API_BASE_URL",
                "https://dashscope.aliyuncs.com/compatible-mode/v1",
            ),
            kimi: VendorConfig::from_env(
                "KIMI_API_KEY",
                "KIMI_API_BASE_URL",
                "https://api.moonshot.cn/v1",
            ),
            glm: VendorConfig::from_env(
                "GLM_API_KEY",
                "GLM_API_BASE_URL",
                "https://open.bigmodel.cn/api/paas/v4",
            ),
        }
    }

    /// Count of vendors with credentials
    #[must_use]
    pub fn configured_count(&self) -> usize {
        [&self.deepseek, &self.qwen, &self.kimi, &self.glm]
            .into_iter()
            .filter(|v| v.is_configured())
            .count()
    }
}

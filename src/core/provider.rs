//! Provider abstraction layer for text generation backends
//!
//! Every API surface reduces its request to a single prompt and hands it to
//! the active [`Provider`]. This module defines that trait, the options and
//! response it exchanges, and the static model catalogue.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::core::constants::gemini::DEFAULT_MODEL;

/// Error types for provider operations
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("client not initialized")]
    NotInitialized,

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("generate failed with status: {status}")]
    Upstream { status: u16 },

    #[error("failed to parse response")]
    Parse,

    #[error("cookie rotation failed: {0}")]
    Rotation(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider '{name}' not found. Available providers: {available:?}")]
    NotFound {
        name: String,
        available: Vec<String>,
    },
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport(err.to_string())
    }
}

/// Per-call generation options
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub model: Option<String>,
}

impl GenerateOptions {
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
        }
    }

    /// Requested model, or the backend default
    pub fn model_or_default(&self) -> &str {
        self.model
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_MODEL)
    }
}

/// Conversation identifiers returned alongside a reply
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResponseMetadata {
    pub cid: String,
    pub rid: String,
    pub rcid: String,
}

/// A complete reply from the backend
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderResponse {
    pub text: String,
    pub metadata: ResponseMetadata,
}

/// Catalogue entry for a model a provider can serve
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub provider: &'static str,
    pub created: i64,
    pub owned_by: &'static str,
}

/// Models advertised on the list endpoints
pub const SUPPORTED_MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "gemini-pro",
        provider: "gemini",
        created: 1702252800,
        owned_by: "google",
    },
    ModelInfo {
        id: "gemini-1.5-flash",
        provider: "gemini",
        created: 1715644800,
        owned_by: "google",
    },
    ModelInfo {
        id: "gemini-1.5-pro",
        provider: "gemini",
        created: 1715644800,
        owned_by: "google",
    },
    ModelInfo {
        id: "gemini-2.0-flash",
        provider: "gemini",
        created: 1733788800,
        owned_by: "google",
    },
];

/// Catalogue entries served by `provider`
pub fn models_for(provider: &str) -> Vec<ModelInfo> {
    SUPPORTED_MODELS
        .iter()
        .filter(|m| m.provider == provider)
        .cloned()
        .collect()
}

/// Trait for text generation backends
#[async_trait]
pub trait Provider: Send + Sync {
    /// Authenticate and prepare the backend
    async fn init(&self) -> Result<(), ProviderError>;

    /// Generate a complete reply for `prompt`
    async fn generate_content(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<ProviderResponse, ProviderError>;

    /// Stop background work and mark the provider unhealthy
    async fn close(&self) -> Result<(), ProviderError>;

    fn name(&self) -> &str;

    fn is_healthy(&self) -> bool;

    fn list_models(&self) -> Vec<ModelInfo>;
}

//! Upstream text-generation clients
//!
//! The AI handlers talk to a [`ModelClient`]; which server sits behind it
//! (a local Ollama instance or an OpenAI-compatible completion API) is a
//! configuration choice.

mod ollama;
mod openai;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{ModelConfig, ModelProvider};
use crate::error::{AppError, ProxyError};

/// Token counts for one model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
}

impl TokenUsage {
    pub fn new(input_tokens: i64, output_tokens: i64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

/// Sampling knobs forwarded to the upstream server.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub repeat_penalty: Option<f32>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 800,
            repeat_penalty: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub options: GenerationOptions,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>, options: GenerationOptions) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            options,
        }
    }

    /// Input estimate over the concatenated system and user text.
    pub fn estimated_input_tokens(&self) -> i64 {
        estimate_tokens(&format!("{}{}", self.system, self.user))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub usage: TokenUsage,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, AppError>;
}

/// Rough token estimate used when the upstream does not report counts.
pub fn estimate_tokens(text: &str) -> i64 {
    let chars = text.chars().count() as i64;
    (chars + 3) / 4
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, AppError> {
    let mut builder = reqwest::Client::builder();
    if timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(timeout_secs));
    }
    builder
        .build()
        .map_err(|e| AppError::ProxyError(ProxyError::RequestFailed(e.to_string())))
}

/// Reads the body of a non-2xx reply into a `ProxyError`.
pub(crate) async fn upstream_error(response: reqwest::Response) -> AppError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    AppError::ProxyError(ProxyError::UpstreamStatus { status, body })
}

pub fn build_model_client(config: &ModelConfig) -> Result<Arc<dyn ModelClient>, AppError> {
    let client: Arc<dyn ModelClient> = match config.provider {
        ModelProvider::Ollama => Arc::new(OllamaClient::new(
            &config.base_url,
            &config.model,
            config.request_timeout_secs,
        )?),
        ModelProvider::OpenAi => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                AppError::ConfigError("model.api_key is required for the openai provider".into())
            })?;
            Arc::new(OpenAiClient::new(
                &config.base_url,
                &config.model,
                api_key,
                config.request_timeout_secs,
            )?)
        }
    };
    Ok(client)
}

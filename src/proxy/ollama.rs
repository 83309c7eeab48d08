use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{estimate_tokens, http_client, upstream_error, Completion, CompletionRequest, ModelClient, TokenUsage};
use crate::error::{AppError, ProxyError};

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    repeat_penalty: Option<f32>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Client for a local Ollama server's `/api/generate` endpoint.
pub struct OllamaClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self, AppError> {
        Ok(Self {
            http: http_client(timeout_secs)?,
            endpoint: format!("{}/api/generate", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl ModelClient for OllamaClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, AppError> {
        let full_prompt = format!("{}\n\n{}", request.system, request.user);
        let body = GenerateRequest {
            model: &self.model,
            prompt: &full_prompt,
            stream: false,
            options: GenerateOptions {
                temperature: request.options.temperature,
                top_p: request.options.top_p,
                num_predict: request.options.max_tokens,
                repeat_penalty: request.options.repeat_penalty,
            },
        };

        debug!("Calling Ollama model {} at {}", self.model, self.endpoint);
        let response = self.http.post(&self.endpoint).json(&body).send().await.map_err(|e| {
            error!("Ollama request failed: {}", e);
            AppError::ProxyError(ProxyError::RequestFailed(format!(
                "could not reach the model server at {} (is `ollama serve` running?): {}",
                self.endpoint, e
            )))
        })?;

        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        let data: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AppError::ProxyError(ProxyError::ResponseError(e.to_string())))?;

        // Some builds echo the prompt ahead of the completion.
        let content = match data.response.strip_prefix(full_prompt.as_str()) {
            Some(rest) => rest.trim().to_string(),
            None => data.response,
        };

        let usage = TokenUsage::new(
            request.estimated_input_tokens(),
            estimate_tokens(&content),
        );

        Ok(Completion { content, usage })
    }
}

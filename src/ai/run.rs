use crate::error::AppError;
use crate::proxy::{Completion, CompletionRequest, GenerationOptions, ModelClient};

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

pub fn build_request(content: &str) -> CompletionRequest {
    CompletionRequest::new(SYSTEM_PROMPT, content, GenerationOptions::default())
}

/// Sends a stored prompt to the model as-is and returns the raw reply.
pub async fn run_prompt(client: &dyn ModelClient, content: &str) -> Result<Completion, AppError> {
    client.complete(&build_request(content)).await
}

use actix_web::{web, HttpResponse};
use chrono::Local;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::{generate, optimize, run};
use crate::auth::AuthenticatedUser;
use crate::db::{NewPrompt, Prompt, PromptSource, User};
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
}

/// Body shared by optimize and run: inline content, a stored prompt, or both.
#[derive(Debug, Deserialize)]
pub struct PromptTarget {
    #[serde(default, rename = "promptContent")]
    pub prompt_content: Option<String>,
    #[serde(default, rename = "promptId")]
    pub prompt_id: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Loads the caller and rejects the request when the free allowance is spent.
async fn user_within_quota(state: &AppState, auth: &AuthenticatedUser) -> Result<User, AppError> {
    let user = state.auth_service.current_user(&auth.claims).await?;
    state.usage.check(&user, &Local::now()).await?;
    Ok(user)
}

async fn owned_prompt(state: &AppState, user_id: Uuid, id: &str) -> Result<Prompt, AppError> {
    let not_found = || AppError::NotFound("Prompt".into());
    let id = Uuid::parse_str(id.trim()).map_err(|_| not_found())?;
    state.db.get_prompt_for_user(id, user_id).await?.ok_or_else(not_found)
}

impl PromptTarget {
    /// Resolves the text to send upstream. Inline content wins; a given id
    /// must always belong to the caller.
    async fn resolve(self, state: &AppState, user_id: Uuid) -> Result<(String, Option<Prompt>), AppError> {
        let prompt = match self.prompt_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => Some(owned_prompt(state, user_id, id).await?),
            None => None,
        };

        let content = non_blank(self.prompt_content)
            .or_else(|| prompt.as_ref().map(|p| p.content.clone()))
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AppError::validation("Prompt content is empty or undefined"))?;

        Ok((content, prompt))
    }

    fn is_empty(&self) -> bool {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
        blank(&self.prompt_content) && blank(&self.prompt_id)
    }
}

pub async fn generate_prompt(
    auth: AuthenticatedUser,
    req: web::Json<GenerateRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let req = req.into_inner();
    let task = non_blank(req.task).ok_or_else(|| AppError::validation("Task description is required"))?;
    let context = non_blank(req.context);

    let user = user_within_quota(&state, &auth).await?;

    let (generated, usage) = generate::generate_prompt(state.model.as_ref(), &task, context.as_deref()).await?;
    let recorded = state.usage.record(user.id, None, usage, &Local::now()).await?;

    let prompt = state
        .db
        .create_prompt(
            user.id,
            &NewPrompt {
                title: generated.title,
                content: generated.content,
                category: None,
                tags: generated.tags,
                source: PromptSource::Ai,
                summary: Some(format!("Generated from task: {}", task)),
            },
        )
        .await?;
    info!("User {} generated prompt {} ({} tokens)", user.id, prompt.id, usage.total_tokens);

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "prompt": prompt,
        "tokens_used": usage.total_tokens,
        "usage_remaining": recorded.remaining,
        "message": "Prompt successfully generated by AI"
    })))
}

pub async fn optimize_prompt(
    auth: AuthenticatedUser,
    req: web::Json<PromptTarget>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let target = req.into_inner();
    if target.is_empty() {
        return Err(AppError::validation("Either promptContent or promptId is required"));
    }

    let user = user_within_quota(&state, &auth).await?;
    let (content, prompt) = target.resolve(&state, user.id).await?;

    let (optimized, usage) = optimize::optimize_prompt(state.model.as_ref(), &content).await?;
    let prompt_id = prompt.as_ref().map(|p| p.id);
    let recorded = state.usage.record(user.id, prompt_id, usage, &Local::now()).await?;

    if let Some(prompt_id) = prompt_id {
        let version = state
            .db
            .create_prompt_version(prompt_id, &optimized.improved_prompt)
            .await?;
        info!("Saved version {} of prompt {}", version.version, prompt_id);
    }

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "improved_prompt": optimized.improved_prompt,
        "improvement_notes": optimized.improvements,
        "tokens_used": usage.total_tokens,
        "usage_remaining": recorded.remaining
    })))
}

pub async fn run_prompt(
    auth: AuthenticatedUser,
    req: web::Json<PromptTarget>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let target = req.into_inner();
    if target.is_empty() {
        return Err(AppError::validation("Either promptId or promptContent is required"));
    }

    let user = user_within_quota(&state, &auth).await?;
    let (content, prompt) = target.resolve(&state, user.id).await?;

    let completion = run::run_prompt(state.model.as_ref(), &content).await?;
    let recorded = state
        .usage
        .record(user.id, prompt.map(|p| p.id), completion.usage, &Local::now())
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "response": completion.content,
        "tokens_used": completion.usage.total_tokens,
        "usage_remaining": recorded.remaining,
        "monthly_limit": state.usage.free_limit(),
        "tokens_used_this_month": recorded.month_total,
        "usageRecord": recorded.record
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_target_emptiness() {
        let target: PromptTarget = serde_json::from_value(json!({})).unwrap();
        assert!(target.is_empty());

        let target: PromptTarget = serde_json::from_value(json!({ "promptContent": "  ", "promptId": "" })).unwrap();
        assert!(target.is_empty());

        let target: PromptTarget = serde_json::from_value(json!({ "promptContent": "Say hi" })).unwrap();
        assert!(!target.is_empty());

        let target: PromptTarget =
            serde_json::from_value(json!({ "promptId": Uuid::new_v4().to_string() })).unwrap();
        assert!(!target.is_empty());
    }

    #[test]
    fn test_generate_request_defaults() {
        let req: GenerateRequest = serde_json::from_value(json!({ "task": "Plan a launch" })).unwrap();
        assert_eq!(req.task.as_deref(), Some("Plan a launch"));
        assert!(req.context.is_none());
        assert!(non_blank(Some(" ".into())).is_none());
    }
}

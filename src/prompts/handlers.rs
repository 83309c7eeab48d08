use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::transfer::{export_filename, parse_import, PromptInput};
use crate::auth::AuthenticatedUser;
use crate::db::{NewPrompt, PromptSort};
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub tag: Option<String>,
    pub sort: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrImportRequest {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub prompts: Option<Value>,
    #[serde(flatten)]
    pub prompt: PromptInput,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(flatten)]
    pub prompt: PromptInput,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub id: Option<String>,
}

/// Parses a prompt id from a request body. Absent ids fail with `missing`.
fn parse_prompt_id(id: Option<&str>, missing: &str) -> Result<Uuid, AppError> {
    let id = id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::validation(missing))?;
    Uuid::parse_str(id).map_err(|_| AppError::validation("Invalid prompt ID"))
}

fn prompt_not_found() -> AppError {
    AppError::NotFound("Prompt".into())
}

pub async fn list_prompts(
    auth: AuthenticatedUser,
    query: web::Query<ListQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let tag = query.tag.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let sort = PromptSort::from_query(query.sort.as_deref());

    let prompts = state.db.list_prompts(auth.user_id, tag, sort).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "prompts": prompts
    })))
}

pub async fn create_prompt(
    auth: AuthenticatedUser,
    req: web::Json<CreateOrImportRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let req = req.into_inner();

    if req.action.as_deref() == Some("import") {
        let items = parse_import(req.prompts.as_ref())?;
        let inserted = state.db.import_prompts(auth.user_id, &items).await?;
        info!("User {} imported {} prompts", auth.user_id, inserted.len());
        return Ok(HttpResponse::Created().json(json!({
            "success": true,
            "message": format!("Imported {} prompts", inserted.len()),
            "prompts": inserted
        })));
    }

    let new_prompt = req
        .prompt
        .into_new_prompt()
        .ok_or_else(|| AppError::validation("Title and content are required"))?;
    // Prompts created through this route are always user-authored.
    let new_prompt = NewPrompt::authored(new_prompt.title, new_prompt.content, new_prompt.category, new_prompt.tags);

    let prompt = state.db.create_prompt(auth.user_id, &new_prompt).await?;
    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "prompt": prompt
    })))
}

pub async fn update_prompt(
    auth: AuthenticatedUser,
    req: web::Json<UpdateRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let req = req.into_inner();
    let required = "ID, title, and content are required";
    let id = parse_prompt_id(req.id.as_deref(), required)?;
    let changes = req
        .prompt
        .into_new_prompt()
        .ok_or_else(|| AppError::validation(required))?;

    let prompt = state
        .db
        .update_prompt_for_user(id, auth.user_id, &changes)
        .await?
        .ok_or_else(prompt_not_found)?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "prompt": prompt
    })))
}

pub async fn delete_prompt(
    auth: AuthenticatedUser,
    req: web::Json<DeleteRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let id = parse_prompt_id(req.id.as_deref(), "Prompt ID is required")?;

    if !state.db.delete_prompt_for_user(id, auth.user_id).await? {
        return Err(prompt_not_found());
    }

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Prompt deleted successfully"
    })))
}

pub async fn export_prompts(
    auth: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let prompts = state.db.list_prompts_for_export(auth.user_id).await?;
    let filename = export_filename(chrono::Local::now().date_naive());

    Ok(HttpResponse::Ok()
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(filename)],
        })
        .json(prompts))
}

pub async fn list_versions(
    auth: AuthenticatedUser,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let id = Uuid::parse_str(path.as_str()).map_err(|_| prompt_not_found())?;
    let prompt = state
        .db
        .get_prompt_for_user(id, auth.user_id)
        .await?
        .ok_or_else(prompt_not_found)?;

    let versions = state.db.list_prompt_versions(prompt.id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "prompt_id": prompt.id,
        "versions": versions
    })))
}

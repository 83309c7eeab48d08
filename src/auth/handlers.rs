use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::AppState;
use crate::auth::AuthenticatedUser;
use crate::db::User;
use crate::error::AppError;
use tracing::{info, error};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub user: UserSummary,
    pub token: String,
}

impl AuthResponse {
    fn new(user: &User, token: String) -> Self {
        Self {
            success: true,
            user: UserSummary::from(user),
            token,
        }
    }
}

pub async fn login(
    req: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received login request");
    match state.auth_service.authenticate(&req.email, &req.password).await {
        Ok((user, token)) => {
            info!("Login successful for user {}", user.id);
            Ok(HttpResponse::Ok().json(AuthResponse::new(&user, token)))
        }
        Err(e) => {
            error!("Login failed: {}", e);
            Err(e)
        }
    }
}

pub async fn register(
    req: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received registration request");

    match state.auth_service.register(
        &req.email,
        &req.password,
        req.name.as_deref(),
    ).await {
        Ok((user, token)) => {
            info!("Registration successful for user {}", user.id);
            Ok(HttpResponse::Created().json(AuthResponse::new(&user, token)))
        }
        Err(e) => {
            error!("Registration failed: {}", e);
            Err(e)
        }
    }
}

pub async fn me(
    auth: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user = state.auth_service.current_user(&auth.claims).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "user": user
    })))
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

pub async fn oauth_authorize(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let oauth = state.auth_service.oauth()?;
    let url = oauth.authorize_url(&state.auth_service.issue_oauth_state()?)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "provider": oauth.provider(),
        "url": url
    })))
}

pub async fn oauth_callback(
    query: web::Query<OAuthCallbackQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state.auth_service.oauth()?;
    if let Some(reason) = &query.error {
        return Err(AppError::validation(format!("OAuth sign-in was denied: {}", reason)));
    }
    let code = query.code.as_deref().filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::validation("Missing authorization code"))?;
    let oauth_state = query.state.as_deref().unwrap_or_default();

    let (user, token) = state.auth_service.authenticate_oauth(code, oauth_state).await?;
    info!("OAuth login successful for user {}", user.id);
    Ok(HttpResponse::Ok().json(AuthResponse::new(&user, token)))
}

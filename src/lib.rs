pub mod ai;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod prompts;
pub mod proxy;
pub mod usage;

use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, HttpResponse};
use tracing::info;

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use auth::AuthService;
pub use db::{DbOperations, Prompt, User};
pub use proxy::ModelClient;
pub use usage::UsageMeter;

const JSON_LIMIT_BYTES: usize = 2 * 1024 * 1024;

/// Health check endpoint handler
/// Returns server status, a timestamp and the database pool status
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "database": state.db.get_pool_status(),
    }))
}

/// Applies the bundled schema. Safe to call repeatedly.
pub async fn init_schema(state: web::Data<AppState>) -> Result<HttpResponse> {
    state.db.initialize_schema().await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Database schema initialized"
    })))
}

pub async fn not_found() -> Result<HttpResponse> {
    Err(AppError::NotFound("Route".into()))
}

/// JSON extractor settings: malformed bodies become 400s in the standard error shape.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(JSON_LIMIT_BYTES)
        .error_handler(|err, _req| AppError::ValidationError(format!("Invalid JSON body: {}", err)).into())
}

/// Registers every route. Callers add `AppState` and `default_service(not_found)`.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .route("/health", web::get().to(health_check))
        .service(
            web::scope("/api")
                .service(
                    web::scope("/auth")
                        .route("/register", web::post().to(auth::handlers::register))
                        .route("/login", web::post().to(auth::handlers::login))
                        .route("/me", web::get().to(auth::handlers::me))
                        .route("/oauth/authorize", web::get().to(auth::handlers::oauth_authorize))
                        .route("/oauth/callback", web::get().to(auth::handlers::oauth_callback)),
                )
                .service(
                    web::scope("/prompts")
                        .route("", web::get().to(prompts::handlers::list_prompts))
                        .route("", web::post().to(prompts::handlers::create_prompt))
                        .route("", web::put().to(prompts::handlers::update_prompt))
                        .route("", web::delete().to(prompts::handlers::delete_prompt))
                        .route("/export", web::get().to(prompts::handlers::export_prompts))
                        .route("/{id}/versions", web::get().to(prompts::handlers::list_versions)),
                )
                .service(
                    web::scope("/ai")
                        .route("/generate-prompt", web::post().to(ai::handlers::generate_prompt))
                        .route("/optimize-prompt", web::post().to(ai::handlers::optimize_prompt))
                        .route("/run-prompt", web::post().to(ai::handlers::run_prompt)),
                )
                .service(
                    web::scope("/usage")
                        .route("/current", web::get().to(usage::handlers::current))
                        .route("/limit-check", web::get().to(usage::handlers::limit_check)),
                )
                .route("/config/init", web::post().to(init_schema)),
        );
}

/// Application state shared across all components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub db: DbOperations,
    pub auth_service: Arc<AuthService>,
    pub usage: UsageMeter,
    pub model: Arc<dyn ModelClient>,
}

impl AppState {
    pub async fn new(config: Settings) -> Result<Self> {
        let db = DbOperations::new_with_options(
            &config.database.url,
            config.database.max_connections,
            Duration::from_secs(config.database.acquire_timeout_secs),
        )
        .await?;
        info!("Connected to database");

        Self::with_db(config, db)
    }

    /// Builds the services around an existing database handle.
    pub fn with_db(config: Settings, db: DbOperations) -> Result<Self> {
        let model = proxy::build_model_client(&config.model)?;
        Ok(Self::with_components(config, db, model))
    }

    pub fn with_components(config: Settings, db: DbOperations, model: Arc<dyn ModelClient>) -> Self {
        let auth_service = Arc::new(AuthService::from_settings(db.clone(), &config));
        let usage = UsageMeter::new(db.clone(), config.usage.free_monthly_limit);

        Self {
            config: Arc::new(config),
            db,
            auth_service,
            usage,
            model,
        }
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.db.close().await;
        info!("Database pool closed");
        Ok(())
    }
}

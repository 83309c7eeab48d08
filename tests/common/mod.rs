#![allow(dead_code, unused_macros)]

use actix_web::web;
use prompt_manager_server::config::ModelProvider;
use prompt_manager_server::{AppState, DbOperations, Settings};
use uuid::Uuid;

pub const PASSWORD: &str = "password123";

pub fn test_settings() -> Settings {
    Settings::new_for_test().expect("Failed to load test config")
}

/// State whose pool only connects when a handler touches the database.
pub fn lazy_state() -> web::Data<AppState> {
    let config = test_settings();
    let db = DbOperations::new_lazy(&config.database.url).expect("Failed to create lazy pool");
    web::Data::new(AppState::with_db(config, db).expect("Failed to build app state"))
}

/// State backed by `DATABASE_URL`, talking to an OpenAI-compatible mock at `model_url`.
pub async fn db_state(model_url: &str) -> web::Data<AppState> {
    let mut config = test_settings();
    config.model.provider = ModelProvider::OpenAi;
    config.model.base_url = model_url.to_string();
    config.model.api_key = Some("test-key".into());

    let state = AppState::new(config)
        .await
        .expect("DATABASE_URL must point at a running Postgres");
    state.db.initialize_schema().await.expect("Failed to apply schema");
    web::Data::new(state)
}

pub fn unique_email(prefix: &str) -> String {
    format!("{}-{}@example.com", prefix, Uuid::new_v4())
}

/// Chat completion body with fixed token counts.
pub fn chat_reply(content: &str, prompt_tokens: i64, completion_tokens: i64) -> serde_json::Value {
    serde_json::json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }],
        "usage": {
            "prompt_tokens": prompt_tokens,
            "completion_tokens": completion_tokens,
            "total_tokens": prompt_tokens + completion_tokens
        }
    })
}

macro_rules! test_app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data($state.clone())
                .configure(prompt_manager_server::configure_routes)
                .default_service(actix_web::web::to(prompt_manager_server::not_found)),
        )
        .await
    };
}

/// Registers `$email` and yields the bearer token.
macro_rules! register_user {
    ($app:expr, $email:expr) => {{
        let req = actix_web::test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(serde_json::json!({ "email": $email, "password": common::PASSWORD }))
            .to_request();
        let body: serde_json::Value = actix_web::test::call_and_read_body_json(&$app, req).await;
        body["token"]
            .as_str()
            .expect("registration returns a token")
            .to_string()
    }};
}

macro_rules! bearer {
    ($token:expr) => {
        ("Authorization", format!("Bearer {}", $token))
    };
}

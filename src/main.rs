use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use prompt_manager_server::config::CorsConfig;
use prompt_manager_server::{configure_routes, not_found, AppState, Settings};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn build_cors(config: &CorsConfig) -> Cors {
    if !config.enabled {
        // Same-origin only
        return Cors::default();
    }

    let cors = if config.allow_any_origin {
        Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .expose_any_header()
    } else {
        config
            .allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
            .allowed_headers(vec!["Authorization", "Content-Type"])
            .expose_headers(vec!["Content-Disposition"])
            .supports_credentials()
    };

    cors.max_age(config.max_age as usize)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    // Load configuration
    let config = Settings::new().context("failed to load configuration")?;
    info!("Configuration loaded ({} environment)", config.environment);
    if config.oauth.is_none() {
        info!("OAuth sign-in disabled; no [oauth] section configured");
    }

    let state = AppState::new(config.clone())
        .await
        .context("failed to initialize application state")?;

    if config.database.init_schema_on_startup {
        state
            .db
            .initialize_schema()
            .await
            .context("failed to apply database schema")?;
    } else {
        warn!("Skipping schema initialization; POST /api/config/init to apply it");
    }

    let data = web::Data::new(state.clone());
    let bind_address = config.bind_address();
    info!(
        "Starting server at http://{} ({:?} model {} at {})",
        bind_address, config.model.provider, config.model.model, config.model.base_url
    );

    let cors_config = config.cors.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(build_cors(&cors_config))
            .app_data(data.clone())
            .configure(configure_routes)
            .default_service(web::to(not_found))
    })
    .bind(&bind_address)
    .with_context(|| format!("failed to bind {}", bind_address))?
    .workers(config.server.workers as usize)
    .run()
    .await
    .context("server error")?;

    state.shutdown().await?;
    info!("Server stopped");
    Ok(())
}

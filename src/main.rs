use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hifz_tracker::{
    api::{create_router, AppState},
    auth::AuthService,
    config::Config,
    database::Database,
    llm::EncouragementService,
    log_service::LogService,
    log_system_event,
    student_service::StudentService,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    config.validate()?;

    let _guard = setup_logging(&config)?;
    log_system_event!(startup, component = "server", "starting hifz tracker");

    let db = Database::new(&config.database.url).await?;
    if db.seed_mock_data_if_empty().await? {
        info!("Empty database seeded with a demo teacher and students");
    }

    let student_service = StudentService::new(db.clone());
    let log_service = LogService::new(db.clone());
    let auth_service = AuthService::new(db, config.app.admin_password.clone());
    let encouragement_service = EncouragementService::new(
        config.llm.api_key.clone(),
        config.llm.base_url.clone(),
        config.llm.provider,
        config.llm.model.clone(),
    );
    info!(
        provider = encouragement_service.provider_name(),
        "Encouragement service initialized"
    );

    let state = AppState {
        student_service,
        log_service,
        auth_service,
        encouragement_service,
        sessions: Arc::new(Mutex::new(HashMap::new())),
        quiz_sessions: Arc::new(Mutex::new(HashMap::new())),
        whatsapp_country_code: config.app.whatsapp_country_code.clone(),
    };

    let app = create_router(state)
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn setup_logging(config: &Config) -> Result<Option<WorkerGuard>> {
    use std::fs;
    use tracing_subscriber::fmt;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(true);

    if !config.logging.file_enabled {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();
        return Ok(None);
    }

    fs::create_dir_all(&config.logging.log_directory).unwrap_or_else(|e| {
        eprintln!(
            "Warning: Could not create logs directory '{}': {}",
            config.logging.log_directory, e
        );
    });

    let file_appender =
        tracing_appender::rolling::daily(&config.logging.log_directory, "hifz-tracker.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    // No ANSI colors in files
    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(non_blocking_file);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!(
        "Logging initialized - writing to {}/hifz-tracker.log with daily rotation",
        config.logging.log_directory
    );

    Ok(Some(guard))
}

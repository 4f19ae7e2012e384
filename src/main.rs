use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wordarena::bank::{InMemoryBank, JsonFileWordSource, WordSource, DEFAULT_OPTIONS_PER_QUESTION};
use wordarena::config::{EngineConfig, ServerConfig};
use wordarena::{api, state::AppState, ws};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wordarena=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting WordArena...");

    let engine_config = EngineConfig::from_env();
    let server_config = ServerConfig::from_env();

    let words = match JsonFileWordSource::new(&server_config.words_file)
        .fetch_words()
        .await
    {
        Ok(words) => words,
        Err(e) => {
            tracing::error!("Failed to load words: {}", e);
            std::process::exit(1);
        }
    };
    let bank_seed = engine_config.seed.unwrap_or_else(rand::random);
    let bank = match InMemoryBank::from_words(&words, DEFAULT_OPTIONS_PER_QUESTION, bank_seed) {
        Ok(bank) => bank,
        Err(e) => {
            tracing::error!("Failed to build question bank: {}", e);
            std::process::exit(1);
        }
    };

    let state = Arc::new(AppState::new(engine_config, Arc::new(bank)));

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .merge(api::routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = server_config.bind_addr;
    tracing::info!("Listening on http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}

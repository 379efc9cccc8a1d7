//! careline - patient support conversation server
//!
//! Routes each patient message to an appointment or prescription specialist,
//! runs the specialist's tool loop, and streams the reply over a WebSocket.

mod agents;
mod api;
mod config;
mod conversation;
mod db;
mod domain;
mod llm;
mod runtime;
mod session;
mod state_machine;
mod tools;

use api::{create_router, AppState};
use config::AppConfig;
use db::Database;
use domain::{seed::seed, Repositories};
use llm::{LlmService, LoggingService, OpenAIService, UnconfiguredService};
use runtime::{LlmDecisionClient, Orchestrator, RegistryToolExecutor, SqliteStateStore, TurnSettings};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "careline=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = AppConfig::from_env()?;

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    tracing::info!(path = %config.db_path.display(), "Opening session store");
    let db = Database::open(&config.db_path)?;
    spawn_purge(db.clone());

    let repos = Arc::new(Repositories::new());
    seed(&repos, chrono::Utc::now());
    let patient = repos.patients.get(config.patient_id);
    if patient.is_none() {
        tracing::warn!(patient_id = %config.patient_id, "Configured patient not found; tools will have no patient");
    }

    let router = model_service(&config, &config.router_model)?;
    let specialist = model_service(&config, &config.specialist_model)?;

    let orchestrator = Orchestrator::new(
        SqliteStateStore::new(db.clone()),
        LlmDecisionClient::new(router, specialist),
        RegistryToolExecutor::new(Arc::clone(&repos)),
        TurnSettings {
            step_limit: config.step_limit,
            session_ttl: config.session_ttl(),
            decision_timeout: config.decision_timeout,
            patient,
        },
    );

    let state = AppState::new(
        orchestrator,
        db,
        config.chat_batch_threshold,
        config.voice_batch_threshold,
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = config.listen_addr();
    tracing::info!(%addr, "careline server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn model_service(config: &AppConfig, model: &str) -> Result<Arc<dyn LlmService>, llm::LlmError> {
    let inner: Arc<dyn LlmService> = match &config.openai_api_key {
        Some(key) => Arc::new(OpenAIService::new(
            key.clone(),
            model,
            config.openai_base_url.as_deref(),
        )?),
        None => {
            tracing::warn!(model, "No API key configured. Set OPENAI_API_KEY.");
            Arc::new(UnconfiguredService::new(model))
        }
    };
    Ok(Arc::new(LoggingService::new(inner)))
}

/// Drop expired sessions in the background
fn spawn_purge(db: Database) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            let db = db.clone();
            match tokio::task::spawn_blocking(move || db.purge_expired(chrono::Utc::now())).await {
                Ok(Ok(0)) => {}
                Ok(Ok(purged)) => tracing::info!(purged, "Purged expired sessions"),
                Ok(Err(e)) => tracing::warn!(error = %e, "Session purge failed"),
                Err(e) => tracing::error!(error = %e, "Session purge task panicked"),
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

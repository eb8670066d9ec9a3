//! Blinder API server entry point.
//!
//! Bootstraps configuration, runs the storage schema migration, and starts
//! the Axum HTTP server with graceful shutdown on SIGINT/SIGTERM.

use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use blinder_api::{build_router, AppConfig, AppState, NoopAuth};
use blinder_orchestrator::RequestOrchestrator;
use blinder_storage::{PgConfig, PgStorage, StorageTrait};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().unwrap_or_else(|err| {
        tracing::error!(error = %err, "failed to load configuration");
        std::process::exit(1);
    });

    let pg_config = PgConfig::from_env().unwrap_or_else(|err| {
        tracing::error!(error = %err, "failed to load database configuration");
        std::process::exit(1);
    });
    let storage = PgStorage::connect(&pg_config).await.unwrap_or_else(|err| {
        tracing::error!(error = %err, "failed to connect to Postgres");
        std::process::exit(1);
    });
    storage.migrate().await.unwrap_or_else(|err| {
        tracing::error!(error = %err, "failed to run storage migration");
        std::process::exit(1);
    });
    let storage: Arc<dyn StorageTrait> = Arc::new(storage);

    let orchestrator = Arc::new(RequestOrchestrator::new(
        storage.clone(),
        None,
        None,
        config.llm.clone(),
        config.master_key.clone(),
        config.retrieval.rag_top_k,
        config.retrieval.rrf_k,
    ));

    let model_settings = Arc::new(RwLock::new(AppState::initial_model_settings(&config.llm)));
    let state = AppState {
        storage,
        orchestrator,
        ner: None,
        embedder: None,
        document_extractor: None,
        master_key: Arc::new(config.master_key.clone()),
        llm_config: Arc::new(config.llm),
        pii_config: Arc::new(config.pii),
        chunk_config: Arc::new(config.chunk),
        retrieval_config: Arc::new(config.retrieval),
        context_config: Arc::new(config.context),
        api_config: Arc::new(config.api),
        auth: Arc::new(NoopAuth),
        model_settings,
    };

    let app = build_router(state);

    let addr = resolve_bind_addr();
    tracing::info!(%addr, "starting Blinder API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|err| {
            tracing::error!(%addr, error = %err, "failed to bind listener");
            std::process::exit(1);
        });

    let server = axum::serve(listener, app.into_make_service());
    tokio::select! {
        result = server => {
            if let Err(err) = result {
                tracing::error!(error = %err, "server error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }
}

fn resolve_bind_addr() -> SocketAddr {
    let host = std::env::var("BLINDER_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("BLINDER_API_PORT").ok())
        .unwrap_or_else(|| "3000".to_string());
    format!("{host}:{port}")
        .parse()
        .unwrap_or_else(|_| "0.0.0.0:3000".parse().unwrap())
}

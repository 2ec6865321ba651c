//! # Randmint Node
//!
//! HTTP front end for the randomness request/fulfill workflow, with an
//! oracle callback ingress and a background completion engine.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

mod api;
mod config;
mod engine;
mod state;

use config::NodeConfig;
use engine::Engine;
use state::AppState;

/// Run the randmint node until interrupted.
pub async fn run_server(config: NodeConfig) -> anyhow::Result<()> {
    let addr = config.addr;

    info!(
        network = config.network.name(),
        chain_id = config.network.chain_id(),
        fee = config.default_params.fee,
        key_hash = %config.default_params.key_hash,
        "🚀 Randmint node starting..."
    );

    let state = AppState::new(config);
    let shutdown = CancellationToken::new();

    let engine = Arc::new(Engine::new(state.clone()));
    let engine_task = tokio::spawn(engine.run(shutdown.clone()));

    let app = create_router(state);

    info!("🌐 Listening on http://{}", addr);

    let listener = TcpListener::bind(addr).await?;
    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    engine_task.await?;

    Ok(())
}

/// Create the API router.
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(api::health::health_check))

        // Request API
        .route(
            "/api/v1/requests",
            post(api::request::create_request).get(api::request::list_requests),
        )
        .route(
            "/api/v1/requests/:id",
            get(api::request::get_request).delete(api::request::cancel_request),
        )
        .route("/api/v1/requests/:id/finalize", post(api::request::finalize_request))

        // Oracle ingress
        .route("/api/v1/callback", post(api::callback::deliver))

        // Fee account
        .route("/api/v1/fees", post(api::fees::fund).get(api::fees::get_fees))

        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let config = NodeConfig::from_env()?;
    run_server(config).await
}

//! Remote browser orchestration core: session pool, plugin chain, command
//! dispatcher, sweeper, and WebRTC signaling coordinator for multi-tenant
//! headless browser sessions.

mod api;
mod collaborators;
mod config;
mod dispatcher;
mod driver;
mod errors;
mod lifecycle;
mod live_stream;
mod plugins;
mod safety;
mod scheduler;
mod session;
mod sweeper;
mod webrtc;

use api::{create_router, AppState};
use config::Config;
use std::net::SocketAddr;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "browser_orchestrator=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("starting browser orchestrator on port {}", config.port);

    let state = AppState::new(config.clone()).await;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state).layer(cors).layer(compression);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("browser orchestrator listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

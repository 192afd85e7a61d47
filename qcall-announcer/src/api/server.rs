//! HTTP server setup and routing

use crate::error::{Error, Result};
use crate::state::SharedState;
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub state: Arc<SharedState>,
    /// Output device name, or "virtual" when no device is driven
    pub audio_output: String,
}

pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(super::handlers::health))
        .nest(
            "/api/v1",
            Router::new()
                .route("/display", get(super::handlers::get_display))
                .route("/board", get(super::handlers::get_board))
                .route("/marquee", get(super::handlers::get_marquee))
                .route("/connection", get(super::handlers::get_connection))
                .route("/events", get(super::sse::event_stream)),
        )
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        // Display pages are served from other origins
        .layer(CorsLayer::permissive())
}

/// Serve the view feed until `cancel` fires
pub async fn run(addr: SocketAddr, ctx: AppContext, cancel: CancellationToken) -> Result<()> {
    let app = create_router(ctx);

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    info!("HTTP server stopped");
    Ok(())
}

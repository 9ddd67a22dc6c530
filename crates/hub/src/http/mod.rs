use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Router;
use http::Method;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_http::trace::{DefaultOnFailure, DefaultOnResponse};
use tower_http::LatencyUnit;

pub mod admin;
pub mod auth;
pub mod feed;
pub mod sync;

use crate::state::HubState;

const API_PREFIX: &str = "/api/v1";

/// Maximum upload size in bytes (100 MB)
pub const MAX_UPLOAD_SIZE_BYTES: usize = 100 * 1024 * 1024;

async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}

pub fn router(state: HubState) -> Router {
    // The feed is the hub's public read-only surface.
    let feed_cors = CorsLayer::new()
        .allow_methods(vec![Method::GET])
        .allow_origin(Any);

    Router::new()
        .nest(
            &format!("{API_PREFIX}/sync"),
            sync::router(state.clone()),
        )
        .nest(
            &format!("{API_PREFIX}/feed"),
            feed::router(state.clone()).layer(feed_cors),
        )
        .nest(&format!("{API_PREFIX}/admin"), admin::router(state))
        .fallback(not_found_handler)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE_BYTES))
}

#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    #[error("an error occurred running the HTTP server: {0}")]
    ServingFailed(#[from] std::io::Error),
}

/// Run the hub HTTP server until the shutdown signal fires.
pub async fn run(
    listen_addr: std::net::SocketAddr,
    state: HubState,
    mut shutdown_rx: watch::Receiver<()>,
) -> Result<(), HttpServerError> {
    let trace_layer = TraceLayer::new_for_http()
        .on_response(
            DefaultOnResponse::new()
                .include_headers(false)
                .latency_unit(LatencyUnit::Micros),
        )
        .on_failure(DefaultOnFailure::new().latency_unit(LatencyUnit::Micros));

    let router = router(state).layer(trace_layer);

    tracing::info!(addr = ?listen_addr, "hub API server listening");
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        })
        .await?;

    Ok(())
}

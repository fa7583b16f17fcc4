//! Web front-end for invex.
//!
//! Routes:
//! - `GET /` upload form and history sidebar
//! - `POST /extract` HTML results for uploaded files
//! - `POST /api/extract` JSON results for uploaded files
//! - `GET /invoices/{name}` download a JSON artifact
//! - `GET /history.csv` download the consolidated history
//! - `GET /api/history` history rows as JSON
//! - `GET /health`

pub mod error;
mod handlers;
pub mod types;
mod views;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use invex_core::{ExtractionModel, Pipeline};
use tokio::net::TcpListener;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::info;

pub use error::WebError;
pub use types::{FileReport, ReportStatus};

/// Default upload limit: 100 MB per request.
pub const DEFAULT_BODY_LIMIT: usize = 100 * 1024 * 1024;

/// Shared handler state.
pub struct AppState<M> {
    pub pipeline: Arc<Pipeline<M>>,
}

impl<M> Clone for AppState<M> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
        }
    }
}

/// Build the router with the default upload limit.
pub fn create_router<M: ExtractionModel + 'static>(pipeline: Arc<Pipeline<M>>) -> Router {
    create_router_with_limit(pipeline, DEFAULT_BODY_LIMIT)
}

/// Build the router with a custom request body limit in bytes.
pub fn create_router_with_limit<M: ExtractionModel + 'static>(
    pipeline: Arc<Pipeline<M>>,
    body_limit: usize,
) -> Router {
    let state = AppState { pipeline };

    Router::new()
        .route("/", get(handlers::index::<M>))
        .route("/extract", post(handlers::extract_html::<M>))
        .route("/api/extract", post(handlers::extract_json::<M>))
        .route("/invoices/{name}", get(handlers::download_artifact::<M>))
        .route("/history.csv", get(handlers::download_history::<M>))
        .route("/api/history", get(handlers::history_json::<M>))
        .route("/health", get(handlers::health::<M>))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve<M: ExtractionModel + 'static>(
    pipeline: Pipeline<M>,
    addr: SocketAddr,
) -> std::io::Result<()> {
    let app = create_router(Arc::new(pipeline));
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await
}

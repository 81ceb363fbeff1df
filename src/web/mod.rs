// Axum start-up code: one form page, its multipart post-handler and a small JSON API.
// Uploads are buffered in memory up to the configured limit, then handed to the pipeline.
pub mod handlers;
pub mod routes;
pub mod state;
pub mod static_files;
pub mod templates;
pub mod view;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::WebConfig;
use state::AppState;

/// Builds the complete router with its middleware.
pub fn app(state: Arc<AppState>) -> Router {
    let max_bytes = state.config.upload.max_bytes;

    Router::new()
        .merge(routes::ui_routes())
        .merge(routes::api_routes())
        .layer(DefaultBodyLimit::max(max_bytes))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(config: WebConfig, state: Arc<AppState>) -> std::io::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(async {
            // An error here means no signal handler; serve until the process is killed
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
            }
        })
        .await
}

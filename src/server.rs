//! HTTP exporter boundary.
//!
//! A minimal axum app: a landing page at `/` and the text exposition at
//! the configured telemetry path. Gathering the registry drives the
//! collector, so every request to the telemetry path performs one scrape;
//! the blocking proc reads run on the blocking pool.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::info;

use crate::error::Result;

struct ExporterState {
    registry: Registry,
    telemetry_path: String,
}

/// Serve the exporter until the process is terminated.
pub async fn serve(listen: SocketAddr, telemetry_path: String, registry: Registry) -> Result<()> {
    let state = Arc::new(ExporterState {
        registry,
        telemetry_path: telemetry_path.clone(),
    });

    let app = Router::new()
        .route("/", get(handle_landing))
        .route(&telemetry_path, get(handle_metrics))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(address = %listen, path = %telemetry_path, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn handle_landing(State(state): State<Arc<ExporterState>>) -> Html<String> {
    Html(landing_page(&state.telemetry_path))
}

async fn handle_metrics(State(state): State<Arc<ExporterState>>) -> Response {
    let registry = state.registry.clone();
    let gathered = tokio::task::spawn_blocking(move || {
        let families = registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&families, &mut buffer)
            .map(|_| buffer)
    })
    .await;

    match gathered {
        Ok(Ok(body)) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Ok(Err(err)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("encoding metrics failed: {err}"),
        )
            .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("scrape task failed: {err}"),
        )
            .into_response(),
    }
}

/// Landing page pointing at the telemetry path.
pub fn landing_page(telemetry_path: &str) -> String {
    format!(
        "<html>\n<head><title>Sockwatch Exporter</title></head>\n<body>\n<h1>Sockwatch Exporter</h1>\n<p><a href=\"{telemetry_path}\">Metrics</a></p>\n</body>\n</html>\n"
    )
}

//! HTTP Server and Poll Loop Wiring
//!
//! This module implements the Prometheus exporter HTTP server and starts the
//! burp poll loop next to it.
//!
//! # Architecture
//!
//! - **HTTP Server**: Axum-based server exposing `/`, `/metrics`, `/filter` and `/health`
//! - **Poll Loop**: Background task that queries the burp server every interval
//! - **State Management**: The poll loop publishes into a [`SnapshotStore`];
//!   handlers only ever read `current()`
//!
//! # Endpoints
//!
//! - `GET /` - HTML landing page
//! - `GET /metrics` - Prometheus metrics in text format
//! - `GET /filter?label_name=team&label_value=cs` - client metrics restricted to
//!   clients carrying the label `team=cs`
//! - `GET /health` - 200 if the burp server is reachable, 503 otherwise
//!
//! # Error Handling
//!
//! A failed poll never takes the endpoint down: the last good client data keeps
//! being served with `burp_up 0` and an increased attempt counter. Only
//! configuration problems (bad key material, unbindable address) are fatal, and
//! they are detected before the poll loop starts.

use crate::burp::TlsTransport;
use crate::config::Config;
use crate::metrics::{render_snapshot, LabelFilter};
use crate::notify::Notifier;
use crate::poller::Poller;
use crate::snapshot::SnapshotStore;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub store: SnapshotStore,
    /// Value of the `server` label on every series
    pub server_name: String,
    pub group_by_label: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FilterParams {
    pub label_name: Option<String>,
    pub label_value: Option<String>,
}

pub async fn start(config: Config, notifier: Arc<dyn Notifier>) -> anyhow::Result<()> {
    config.validate()?;

    let burp = Arc::new(config.burp.clone());
    // Key material problems are fatal and must stop us before polling starts
    let transport = TlsTransport::from_config(burp.clone())?;

    let store = SnapshotStore::new();
    let state = AppState {
        store: store.clone(),
        server_name: config.burp.server_name.clone(),
        group_by_label: config.metrics.group_by_label.clone(),
    };

    let addr = format!("{}:{}", config.server.addr, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Metrics server listening on {}", addr);
    info!("Metrics available at http://{}/metrics", addr);
    notifier.ready();

    // Start background polling
    let cancel = CancellationToken::new();
    let poller = Poller::new(transport, burp, store, config.metrics.scrape_interval());
    let poll_task = tokio::spawn(poller.run(cancel.clone()));

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(cancel.clone(), notifier))
        .await?;

    cancel.cancel();
    if let Err(e) = poll_task.await {
        error!("Poll loop terminated abnormally: {}", e);
    }
    info!("Exporter stopped");

    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/filter", get(filter_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn shutdown_signal(cancel: CancellationToken, notifier: Arc<dyn Notifier>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }

    notifier.stopping();
    cancel.cancel();
}

async fn root_handler() -> impl IntoResponse {
    axum::response::Html(
        r#"<html>
<head><title>Burp Exporter</title></head>
<body>
<h1>Burp Exporter</h1>
<p><a href="/metrics">Metrics</a></p>
<p><a href="/health">Health</a></p>
</body>
</html>"#,
    )
}

fn render_response(state: &AppState, filter: Option<&LabelFilter>) -> Response {
    let snapshot = state.store.current();
    match render_snapshot(
        &snapshot,
        &state.server_name,
        state.group_by_label.as_deref(),
        filter,
    ) {
        Ok(metrics) => metrics.into_response(),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error rendering metrics: {}", e),
            )
                .into_response()
        }
    }
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    render_response(&state, None)
}

async fn filter_handler(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
) -> Response {
    match (params.label_name, params.label_value) {
        (Some(name), Some(value)) => {
            let filter = LabelFilter { name, value };
            render_response(&state, Some(&filter))
        }
        _ => (
            StatusCode::BAD_REQUEST,
            "filter requires label_name and label_value",
        )
            .into_response(),
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    if state.store.current().health.up {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Burp server unreachable")
    }
}

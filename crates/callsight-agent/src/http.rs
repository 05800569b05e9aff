//! Health and metrics endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::{info, warn};

/// Serve `/healthcheck` and `/metrics` on the given address.
pub async fn serve(addr: String, handle: PrometheusHandle) {
    let router = Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/metrics", get(metrics))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(handle);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            warn!(addr, "http listener failed to bind: {err}");
            return;
        }
    };
    info!(addr, "http endpoints ready");
    if let Err(err) = axum::serve(listener, router).await {
        warn!("http server stopped: {err}");
    }
}

async fn healthcheck() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use prometheus::{Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;

/// Requests taking longer than this are answered with `408 Request Timeout`.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
struct HttpServiceState {
    metrics: Arc<Registry>,
}

fn router(metrics: Arc<Registry>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/metrics", get(prometheus_metrics))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .with_state(HttpServiceState {
            metrics,
        })
}

/// Serves the metrics of the given [`Registry`] until `shutdown_token` is cancelled.
pub async fn init(
    listen_on: SocketAddr,
    shutdown_token: CancellationToken,
    metrics: Arc<Registry>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(listen_on).await?;

    info!("Begin listening on '{}'...", listen_on);
    axum::serve(listener, router(metrics))
        .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
        .await?;

    info!("Stopped listening on '{}'", listen_on);
    Ok(())
}

async fn root() -> &'static str {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}

/// Encodes the whole [`Registry`], in the Prometheus text exposition format.
pub fn encode(metrics: &Registry) -> Result<String, prometheus::Error> {
    let mut body = String::new();
    TextEncoder.encode_utf8(&metrics.gather(), &mut body)?;
    Ok(body)
}

async fn prometheus_metrics(State(state): State<HttpServiceState>) -> impl IntoResponse {
    let mut headers = HeaderMap::new();

    // As defined by Prometheus: https://github.com/prometheus/docs/blob/main/content/docs/instrumenting/exposition_formats.md#basic-info
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; version=0.0.4"));

    match encode(&state.metrics) {
        Ok(body) => (StatusCode::OK, headers, body),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, headers, format!("Failed to encode metrics: {e}")),
    }
}

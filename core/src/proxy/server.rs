//! Proxy Server - Axum HTTP ingress
//! Every request is treated as a page request and sent through the page's network path

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, Request, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use tower_http::trace::TraceLayer;

use crate::error::{BrokerError, FetchError, InterceptError};
use crate::page::Page;
use crate::proxy::upstream::{OutboundRequest, RequestMode, UpstreamResponse};

const MAX_BODY_BYTES: usize = 100 * 1024 * 1024;

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub page: Arc<Page>,
    pub upstream: Arc<str>,
}

/// Proxy server instance
pub struct ProxyServer {
    host: String,
    port: u16,
    state: AppState,
}

impl ProxyServer {
    pub fn new(host: String, port: u16, page: Arc<Page>, upstream: &str) -> Self {
        let state = AppState {
            page,
            upstream: Arc::from(upstream.trim_end_matches('/')),
        };
        Self { host, port, state }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/healthz", get(health_check_handler))
            .fallback(forward_handler)
            .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Run the proxy server (blocking)
    pub async fn run(self) -> anyhow::Result<()> {
        let app = self.router();

        let addr = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        tracing::info!("Proxy server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Proxy server stopped");
        Ok(())
    }
}

/// Health check handler
async fn health_check_handler(State(state): State<AppState>) -> Response {
    let activation = state.page.container().activation_state();
    (
        StatusCode::OK,
        Json(serde_json::json!({"status": "ok", "proxy": activation})),
    )
        .into_response()
}

async fn forward_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => return (StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e)).into_response(),
    };

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);

    let mode = if headers.contains_key(header::ORIGIN) {
        RequestMode::Cors
    } else {
        RequestMode::SameOrigin
    };

    let outbound = OutboundRequest {
        method: parts.method,
        url: format!("{}{}", state.upstream, path_and_query),
        headers,
        mode,
        body,
    };

    match state.page.fetch(outbound).await {
        Ok(response) => into_response(response),
        Err(e) => {
            tracing::warn!("Request failed: {}", e);
            (error_status(&e), e.to_string()).into_response()
        }
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn into_response(upstream: UpstreamResponse) -> Response {
    let mut headers = upstream.headers;
    strip_hop_by_hop(&mut headers);
    // Re-framed from the buffered body.
    headers.remove(header::CONTENT_LENGTH);

    let mut response = Response::new(Body::from(upstream.body));
    *response.status_mut() = upstream.status;
    *response.headers_mut() = headers;
    response
}

fn error_status(err: &InterceptError) -> StatusCode {
    match err {
        InterceptError::Credential(BrokerError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
        InterceptError::Credential(BrokerError::Closed) => StatusCode::SERVICE_UNAVAILABLE,
        InterceptError::ProxyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        InterceptError::InvalidCredential => StatusCode::INTERNAL_SERVER_ERROR,
        InterceptError::Fetch(FetchError::InvalidUrl(_)) => StatusCode::BAD_REQUEST,
        InterceptError::Fetch(FetchError::Transport(_)) => StatusCode::BAD_GATEWAY,
    }
}

/// Shutdown signal handler
pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::lifecycle::{ProxyContainer, RegistrationOptions};
    use crate::proxy::upstream::testing::RecordingTransport;
    use crate::proxy::handshake::wait_activated;
    use std::time::Duration;
    use tower::ServiceExt;

    fn server(page: Arc<Page>) -> ProxyServer {
        ProxyServer::new("127.0.0.1".to_string(), 0, page, "http://upstream.test/")
    }

    #[tokio::test]
    async fn test_health_reports_unregistered_proxy() {
        let page = Arc::new(Page::new(
            Arc::new(ProxyContainer::new()),
            Arc::new(RecordingTransport::default()),
        ));
        let response = server(page)
            .router()
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["proxy"], "unregistered");
    }

    #[tokio::test]
    async fn test_forwards_to_upstream_with_credential() {
        let container = Arc::new(ProxyContainer::new());
        let network = Arc::new(RecordingTransport::default());
        let upstream = Arc::new(RecordingTransport::default());
        let page = Arc::new(Page::new(Arc::clone(&container), network));

        let controller = {
            container.register(RegistrationOptions::new(upstream.clone())).unwrap();
            wait_activated(&container).await.unwrap()
        };
        controller
            .post_message(serde_json::json!({"action": "sync-token", "token": "tok123"}))
            .await
            .unwrap();

        let request = Request::get("/restricted/image.svg?size=2")
            .header(header::CONNECTION, "keep-alive")
            .body(Body::empty())
            .unwrap();
        let response = server(page).router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let sent = upstream.sent();
        assert_eq!(sent[0].url, "http://upstream.test/restricted/image.svg?size=2");
        assert_eq!(sent[0].headers[header::AUTHORIZATION], "Bearer tok123");
        assert!(!sent[0].headers.contains_key(header::CONNECTION));
    }

    #[tokio::test(start_paused = true)]
    async fn test_credential_timeout_maps_to_gateway_timeout() {
        let container = Arc::new(ProxyContainer::new());
        let page = Arc::new(Page::new(
            Arc::clone(&container),
            Arc::new(RecordingTransport::default()),
        ));
        let mut options = RegistrationOptions::new(Arc::new(RecordingTransport::default()));
        options.credential_timeout = Duration::from_millis(100);
        container.register(options).unwrap();
        wait_activated(&container).await.unwrap();

        let response = server(page)
            .router()
            .oneshot(Request::get("/restricted/x").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_transport_failure_maps_to_bad_gateway() {
        let err = InterceptError::Fetch(FetchError::Transport("refused".to_string()));
        assert_eq!(error_status(&err), StatusCode::BAD_GATEWAY);
    }
}

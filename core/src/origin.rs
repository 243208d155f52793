//! Demo origin server
//! Serves a restricted image that requires a bearer API key

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;

pub const RESTRICTED_IMAGE_PATH: &str = "/restricted/image.svg";

/// Hex SHA-256 digest of an API key
pub fn hash_api_key(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

#[derive(Clone)]
struct OriginState {
    api_key_sha256: Arc<str>,
}

impl OriginState {
    fn accepts(&self, key: &str) -> bool {
        let presented = hash_api_key(key);
        presented
            .as_bytes()
            .ct_eq(self.api_key_sha256.as_bytes())
            .into()
    }
}

pub struct OriginServer {
    host: String,
    port: u16,
    state: OriginState,
}

impl OriginServer {
    pub fn new(host: String, port: u16, api_key_sha256: &str) -> Self {
        if api_key_sha256.is_empty() {
            tracing::warn!("No api_key_sha256 configured, every request will be rejected");
        }
        Self {
            host,
            port,
            state: OriginState {
                api_key_sha256: Arc::from(api_key_sha256.trim().to_ascii_lowercase()),
            },
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(RESTRICTED_IMAGE_PATH, any(restricted_image_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let app = self.router();

        let addr = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        tracing::info!("Origin server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(crate::proxy::server::shutdown_signal())
            .await?;

        tracing::info!("Origin server stopped");
        Ok(())
    }
}

async fn restricted_image_handler(
    State(state): State<OriginState>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::VARY, HeaderValue::from_static("Origin, Authorization"));

    let origin = headers.get(header::ORIGIN).cloned();
    if let Some(origin) = &origin {
        response_headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
        response_headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("HEAD, GET"),
        );
        response_headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Origin, Authorization, Accept, Vary"),
        );
        response_headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
    }

    match method {
        Method::GET | Method::HEAD => tracing::info!("request {}", method),
        Method::OPTIONS => {
            tracing::info!("preflight request");
            return (StatusCode::NO_CONTENT, response_headers).into_response();
        }
        _ => return (StatusCode::METHOD_NOT_ALLOWED, response_headers).into_response(),
    }

    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let key = auth.strip_prefix("Bearer ").unwrap_or(auth);
    if key.is_empty() {
        return (StatusCode::UNAUTHORIZED, response_headers, "no api key\n").into_response();
    }
    if !state.accepts(key) {
        return (StatusCode::FORBIDDEN, response_headers, "invalid api key\n").into_response();
    }

    response_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/svg+xml"));
    (StatusCode::OK, response_headers, render_image(origin.is_none())).into_response()
}

fn render_image(same_origin: bool) -> String {
    let subtitle = if same_origin { "(same origin)" } else { "(cross origin)" };
    format!(
        concat!(
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="480" height="270" viewBox="0 0 480 270">"##,
            r##"<rect width="480" height="270" fill="#ee5544"/>"##,
            r##"<g fill="#ffffff" font-family="monospace" font-weight="bold" font-size="16" text-anchor="middle">"##,
            r##"<text x="240" y="131">RESTRICTED IMAGE</text>"##,
            r##"<text x="240" y="155">{}</text>"##,
            "</g></svg>\n",
        ),
        subtitle
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn router() -> Router {
        OriginServer::new("127.0.0.1".to_string(), 0, &hash_api_key("api-test-key")).router()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_hash_api_key_is_hex_sha256() {
        assert_eq!(
            hash_api_key(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn test_missing_key_is_unauthorized() {
        let response = router()
            .oneshot(Request::get(RESTRICTED_IMAGE_PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::VARY], "Origin, Authorization");
    }

    #[tokio::test]
    async fn test_wrong_key_is_forbidden() {
        let request = Request::get(RESTRICTED_IMAGE_PATH)
            .header(header::AUTHORIZATION, "Bearer nope")
            .body(Body::empty())
            .unwrap();
        let response = router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_valid_key_serves_image() {
        let request = Request::get(RESTRICTED_IMAGE_PATH)
            .header(header::AUTHORIZATION, "Bearer api-test-key")
            .body(Body::empty())
            .unwrap();
        let response = router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/svg+xml");
        assert!(body_text(response).await.contains("(same origin)"));
    }

    #[tokio::test]
    async fn test_cross_origin_request_gets_cors_headers() {
        let request = Request::get(RESTRICTED_IMAGE_PATH)
            .header(header::ORIGIN, "http://page.test")
            .header(header::AUTHORIZATION, "Bearer api-test-key")
            .body(Body::empty())
            .unwrap();
        let response = router().oneshot(request).await.unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://page.test"
        );
        assert!(body_text(response).await.contains("(cross origin)"));
    }

    #[tokio::test]
    async fn test_preflight_and_unsupported_methods() {
        let preflight = Request::options(RESTRICTED_IMAGE_PATH)
            .header(header::ORIGIN, "http://page.test")
            .body(Body::empty())
            .unwrap();
        let response = router().oneshot(preflight).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let post = Request::post(RESTRICTED_IMAGE_PATH).body(Body::empty()).unwrap();
        let response = router().oneshot(post).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}

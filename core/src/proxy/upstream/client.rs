//! reqwest-backed transport for forwarded requests

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Url};
use tokio::time::Duration;

use super::{OutboundRequest, Transport, UpstreamResponse};
use crate::config::TimeoutsConfig;
use crate::error::FetchError;

#[derive(Clone)]
pub struct HttpTransport {
    http_client: Client,
}

impl HttpTransport {
    pub fn new(timeouts: &TimeoutsConfig, proxy_url: Option<&str>) -> reqwest::Result<Self> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(timeouts.connect_timeout))
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(Duration::from_secs(timeouts.request_timeout))
            .user_agent(concat!("bearer-relay/", env!("CARGO_PKG_VERSION")));

        if let Some(proxy) = proxy_url.filter(|p| !p.is_empty()) {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
            tracing::info!("Using upstream proxy: {}", proxy);
        }

        Ok(Self {
            http_client: builder.build()?,
        })
    }

    fn outbound_headers(request: &OutboundRequest) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in request.headers.iter() {
            if request.mode.allows_header(name) {
                headers.append(name.clone(), value.clone());
            } else {
                tracing::debug!("Dropping header {} in {:?} mode", name, request.mode);
            }
        }
        headers
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: OutboundRequest) -> Result<UpstreamResponse, FetchError> {
        let mut url = Url::parse(&request.url)
            .map_err(|_| FetchError::InvalidUrl(request.url.clone()))?;
        url.set_fragment(None);

        let headers = Self::outbound_headers(&request);
        let response = self
            .http_client
            .request(request.method, url)
            .headers(headers)
            .body(request.body)
            .send()
            .await
            .map_err(|e| {
                tracing::debug!("Request to {} failed: {}", request.url, e);
                FetchError::from(e)
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

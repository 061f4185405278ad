//! Default transport built on the hyper client.
//!
//! Connection pool settings follow the proxy connection pool configuration:
//! keepalive, connect timeout, idle timeout and max idle connections per host.

use super::body::RequestBody;
use super::tls::{crypto_provider, NoVerifier};
use super::{OutboundRequest, Transport};
use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Request, Response, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

type OutboundBody = UnsyncBoxBody<Bytes, std::io::Error>;

/// Type alias for the pooled client used by [`HyperTransport`].
pub type HttpClient = Client<hyper_rustls::HttpsConnector<HttpConnector>, OutboundBody>;

/// Connection settings for [`HyperTransport`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    #[serde(default = "default_pool_max_idle_per_host")]
    pub max_idle_per_host: usize,

    #[serde(default = "default_pool_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_keepalive_timeout")]
    pub keepalive_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Overall deadline for one call, including reading the response body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,

    /// Skip TLS certificate verification (for self-signed certs in dev/test)
    #[serde(default)]
    pub tls_skip_verify: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: default_pool_max_idle_per_host(),
            idle_timeout_secs: default_pool_idle_timeout(),
            keepalive_timeout_secs: default_keepalive_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: None,
            tls_skip_verify: false,
        }
    }
}

fn default_pool_max_idle_per_host() -> usize {
    100
}

fn default_pool_idle_timeout() -> u64 {
    90
}

fn default_keepalive_timeout() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    5
}

/// [`Transport`] that performs real HTTP/1.1 calls over plain TCP or rustls.
#[derive(Clone)]
pub struct HyperTransport {
    client: HttpClient,
    request_timeout: Option<Duration>,
}

impl HyperTransport {
    /// Builds the pooled client.
    ///
    /// Fails only when the platform root certificates cannot be loaded.
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let mut http_connector = HttpConnector::new();
        http_connector.set_keepalive(Some(Duration::from_secs(config.keepalive_timeout_secs)));
        http_connector.set_connect_timeout(Some(Duration::from_secs(config.connect_timeout_secs)));
        http_connector.enforce_http(false);

        let provider = crypto_provider();
        let https_connector = if config.tls_skip_verify {
            warn!("TLS certificate verification DISABLED for the capture client (development/testing only)");
            let tls = rustls::ClientConfig::builder_with_provider(provider.clone())
                .with_safe_default_protocol_versions()
                .map_err(|e| TransportError::Other(format!("TLS setup failed: {e}")))?
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier::new(provider)))
                .with_no_client_auth();
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_tls_config(tls)
                .https_or_http()
                .enable_http1()
                .wrap_connector(http_connector)
        } else {
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_provider_and_native_roots(provider)
                .map_err(|e| {
                    TransportError::Other(format!("failed to load native root certificates: {e}"))
                })?
                .https_or_http()
                .enable_http1()
                .wrap_connector(http_connector)
        };

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .pool_max_idle_per_host(config.max_idle_per_host)
            .build(https_connector);

        info!(
            "HTTP client configured (HTTP/1.1): max_idle={}, idle_timeout={}s, keepalive={}s",
            config.max_idle_per_host, config.idle_timeout_secs, config.keepalive_timeout_secs
        );

        Ok(Self {
            client,
            request_timeout: config.request_timeout_secs.map(Duration::from_secs),
        })
    }

    async fn exchange(&self, request: OutboundRequest) -> Result<Response<Bytes>, TransportError> {
        let upstream = build_request(request)?;
        let response = self
            .client
            .request(upstream)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (parts, body) = response.into_parts();
        let bytes = body
            .collect()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?
            .to_bytes();
        Ok(Response::from_parts(parts, bytes))
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, request: OutboundRequest) -> Result<Response<Bytes>, TransportError> {
        match self.request_timeout {
            Some(deadline) => tokio::time::timeout(deadline, self.exchange(request))
                .await
                .map_err(|_| {
                    TransportError::Connect(format!("timed out after {}s", deadline.as_secs()))
                })?,
            None => self.exchange(request).await,
        }
    }
}

/// Converts an [`OutboundRequest`] into a hyper request, encoding form bodies.
fn build_request(request: OutboundRequest) -> Result<Request<OutboundBody>, TransportError> {
    let OutboundRequest {
        method,
        url,
        mut headers,
        body,
    } = request;

    let uri: Uri = url
        .parse()
        .map_err(|e| TransportError::InvalidRequest(format!("{url}: {e}")))?;

    let body = match body {
        RequestBody::Empty => full(Bytes::new()),
        RequestBody::Text(text) => full(Bytes::from(text)),
        RequestBody::Bytes(bytes) => full(bytes),
        RequestBody::Form(pairs) => {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("application/x-www-form-urlencoded"),
                );
            }
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs.iter())
                .finish();
            full(Bytes::from(encoded))
        }
        RequestBody::Multipart(form) => {
            let boundary = format!("----contract-tap-{:016x}", rand::random::<u64>());
            let value = HeaderValue::from_str(&format!("multipart/form-data; boundary={boundary}"))
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
            headers.insert(CONTENT_TYPE, value);
            full(form.encode(&boundary))
        }
        RequestBody::Stream(stream) => {
            StreamBody::new(stream.into_inner().map_ok(Frame::data)).boxed_unsync()
        }
    };

    debug!("Sending {} {}", method, uri);

    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(target) = builder.headers_mut() {
        target.extend(headers);
    }
    builder
        .body(body)
        .map_err(|e| TransportError::InvalidRequest(e.to_string()))
}

fn full(bytes: Bytes) -> OutboundBody {
    Full::new(bytes)
        .map_err(|never: Infallible| match never {})
        .boxed_unsync()
}

//! The outbound call path.
//!
//! Applications send every request through an [`EntryPoint`]. The entry point
//! forwards to whichever [`Transport`] currently occupies its slot; the
//! interception layer stacks a capturing wrapper into that slot and later
//! removes exactly that layer. The entry point also holds the single contract
//! pipeline bound to it.
//!
//! # Module Structure
//!
//! - `body` - Request body variants (text, bytes, forms, streams)
//! - `client` - Default hyper-based transport and its connection settings
//! - `tls` - rustls provider and the no-verify certificate verifier

mod body;
mod client;
mod tls;

pub use body::{BodyStream, ByteStream, FormPart, MultipartForm, PartValue, RequestBody};
pub use client::{ClientConfig, HttpClient, HyperTransport};

use crate::error::TransportError;
use crate::lifecycle::ActivePipeline;
use async_trait::async_trait;
use bytes::Bytes;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{HeaderMap, Method, Response};
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// A request as issued by the application.
///
/// The URL is kept as the raw string the caller supplied so capture can
/// describe it even when it does not parse.
#[derive(Debug)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl OutboundRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Appends a header. Names or values that are not valid HTTP are dropped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => warn!("Dropping invalid request header '{}'", name),
        }
        self
    }

    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a JSON body and its content type.
    pub fn json(self, value: &serde_json::Value) -> Self {
        self.header("content-type", "application/json")
            .body(RequestBody::json(value))
    }
}

/// The underlying request/response call.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<Response<Bytes>, TransportError>;

    /// Number of capture wrappers stacked on top of the real transport.
    fn capture_depth(&self) -> usize {
        0
    }

    /// The transport a wrapping layer forwards to.
    fn next_layer(&self) -> Option<Arc<dyn Transport>> {
        None
    }

    /// Splices `layer` out of the chain below this transport.
    fn unlink(&self, _layer: &Arc<dyn Transport>) -> bool {
        false
    }
}

/// The single swappable slot all outbound calls go through.
pub struct EntryPoint {
    current: RwLock<Arc<dyn Transport>>,
    pipeline: Mutex<Option<ActivePipeline>>,
}

impl EntryPoint {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            current: RwLock::new(transport),
            pipeline: Mutex::new(None),
        }
    }

    /// The transport currently in the slot.
    pub fn current(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.current.read())
    }

    /// Puts `transport` into the slot and returns the one it displaced.
    pub fn replace(&self, transport: Arc<dyn Transport>) -> Arc<dyn Transport> {
        std::mem::replace(&mut *self.current.write(), transport)
    }

    /// Replaces the current transport with `wrap(current)` under a single
    /// write lock and returns the new layer.
    pub fn wrap<F>(&self, wrap: F) -> Arc<dyn Transport>
    where
        F: FnOnce(Arc<dyn Transport>) -> Arc<dyn Transport>,
    {
        let mut current = self.current.write();
        let layer = wrap(Arc::clone(&current));
        *current = Arc::clone(&layer);
        layer
    }

    /// Removes one wrapping layer wherever it sits in the chain. Layers
    /// stacked above it keep forwarding to what was below it. Returns false
    /// when `layer` is no longer part of the chain.
    pub fn remove_layer(&self, layer: &Arc<dyn Transport>) -> bool {
        let mut current = self.current.write();
        if Arc::ptr_eq(&*current, layer) {
            return match layer.next_layer() {
                Some(next) => {
                    *current = next;
                    true
                }
                None => false,
            };
        }
        let removed = current.unlink(layer);
        if removed {
            debug!("Removed a capture layer buried under another wrapper");
        }
        removed
    }

    pub fn capture_depth(&self) -> usize {
        self.current.read().capture_depth()
    }

    pub fn is_wrapped(&self) -> bool {
        self.capture_depth() > 0
    }

    /// The contract pipeline slot shared by every lifecycle on this entry point.
    pub(crate) fn pipeline(&self) -> &Mutex<Option<ActivePipeline>> {
        &self.pipeline
    }

    /// Sends `request` through whatever transport occupies the slot.
    pub async fn send(&self, request: OutboundRequest) -> Result<Response<Bytes>, TransportError> {
        let transport = self.current();
        transport.send(request).await
    }
}

/// Stand-in used when the default client cannot be built.
struct UnavailableTransport {
    reason: String,
}

#[async_trait]
impl Transport for UnavailableTransport {
    async fn send(&self, _request: OutboundRequest) -> Result<Response<Bytes>, TransportError> {
        Err(TransportError::Connect(self.reason.clone()))
    }
}

static GLOBAL_ENTRY_POINT: Lazy<Arc<EntryPoint>> = Lazy::new(|| {
    let transport: Arc<dyn Transport> = match HyperTransport::new(&ClientConfig::default()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Default HTTP client unavailable: {}", e);
            Arc::new(UnavailableTransport {
                reason: e.to_string(),
            })
        }
    };
    Arc::new(EntryPoint::new(transport))
});

/// The process-wide entry point, backed by [`HyperTransport`].
pub fn global() -> Arc<EntryPoint> {
    Arc::clone(&GLOBAL_ENTRY_POINT)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(u16);

    #[async_trait]
    impl Transport for Fixed {
        async fn send(&self, _request: OutboundRequest) -> Result<Response<Bytes>, TransportError> {
            Ok(Response::builder()
                .status(self.0)
                .body(Bytes::new())
                .unwrap())
        }
    }

    #[tokio::test]
    async fn test_entry_point_forwards_to_current() {
        let entry = EntryPoint::new(Arc::new(Fixed(200)));
        let response = entry.send(OutboundRequest::get("http://x/")).await.unwrap();
        assert_eq!(response.status(), 200);

        let previous = entry.replace(Arc::new(Fixed(204)));
        assert_eq!(previous.capture_depth(), 0);
        let response = entry.send(OutboundRequest::get("http://x/")).await.unwrap();
        assert_eq!(response.status(), 204);
        assert!(!entry.is_wrapped());
    }

    #[test]
    fn test_request_builder_headers() {
        let request = OutboundRequest::post("/api")
            .header("X-Trace", "abc")
            .header("bad header", "x")
            .json(&serde_json::json!({"a": 1}));
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.headers.get("x-trace").unwrap(), "abc");
        assert_eq!(request.headers.len(), 2);
        assert!(matches!(request.body, RequestBody::Text(ref t) if t == r#"{"a":1}"#));
    }
}

//! Transparent interception of the outbound call path.
//!
//! [`Interceptor::install`] wraps whatever transport occupies an
//! [`EntryPoint`] in a [`CapturingTransport`]. The wrapper snapshots each
//! request, forwards it untouched, and publishes what happened on the
//! [`EventBus`]. The caller always gets back exactly what the underlying
//! transport produced.
//!
//! # Module Structure
//!
//! - `events` - Typed event bus and payloads

mod events;

pub use events::{
    Event, EventBus, EventKind, RequestFailed, RequestObserved, ResponseObserved, Subscription,
};

use crate::capture::{capture_request, capture_response, header_map, header_value};
use crate::error::TransportError;
use crate::metrics;
use crate::transport::{EntryPoint, OutboundRequest, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use hyper::{HeaderMap, Response};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Transport wrapper that observes every exchange it forwards.
pub struct CapturingTransport {
    /// Re-pointed when a layer below is removed out of order.
    inner: RwLock<Arc<dyn Transport>>,
    bus: Arc<EventBus>,
}

impl CapturingTransport {
    pub fn new(inner: Arc<dyn Transport>, bus: Arc<EventBus>) -> Self {
        Self {
            inner: RwLock::new(inner),
            bus,
        }
    }

    pub fn inner(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.inner.read())
    }
}

#[async_trait]
impl Transport for CapturingTransport {
    async fn send(&self, request: OutboundRequest) -> Result<Response<Bytes>, TransportError> {
        let correlation_id = correlation_id(&request.headers);
        let captured = Arc::new(capture_request(&request, Some(correlation_id.clone())));
        debug!(
            "Captured {} {} [{}]",
            captured.method, captured.url, correlation_id
        );
        self.bus.emit(RequestObserved {
            request: Arc::clone(&captured),
        });

        let started = Instant::now();
        let inner = self.inner();
        let outcome = inner.send(request).await;
        let duration = started.elapsed();

        match &outcome {
            Ok(response) => {
                let duplicate = duplicate_response(response);
                let bus = Arc::clone(&self.bus);
                self.bus.run_detached(move || {
                    let snapshot =
                        capture_response(&duplicate, Some(duration), Some(correlation_id));
                    debug!(
                        "Captured response {} for {} {}",
                        snapshot.status, captured.method, captured.url
                    );
                    metrics::record_exchange(&captured.method, "response", duration);
                    bus.emit(ResponseObserved {
                        request: captured,
                        response: Arc::new(snapshot),
                    });
                });
            }
            Err(e) => {
                debug!("{} {} failed: {}", captured.method, captured.url, e);
                metrics::record_exchange(&captured.method, "error", duration);
                self.bus.emit(RequestFailed {
                    request: captured,
                    error: e.clone(),
                    duration,
                });
            }
        }

        outcome
    }

    fn capture_depth(&self) -> usize {
        self.inner().capture_depth() + 1
    }

    fn next_layer(&self) -> Option<Arc<dyn Transport>> {
        Some(self.inner())
    }

    fn unlink(&self, layer: &Arc<dyn Transport>) -> bool {
        let mut inner = self.inner.write();
        if Arc::ptr_eq(&*inner, layer) {
            return match layer.next_layer() {
                Some(next) => {
                    *inner = next;
                    true
                }
                None => false,
            };
        }
        let below = Arc::clone(&inner);
        drop(inner);
        below.unlink(layer)
    }
}

/// Installs and removes a [`CapturingTransport`] on one entry point.
///
/// Both operations are idempotent: installing twice wraps once, removing
/// twice unwraps once. Uninstalling removes only this interceptor's own
/// layer, even when another wrapper has since been stacked on top.
pub struct Interceptor {
    entry: Weak<EntryPoint>,
    bus: Arc<EventBus>,
    layer: Mutex<Option<Arc<dyn Transport>>>,
}

impl Interceptor {
    pub fn new(entry: Arc<EntryPoint>, bus: Arc<EventBus>) -> Self {
        Self {
            entry: Arc::downgrade(&entry),
            bus,
            layer: Mutex::new(None),
        }
    }

    /// Returns false when already installed or the entry point is gone.
    pub fn install(&self) -> bool {
        let mut layer = self.layer.lock();
        if layer.is_some() {
            debug!("Interceptor already installed");
            return false;
        }
        let Some(entry) = self.entry.upgrade() else {
            return false;
        };
        let bus = Arc::clone(&self.bus);
        let installed = entry.wrap(|current| {
            let wrapper: Arc<dyn Transport> = Arc::new(CapturingTransport::new(current, bus));
            wrapper
        });
        *layer = Some(installed);
        info!("Interceptor installed on outbound entry point");
        true
    }

    /// Returns false when nothing was installed.
    pub fn uninstall(&self) -> bool {
        let Some(layer) = self.layer.lock().take() else {
            return false;
        };
        match self.entry.upgrade() {
            Some(entry) if entry.remove_layer(&layer) => {
                info!("Interceptor removed from outbound entry point");
            }
            Some(_) => warn!("Capture layer was already displaced from the entry point"),
            None => debug!("Entry point dropped before interceptor removal"),
        }
        true
    }

    pub fn is_installed(&self) -> bool {
        self.layer.lock().is_some()
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn entry_point(&self) -> Option<Arc<EntryPoint>> {
        self.entry.upgrade()
    }
}

impl Drop for Interceptor {
    fn drop(&mut self) {
        self.uninstall();
    }
}

/// `x-request-id` or `x-correlation-id` when the caller set one.
fn correlation_id(headers: &HeaderMap) -> String {
    let headers = header_map(headers);
    header_value(&headers, "x-request-id")
        .or_else(|| header_value(&headers, "x-correlation-id"))
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Copy sharing the caller's body buffer.
fn duplicate_response(response: &Response<Bytes>) -> Response<Bytes> {
    let mut copy = Response::new(response.body().clone());
    *copy.status_mut() = response.status();
    *copy.version_mut() = response.version();
    *copy.headers_mut() = response.headers().clone();
    copy
}

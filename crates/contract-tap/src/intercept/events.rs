//! Typed publish/subscribe for exchange events.
//!
//! Each [`EventKind`] has its own payload type. Listeners never run on the
//! caller's path: every delivery is a spawned task, so a slow or panicking
//! listener cannot delay or break the intercepted call.

use crate::capture::{CapturedRequest, CapturedResponse};
use crate::error::TransportError;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    RequestObserved,
    ResponseObserved,
    RequestFailed,
}

/// A payload that can travel on the bus.
pub trait Event: Send + Sync + 'static {
    const KIND: EventKind;
}

/// Emitted before the underlying call is issued.
#[derive(Debug, Clone)]
pub struct RequestObserved {
    pub request: Arc<CapturedRequest>,
}

/// Emitted once the response has been captured.
#[derive(Debug, Clone)]
pub struct ResponseObserved {
    pub request: Arc<CapturedRequest>,
    pub response: Arc<CapturedResponse>,
}

/// Emitted when the underlying call failed; the same error is returned to
/// the caller.
#[derive(Debug, Clone)]
pub struct RequestFailed {
    pub request: Arc<CapturedRequest>,
    pub error: TransportError,
    pub duration: Duration,
}

impl Event for RequestObserved {
    const KIND: EventKind = EventKind::RequestObserved;
}

impl Event for ResponseObserved {
    const KIND: EventKind = EventKind::ResponseObserved;
}

impl Event for RequestFailed {
    const KIND: EventKind = EventKind::RequestFailed;
}

type Payload = Arc<dyn Any + Send + Sync>;
type Listener = Arc<dyn Fn(&(dyn Any + Send + Sync)) + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    kind: EventKind,
    id: u64,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<HashMap<EventKind, Vec<(u64, Listener)>>>,
    next_id: AtomicU64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<E, F>(&self, listener: F) -> Subscription
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let erased: Listener = Arc::new(move |payload: &(dyn Any + Send + Sync)| {
            if let Some(event) = payload.downcast_ref::<E>() {
                listener(event);
            }
        });
        self.listeners
            .write()
            .entry(E::KIND)
            .or_default()
            .push((id, erased));
        debug!("Subscribed listener {} to {:?}", id, E::KIND);
        Subscription { kind: E::KIND, id }
    }

    /// Removes a listener. Returns false if it was already gone.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut listeners = self.listeners.write();
        let Some(entries) = listeners.get_mut(&subscription.kind) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(id, _)| *id != subscription.id);
        before != entries.len()
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.read().get(&kind).map_or(0, Vec::len)
    }

    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    /// Delivers `event` to every listener of its kind, each on its own task.
    pub fn emit<E: Event>(&self, event: E) {
        let listeners: Vec<Listener> = match self.listeners.read().get(&E::KIND) {
            Some(entries) => entries.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return,
        };
        let payload: Payload = Arc::new(event);
        for listener in listeners {
            let payload = Arc::clone(&payload);
            self.run_detached(move || deliver(E::KIND, &listener, &*payload));
        }
    }

    /// Runs `job` on a tracked task, or inline when no runtime is available.
    pub(crate) fn run_detached<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match Handle::try_current() {
            Ok(handle) => {
                let task = handle.spawn(async move { job() });
                let mut tasks = self.tasks.lock();
                tasks.retain(|task| !task.is_finished());
                tasks.push(task);
            }
            Err(_) => job(),
        }
    }

    /// Waits until every outstanding capture and listener task has finished,
    /// including tasks spawned while waiting.
    pub async fn settle(&self) {
        loop {
            let pending: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
            if pending.is_empty() {
                return;
            }
            for task in pending {
                if let Err(e) = task.await {
                    error!("Event task failed: {}", e);
                }
            }
        }
    }
}

fn deliver(kind: EventKind, listener: &Listener, payload: &(dyn Any + Send + Sync)) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| (**listener)(payload))) {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        error!("Listener for {:?} panicked: {}", kind, message);
    }
}

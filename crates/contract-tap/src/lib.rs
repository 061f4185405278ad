//! Observe outbound HTTP exchanges and validate them against API contracts.
//!
//! Register contracts once; every request sent through the
//! [`transport::EntryPoint`] is then captured, forwarded unchanged, and its
//! settled exchange checked aspect by aspect. Violations go to an optional
//! callback and to the log. Traffic itself is never altered.

// ===== Call path =====
pub mod intercept;
pub mod transport;

// ===== Capture and validation =====
pub mod capture;
pub mod contract;
pub mod report;
pub mod validate;

// ===== Control and observability =====
pub mod error;
pub mod lifecycle;
pub mod metrics;

pub use error::{ConfigError, EvaluatorError, TransportError};
pub use lifecycle::{register_contracts, unregister_contracts, ContractLifecycle, PipelineConfig};

/// Commonly used types.
pub mod prelude {
    pub use crate::capture::{CapturedRequest, CapturedResponse};
    pub use crate::contract::{ContractDefinition, ObjectSchema, Schema};
    pub use crate::error::{ConfigError, TransportError};
    pub use crate::intercept::{EventBus, RequestFailed, RequestObserved, ResponseObserved};
    pub use crate::lifecycle::{
        register_contracts, unregister_contracts, ContractLifecycle, PipelineConfig,
    };
    pub use crate::transport::{EntryPoint, OutboundRequest, Transport};
    pub use crate::validate::{Aspect, ContractValidationResult, ValidatorOptions};
}

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter`. Returns false if a global subscriber already exists.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}

//! Registration and teardown of the capture/validation pipeline.
//!
//! Every entry point holds at most one [`ActivePipeline`]. A
//! [`ContractLifecycle`] is a handle onto that slot: registering again, from
//! any lifecycle bound to the same entry point, replaces the pipeline
//! wholesale, so the entry point is never wrapped twice.

use crate::contract::{ContractDefinition, ContractRegistry};
use crate::error::ConfigError;
use crate::intercept::{EventBus, Interceptor, Subscription};
use crate::report::{LogSink, Reporter};
use crate::transport::{self, EntryPoint};
use crate::validate::{
    ContractValidationResult, SchemaEvaluator, ValidationEngine, ValidatorOptions,
    ViolationCallback,
};
use once_cell::sync::Lazy;
use std::sync::Arc;
use tracing::{debug, info};

/// Everything needed to start a pipeline.
#[derive(Clone, Default)]
pub struct PipelineConfig {
    pub contracts: Vec<ContractDefinition>,
    pub options: ValidatorOptions,
    pub on_violation: Option<ViolationCallback>,
    /// Defaults to the draft-07 `JsonSchemaEvaluator`.
    pub evaluator: Option<Arc<dyn SchemaEvaluator>>,
    /// Defaults to `TracingSink`.
    pub sink: Option<Arc<dyn LogSink>>,
}

impl PipelineConfig {
    pub fn new(contracts: Vec<ContractDefinition>) -> Self {
        Self {
            contracts,
            ..Self::default()
        }
    }

    pub fn with_options(mut self, options: ValidatorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_on_violation<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ContractValidationResult) + Send + Sync + 'static,
    {
        self.on_violation = Some(Arc::new(callback));
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn SchemaEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }
}

/// An installed interceptor plus the engine listening on its bus.
pub struct ActivePipeline {
    interceptor: Interceptor,
    engine: Arc<ValidationEngine>,
    subscription: Subscription,
}

impl ActivePipeline {
    fn start(
        entry: &Arc<EntryPoint>,
        registry: ContractRegistry,
        config: PipelineConfig,
    ) -> Self {
        let mut engine = ValidationEngine::new(registry).with_options(config.options);
        if let Some(evaluator) = config.evaluator {
            engine = engine.with_evaluator(evaluator);
        }
        if let Some(callback) = config.on_violation {
            engine = engine.with_on_violation(callback);
        }
        if let Some(sink) = config.sink {
            engine = engine.with_reporter(Reporter::new(sink));
        }
        let engine = Arc::new(engine);

        let bus = Arc::new(EventBus::new());
        let subscription = engine.attach(&bus);
        let interceptor = Interceptor::new(Arc::clone(entry), bus);
        interceptor.install();

        Self {
            interceptor,
            engine,
            subscription,
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        self.interceptor.bus()
    }

    pub fn engine(&self) -> &Arc<ValidationEngine> {
        &self.engine
    }

    fn stop(self) {
        self.engine.detach(self.interceptor.bus(), &self.subscription);
        self.interceptor.uninstall();
    }
}

pub struct ContractLifecycle {
    entry: Arc<EntryPoint>,
}

impl ContractLifecycle {
    pub fn new(entry: Arc<EntryPoint>) -> Self {
        Self { entry }
    }

    /// Starts a pipeline for `config`, replacing any active one.
    ///
    /// The contract list is validated first; on error the current pipeline,
    /// if any, stays in place.
    pub fn register(&self, config: PipelineConfig) -> Result<(), ConfigError> {
        let registry = ContractRegistry::new(config.contracts.clone())?;
        let count = registry.len();

        let mut active = self.entry.pipeline().lock();
        if let Some(previous) = active.take() {
            debug!("Replacing active contract pipeline");
            previous.stop();
        }
        *active = Some(ActivePipeline::start(&self.entry, registry, config));
        info!("Registered {} API contracts", count);
        Ok(())
    }

    /// Tears down the active pipeline. Safe to call at any time.
    pub fn unregister(&self) {
        let previous = self.entry.pipeline().lock().take();
        match previous {
            Some(pipeline) => {
                pipeline.stop();
                info!("Unregistered API contracts");
            }
            None => debug!("No contract pipeline to unregister"),
        }
    }

    pub fn is_active(&self) -> bool {
        self.entry.pipeline().lock().is_some()
    }

    pub fn entry_point(&self) -> &Arc<EntryPoint> {
        &self.entry
    }

    /// Bus of the active pipeline.
    pub fn bus(&self) -> Option<Arc<EventBus>> {
        self.entry
            .pipeline()
            .lock()
            .as_ref()
            .map(|pipeline| Arc::clone(pipeline.bus()))
    }

    /// Waits for outstanding capture and validation work of the active
    /// pipeline.
    pub async fn settle(&self) {
        if let Some(bus) = self.bus() {
            bus.settle().await;
        }
    }
}

static GLOBAL_LIFECYCLE: Lazy<ContractLifecycle> =
    Lazy::new(|| ContractLifecycle::new(transport::global()));

/// Lifecycle bound to the process-wide entry point.
pub fn global_lifecycle() -> &'static ContractLifecycle {
    &GLOBAL_LIFECYCLE
}

/// Registers contracts on the process-wide entry point.
pub fn register_contracts(config: PipelineConfig) -> Result<(), ConfigError> {
    global_lifecycle().register(config)
}

/// Removes the process-wide pipeline, if any.
pub fn unregister_contracts() {
    global_lifecycle().unregister();
}

//! Contract validation of settled exchanges.
//!
//! The engine looks up the contract for an exchange, checks every aspect the
//! contract declares on its own, and yields one [`ContractValidationResult`]
//! per failing aspect. Nothing here ever returns an error to the caller of
//! the intercepted transport: evaluator failures are folded into a single
//! synthetic violation for the affected aspect.
//!
//! # Module Structure
//!
//! - `evaluator` - Schema evaluator seam and the draft-07 implementation

mod evaluator;

pub use evaluator::{JsonSchemaEvaluator, SchemaEvaluator};

use crate::capture::{CapturedRequest, CapturedResponse};
use crate::contract::{ContractDefinition, ContractRegistry, Schema};
use crate::error::EvaluatorError;
use crate::intercept::{EventBus, ResponseObserved, Subscription};
use crate::metrics;
use crate::report::Reporter;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

/// The independently checked parts of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Aspect {
    RequestBody,
    RequestQuery,
    RequestHeaders,
    RequestCookies,
    ResponseBody,
    ResponseStatus,
    ResponseHeaders,
    ResponseCookies,
}

impl Aspect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aspect::RequestBody => "request-body",
            Aspect::RequestQuery => "request-query",
            Aspect::RequestHeaders => "request-headers",
            Aspect::RequestCookies => "request-cookies",
            Aspect::ResponseBody => "response-body",
            Aspect::ResponseStatus => "response-status",
            Aspect::ResponseHeaders => "response-headers",
            Aspect::ResponseCookies => "response-cookies",
        }
    }

    /// Human form used in log summaries, e.g. `response body`.
    pub fn display_name(&self) -> String {
        self.as_str().replace('-', " ")
    }
}

impl fmt::Display for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failing check inside an aspect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorItem {
    /// JSON pointer into the checked value; empty for the value itself.
    pub field: String,
    pub message: String,
    /// The offending value, when one exists (absent for missing properties).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received: Option<Value>,
    /// Schema fragment owning the failing keyword.
    pub expected: Value,
}

/// A violation of one aspect of one contract by one exchange.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractValidationResult {
    pub valid: bool,
    pub contract: Arc<ContractDefinition>,
    pub request: Arc<CapturedRequest>,
    pub response: Arc<CapturedResponse>,
    pub aspect: Aspect,
    pub errors: Vec<ErrorItem>,
}

fn default_true() -> bool {
    true
}

/// Which sides of an exchange are checked and whether violations are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorOptions {
    #[serde(default = "default_true")]
    pub validate_requests: bool,
    #[serde(default = "default_true")]
    pub validate_responses: bool,
    #[serde(default = "default_true")]
    pub log_violations: bool,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            validate_requests: true,
            validate_responses: true,
            log_violations: true,
        }
    }
}

/// Caller hook invoked with every violation before it is logged.
pub type ViolationCallback = Arc<dyn Fn(&ContractValidationResult) + Send + Sync>;

pub struct ValidationEngine {
    registry: Arc<ContractRegistry>,
    evaluator: Arc<dyn SchemaEvaluator>,
    options: ValidatorOptions,
    on_violation: Option<ViolationCallback>,
    reporter: Reporter,
}

impl ValidationEngine {
    pub fn new(registry: ContractRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            evaluator: Arc::new(JsonSchemaEvaluator::new()),
            options: ValidatorOptions::default(),
            on_violation: None,
            reporter: Reporter::default(),
        }
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn SchemaEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_options(mut self, options: ValidatorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_on_violation(mut self, callback: ViolationCallback) -> Self {
        self.on_violation = Some(callback);
        self
    }

    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn registry(&self) -> &ContractRegistry {
        &self.registry
    }

    pub fn options(&self) -> &ValidatorOptions {
        &self.options
    }

    /// Checks one settled exchange. Returns one result per failing aspect,
    /// in aspect order; empty when nothing failed or no contract matched.
    pub fn validate_exchange(
        &self,
        request: &Arc<CapturedRequest>,
        response: &Arc<CapturedResponse>,
    ) -> Vec<ContractValidationResult> {
        let Some(contract) = self.registry.find(&request.method, request.path()) else {
            debug!(
                "No contract for {} {}; skipping validation",
                request.method,
                request.path()
            );
            metrics::record_unmatched();
            return Vec::new();
        };
        debug!(
            "Validating {} {} against contract '{}'",
            request.method,
            request.path(),
            contract.display_name()
        );

        let check = |aspect: Aspect, schema: Option<&Schema>, instance: &dyn Fn() -> Value| {
            schema.map(|schema| (aspect, self.check_schema(aspect, schema, &instance())))
        };
        let mut checked = Vec::new();

        if self.options.validate_requests {
            let aspects = &contract.request;
            checked.push(check(Aspect::RequestBody, aspects.body.as_ref(), &|| {
                request.body.to_json()
            }));
            checked.push(check(Aspect::RequestQuery, aspects.query.as_ref(), &|| {
                request.parsed_url.query_json()
            }));
            checked.push(check(Aspect::RequestHeaders, aspects.headers.as_ref(), &|| {
                string_map(&request.headers)
            }));
            checked.push(check(Aspect::RequestCookies, aspects.cookies.as_ref(), &|| {
                string_map(&request.cookies)
            }));
        }

        if self.options.validate_responses {
            let aspects = &contract.response;
            checked.push(check(Aspect::ResponseBody, aspects.body.as_ref(), &|| {
                response.body.to_json()
            }));
            checked.push(
                aspects
                    .status_codes
                    .as_deref()
                    .map(|codes| (Aspect::ResponseStatus, check_status(codes, response.status))),
            );
            checked.push(check(Aspect::ResponseHeaders, aspects.headers.as_ref(), &|| {
                string_map(&response.headers)
            }));
            checked.push(check(Aspect::ResponseCookies, aspects.cookies.as_ref(), &|| {
                string_map(&response.cookies)
            }));
        }

        checked
            .into_iter()
            .flatten()
            .filter(|(_, errors)| !errors.is_empty())
            .map(|(aspect, errors)| ContractValidationResult {
                valid: false,
                contract: Arc::clone(contract),
                request: Arc::clone(request),
                response: Arc::clone(response),
                aspect,
                errors,
            })
            .collect()
    }

    /// Validates and dispatches: callback first, then the reporter. A panic in
    /// either is logged and does not stop the other or later results.
    pub fn process_exchange(
        &self,
        request: &Arc<CapturedRequest>,
        response: &Arc<CapturedResponse>,
    ) -> Vec<ContractValidationResult> {
        let results = self.validate_exchange(request, response);
        for result in &results {
            metrics::record_violation(result.aspect.as_str());
            if let Some(callback) = &self.on_violation {
                if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(result))) {
                    error!(
                        "Violation callback panicked for {} {}: {}",
                        result.request.method,
                        result.contract.display_name(),
                        panic_message(panic.as_ref())
                    );
                }
            }
            if self.options.log_violations {
                if let Err(panic) = catch_unwind(AssertUnwindSafe(|| self.reporter.report(result))) {
                    error!(
                        "Violation reporter panicked for {} {}: {}",
                        result.request.method,
                        result.contract.display_name(),
                        panic_message(panic.as_ref())
                    );
                }
            }
        }
        results
    }

    /// Subscribes the engine to settled responses on `bus`.
    pub fn attach(self: &Arc<Self>, bus: &EventBus) -> Subscription {
        let engine = Arc::clone(self);
        bus.subscribe(move |event: &ResponseObserved| {
            engine.process_exchange(&event.request, &event.response);
        })
    }

    pub fn detach(&self, bus: &EventBus, subscription: &Subscription) -> bool {
        bus.unsubscribe(subscription)
    }

    fn check_schema(&self, aspect: Aspect, schema: &Schema, instance: &Value) -> Vec<ErrorItem> {
        let mut schema_json = schema.to_json();
        if matches!(aspect, Aspect::RequestHeaders | Aspect::ResponseHeaders) {
            lowercase_property_names(&mut schema_json);
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.evaluator.evaluate(&schema_json, instance)
        }));
        let failure = match outcome {
            Ok(Ok(errors)) => return errors,
            Ok(Err(e)) => {
                metrics::record_evaluator_failure(aspect.as_str(), "error");
                e
            }
            Err(panic) => {
                metrics::record_evaluator_failure(aspect.as_str(), "panic");
                EvaluatorError::Internal(panic_message(panic.as_ref()))
            }
        };
        error!("Schema evaluation failed for {}: {}", aspect, failure);
        vec![ErrorItem {
            field: String::new(),
            message: failure.to_string(),
            received: None,
            expected: schema_json,
        }]
    }
}

/// An empty allow-list is treated as undeclared.
fn check_status(allowed: &[u16], status: u16) -> Vec<ErrorItem> {
    if allowed.is_empty() || allowed.contains(&status) {
        return Vec::new();
    }
    let expected = allowed
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    vec![ErrorItem {
        field: "status".to_string(),
        message: format!("expected one of {} but received {}", expected, status),
        received: None,
        expected: json!({ "enum": allowed }),
    }]
}

fn string_map(map: &std::collections::BTreeMap<String, String>) -> Value {
    Value::Object(
        map.iter()
            .map(|(name, value)| (name.clone(), Value::String(value.clone())))
            .collect(),
    )
}

/// Captured header names are lower-case; make the schema's names match.
fn lowercase_property_names(schema: &mut Value) {
    let Value::Object(map) = schema else {
        return;
    };
    if let Some(Value::Object(properties)) = map.get_mut("properties") {
        let lowered: Map<String, Value> = std::mem::take(properties)
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();
        *properties = lowered;
    }
    if let Some(Value::Array(required)) = map.get_mut("required") {
        for name in required.iter_mut() {
            if let Value::String(name) = name {
                *name = name.to_ascii_lowercase();
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{capture_request, capture_response};
    use crate::contract::ObjectSchema;
    use crate::report::{LogSink, MemorySink};
    use crate::transport::OutboundRequest;
    use bytes::Bytes;
    use hyper::Response;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn exchange(
        request: OutboundRequest,
        status: u16,
        body: &'static str,
    ) -> (Arc<CapturedRequest>, Arc<CapturedResponse>) {
        let response = Response::builder()
            .status(status)
            .header("content-type", "application/json")
            .body(Bytes::from_static(body.as_bytes()))
            .unwrap();
        (
            Arc::new(capture_request(&request, None)),
            Arc::new(capture_response(&response, None, None)),
        )
    }

    fn user_schema() -> Schema {
        ObjectSchema::new()
            .property("id", Schema::integer())
            .property("name", Schema::string())
            .required(["id", "name"])
            .into()
    }

    fn engine(contracts: Vec<ContractDefinition>) -> ValidationEngine {
        ValidationEngine::new(ContractRegistry::new(contracts).unwrap())
            .with_reporter(Reporter::new(Arc::new(MemorySink::new())))
    }

    struct PanickingSink;

    impl LogSink for PanickingSink {
        fn warn(&self, _: &str) {
            panic!("sink failure");
        }
    }

    struct FailingEvaluator;

    impl SchemaEvaluator for FailingEvaluator {
        fn evaluate(&self, _: &Value, _: &Value) -> Result<Vec<ErrorItem>, EvaluatorError> {
            Err(EvaluatorError::Internal("boom".into()))
        }
    }

    struct PanickingEvaluator;

    impl SchemaEvaluator for PanickingEvaluator {
        fn evaluate(&self, _: &Value, _: &Value) -> Result<Vec<ErrorItem>, EvaluatorError> {
            panic!("evaluator exploded");
        }
    }

    #[test]
    fn test_response_body_type_mismatch() {
        let engine = engine(vec![
            ContractDefinition::new("GET", "/api/users").with_response_body(user_schema()),
        ]);
        let (request, response) = exchange(
            OutboundRequest::get("https://api.example.com/api/users"),
            200,
            r#"{"id": "7", "name": "Ann"}"#,
        );

        let results = engine.validate_exchange(&request, &response);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].aspect, Aspect::ResponseBody);
        assert!(!results[0].valid);
        assert_eq!(results[0].errors[0].field, "/id");
        assert_eq!(results[0].errors[0].received, Some(json!("7")));
    }

    #[test]
    fn test_status_violation_without_body_schema() {
        let engine = engine(vec![
            ContractDefinition::new("GET", "/api/users").with_status_codes([200, 201])
        ]);
        let (request, response) = exchange(OutboundRequest::get("/api/users"), 404, "{}");

        let results = engine.validate_exchange(&request, &response);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].aspect, Aspect::ResponseStatus);
        assert_eq!(
            results[0].errors[0].message,
            "expected one of 200, 201 but received 404"
        );
    }

    #[test]
    fn test_aspects_fail_independently() {
        let engine = engine(vec![ContractDefinition::new("POST", "/api/users")
            .with_request_body(user_schema())
            .with_response_body(user_schema())
            .with_status_codes([201])]);
        let (request, response) = exchange(
            OutboundRequest::post("/api/users").json(&json!({"id": 1})),
            500,
            r#"{"id": 1, "name": 2}"#,
        );

        let aspects: Vec<Aspect> = engine
            .validate_exchange(&request, &response)
            .iter()
            .map(|result| result.aspect)
            .collect();
        assert_eq!(
            aspects,
            vec![
                Aspect::RequestBody,
                Aspect::ResponseBody,
                Aspect::ResponseStatus
            ]
        );
    }

    #[test]
    fn test_unmatched_exchange_yields_nothing() {
        let engine = engine(vec![
            ContractDefinition::new("GET", "/api/users").with_status_codes([200])
        ]);
        let (request, response) = exchange(OutboundRequest::get("/api/orders"), 500, "{}");
        assert!(engine.validate_exchange(&request, &response).is_empty());
    }

    #[test]
    fn test_header_schema_is_case_insensitive() {
        let headers: Schema = ObjectSchema::new()
            .property("X-Request-Id", Schema::string())
            .required(["X-Request-Id"])
            .into();
        let engine = engine(vec![
            ContractDefinition::new("GET", "/ping").with_request_headers(headers)
        ]);

        let (request, response) = exchange(
            OutboundRequest::get("/ping").header("x-request-id", "abc"),
            200,
            "{}",
        );
        assert!(engine.validate_exchange(&request, &response).is_empty());

        let (request, response) = exchange(OutboundRequest::get("/ping"), 200, "{}");
        let results = engine.validate_exchange(&request, &response);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].errors[0].field, "/x-request-id");
    }

    #[test]
    fn test_query_values_checked_as_strings() {
        let query: Schema = ObjectSchema::new()
            .property("page", Schema::integer())
            .into();
        let engine = engine(vec![
            ContractDefinition::new("GET", "/items").with_request_query(query)
        ]);
        let (request, response) = exchange(OutboundRequest::get("/items?page=2"), 200, "{}");
        let results = engine.validate_exchange(&request, &response);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].aspect, Aspect::RequestQuery);
    }

    #[test]
    fn test_options_skip_request_side() {
        let engine = engine(vec![ContractDefinition::new("POST", "/api/users")
            .with_request_body(user_schema())])
        .with_options(ValidatorOptions {
            validate_requests: false,
            ..ValidatorOptions::default()
        });
        let (request, response) = exchange(
            OutboundRequest::post("/api/users").json(&json!({})),
            200,
            "{}",
        );
        assert!(engine.validate_exchange(&request, &response).is_empty());
    }

    #[test]
    fn test_evaluator_error_becomes_single_item() {
        let engine = engine(vec![ContractDefinition::new("GET", "/x")
            .with_response_body(user_schema())
            .with_status_codes([200])])
        .with_evaluator(Arc::new(FailingEvaluator));
        let (request, response) = exchange(OutboundRequest::get("/x"), 404, "{}");

        let results = engine.validate_exchange(&request, &response);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].aspect, Aspect::ResponseBody);
        assert_eq!(results[0].errors.len(), 1);
        assert!(results[0].errors[0].message.contains("boom"));
        assert_eq!(results[1].aspect, Aspect::ResponseStatus);
    }

    #[test]
    fn test_evaluator_panic_is_contained() {
        let engine = engine(vec![
            ContractDefinition::new("GET", "/x").with_response_body(user_schema())
        ])
        .with_evaluator(Arc::new(PanickingEvaluator));
        let (request, response) = exchange(OutboundRequest::get("/x"), 200, "{}");

        let results = engine.validate_exchange(&request, &response);
        assert_eq!(results.len(), 1);
        assert!(results[0].errors[0].message.contains("evaluator exploded"));
    }

    #[test]
    fn test_typeless_object_schema_accepts_non_objects() {
        let engine = engine(vec![ContractDefinition::new("GET", "/greeting")
            .with_response_body(json!({"properties": {"id": {"type": "integer"}}}))]);
        let response = Response::builder()
            .status(200)
            .header("content-type", "text/plain")
            .body(Bytes::from_static(b"hello"))
            .unwrap();
        let request = Arc::new(capture_request(&OutboundRequest::get("/greeting"), None));
        let response = Arc::new(capture_response(&response, None, None));
        assert!(engine.validate_exchange(&request, &response).is_empty());

        let (request, response) = exchange(OutboundRequest::get("/greeting"), 200, r#"{"id": "x"}"#);
        assert_eq!(engine.validate_exchange(&request, &response).len(), 1);
    }

    #[test]
    fn test_callback_runs_and_panics_are_contained() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let sink = Arc::new(MemorySink::new());
        let engine = engine(vec![
            ContractDefinition::new("GET", "/x").with_status_codes([200])
        ])
        .with_reporter(Reporter::new(sink.clone()))
        .with_on_violation(Arc::new(move |_: &ContractValidationResult| {
            seen.fetch_add(1, Ordering::SeqCst);
            panic!("callback failure");
        }));
        let (request, response) = exchange(OutboundRequest::get("/x"), 500, "{}");

        let results = engine.process_exchange(&request, &response);
        assert_eq!(results.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            sink.lines(),
            vec!["GET /x response status; status: expected one of 200 but received 500".to_string()]
        );
    }

    #[test]
    fn test_sink_panic_does_not_stop_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let engine = engine(vec![ContractDefinition::new("GET", "/x")
            .with_response_body(user_schema())
            .with_status_codes([200])])
        .with_reporter(Reporter::new(Arc::new(PanickingSink)))
        .with_on_violation(Arc::new(move |_: &ContractValidationResult| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        let (request, response) = exchange(OutboundRequest::get("/x"), 500, "not json");

        let results = engine.process_exchange(&request, &response);
        assert_eq!(results.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: ValidatorOptions =
            serde_json::from_value(json!({"logViolations": false})).unwrap();
        assert!(options.validate_requests);
        assert!(options.validate_responses);
        assert!(!options.log_violations);
    }

    #[test]
    fn test_aspect_names() {
        assert_eq!(Aspect::ResponseBody.as_str(), "response-body");
        assert_eq!(Aspect::RequestCookies.display_name(), "request cookies");
        assert_eq!(
            serde_json::to_value(Aspect::ResponseStatus).unwrap(),
            json!("response-status")
        );
    }
}

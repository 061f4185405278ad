//! Schema evaluation seam.
//!
//! The engine only needs "check this value against this schema and tell me
//! what failed". [`JsonSchemaEvaluator`] answers that with the `jsonschema`
//! crate in draft-07 mode; tests and embedders can plug in their own.

use super::ErrorItem;
use crate::error::EvaluatorError;
use jsonschema::error::ValidationErrorKind;
use jsonschema::{Draft, Validator};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Checks a value against a JSON Schema.
///
/// An empty list means the value conforms. `Err` means the evaluator itself
/// could not run (for example an uncompilable schema); the engine turns that
/// into a single synthetic violation.
pub trait SchemaEvaluator: Send + Sync {
    fn evaluate(&self, schema: &Value, instance: &Value) -> Result<Vec<ErrorItem>, EvaluatorError>;
}

/// Draft-07 evaluator with a cache of compiled validators keyed by the
/// schema's serialized form.
#[derive(Default)]
pub struct JsonSchemaEvaluator {
    compiled: Mutex<HashMap<String, Arc<Validator>>>,
}

impl JsonSchemaEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    fn validator(&self, schema: &Value) -> Result<Arc<Validator>, EvaluatorError> {
        let key = schema.to_string();
        if let Some(validator) = self.compiled.lock().get(&key) {
            return Ok(Arc::clone(validator));
        }

        // Compile outside the lock; a racing compile of the same schema is harmless.
        let validator = jsonschema::options()
            .with_draft(Draft::Draft7)
            .build(schema)
            .map_err(|e| EvaluatorError::InvalidSchema(e.to_string()))?;
        let validator = Arc::new(validator);
        debug!("Compiled schema validator ({} bytes)", key.len());
        self.compiled.lock().insert(key, Arc::clone(&validator));
        Ok(validator)
    }

    pub fn cached_schemas(&self) -> usize {
        self.compiled.lock().len()
    }
}

impl SchemaEvaluator for JsonSchemaEvaluator {
    fn evaluate(&self, schema: &Value, instance: &Value) -> Result<Vec<ErrorItem>, EvaluatorError> {
        let validator = self.validator(schema)?;
        let items = validator
            .iter_errors(instance)
            .map(|error| {
                let instance_path = error.instance_path.to_string();
                let expected = expected_fragment(schema, error.schema_path.as_str());
                match &error.kind {
                    ValidationErrorKind::Required { property } => {
                        let name = property
                            .as_str()
                            .map(str::to_string)
                            .unwrap_or_else(|| property.to_string());
                        ErrorItem {
                            field: format!("{}/{}", instance_path, escape_pointer(&name)),
                            message: format!("required property '{}' is missing", name),
                            received: None,
                            expected,
                        }
                    }
                    _ => ErrorItem {
                        received: instance.pointer(&instance_path).cloned(),
                        field: instance_path,
                        message: error.to_string(),
                        expected,
                    },
                }
            })
            .collect();
        Ok(items)
    }
}

/// The schema object owning the failing keyword.
///
/// Keyword paths that cross a `$ref` cannot be followed as plain pointers;
/// those fall back to naming the keyword alone.
fn expected_fragment(schema: &Value, schema_path: &str) -> Value {
    let (parent, keyword) = match schema_path.rsplit_once('/') {
        Some((parent, keyword)) => (parent, keyword),
        None => ("", schema_path),
    };
    match schema.pointer(parent) {
        Some(fragment @ Value::Object(_)) => fragment.clone(),
        _ => json!({ "keyword": keyword }),
    }
}

fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

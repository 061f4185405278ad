//! Human-readable violation reports.
//!
//! A report is a one-line summary (`GET /api/users response body`) followed
//! by one line per error item. The whole message goes out as a single warning;
//! multi-error reports also emit each line on its own, indented.

use crate::validate::{ContractValidationResult, ErrorItem};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Line-oriented warning channel.
pub trait LogSink: Send + Sync {
    fn warn(&self, line: &str);
}

/// Forwards lines to `tracing` at WARN level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn warn(&self, line: &str) {
        warn!(target: "contract_tap::violation", "{}", line);
    }
}

/// Collects lines in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl LogSink for MemorySink {
    fn warn(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}

#[derive(Clone)]
pub struct Reporter {
    sink: Arc<dyn LogSink>,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl Reporter {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    pub fn report(&self, result: &ContractValidationResult) {
        let lines: Vec<String> = result.errors.iter().map(format_error_line).collect();
        self.sink.warn(&format_message(result));
        if lines.len() > 1 {
            for line in &lines {
                self.sink.warn(&format!("  {}", line));
            }
        }
    }
}

/// `<METHOD> <label or path> <aspect with spaces>`
pub fn format_summary(result: &ContractValidationResult) -> String {
    format!(
        "{} {} {}",
        result.request.method,
        result.contract.display_name(),
        result.aspect.display_name()
    )
}

/// Summary followed by every error line, joined with `; `.
pub fn format_message(result: &ContractValidationResult) -> String {
    let mut parts = vec![format_summary(result)];
    parts.extend(result.errors.iter().map(format_error_line));
    parts.join("; ")
}

pub fn format_error_line(item: &ErrorItem) -> String {
    let field = field_label(&item.field);
    match &item.received {
        Some(received) => format!(
            "{}: expected {}, received {}",
            field,
            expected_type(&item.expected),
            runtime_type(received)
        ),
        None => format!("{}: {}", field, item.message),
    }
}

/// JSON pointer to dotted form; the empty pointer is the body itself.
pub fn field_label(pointer: &str) -> String {
    let segments: Vec<String> = pointer
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect();
    if segments.is_empty() {
        "body".to_string()
    } else {
        segments.join(".")
    }
}

fn expected_type(fragment: &Value) -> String {
    match fragment.get("type") {
        Some(Value::String(name)) => name.clone(),
        Some(Value::Array(names)) => {
            let names: Vec<&str> = names.iter().filter_map(Value::as_str).collect();
            if names.is_empty() {
                "per schema".to_string()
            } else {
                names.join(" or ")
            }
        }
        _ => "per schema".to_string(),
    }
}

pub fn runtime_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

//! Prometheus metrics for contract-tap.
//!
//! Tracks observed exchanges, contract violations, and evaluator health.
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec, Encoder,
    HistogramVec, TextEncoder,
};
use std::time::Duration;
use tracing::error;

lazy_static! {
    /// Exchanges seen by the interceptor
    pub static ref EXCHANGES_TOTAL: CounterVec = register_counter_vec!(
        "contract_tap_exchanges_total",
        "Total number of outbound exchanges observed",
        &["method", "outcome"]  // outcome: response|error
    )
    .unwrap();

    /// Contract violations, one per failing aspect
    pub static ref VIOLATIONS_TOTAL: CounterVec = register_counter_vec!(
        "contract_tap_violations_total",
        "Total number of contract violations detected",
        &["aspect"]
    )
    .unwrap();

    /// Exchanges with no matching contract
    pub static ref UNMATCHED_TOTAL: Counter = register_counter!(
        "contract_tap_unmatched_total",
        "Total number of exchanges that matched no contract"
    )
    .unwrap();

    /// Evaluator errors and panics converted into synthetic violations
    pub static ref EVALUATOR_FAILURES_TOTAL: CounterVec = register_counter_vec!(
        "contract_tap_evaluator_failures_total",
        "Total number of schema evaluator failures",
        &["aspect", "kind"]  // kind: error|panic
    )
    .unwrap();

    /// Time from dispatch to settlement of the underlying call
    pub static ref EXCHANGE_DURATION_MS: HistogramVec = register_histogram_vec!(
        "contract_tap_exchange_duration_ms",
        "Duration of observed exchanges in milliseconds",
        &["method", "outcome"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

const KNOWN_METHODS: &[&str] = &[
    "GET", "HEAD", "POST", "PUT", "DELETE", "CONNECT", "OPTIONS", "TRACE", "PATCH",
];

/// Standard methods keep their name; extension methods share `OTHER`.
fn method_label(method: &str) -> &'static str {
    KNOWN_METHODS
        .iter()
        .find(|known| known.eq_ignore_ascii_case(method))
        .copied()
        .unwrap_or("OTHER")
}

/// Helper to record a settled exchange
pub fn record_exchange(method: &str, outcome: &str, duration: Duration) {
    let method = method_label(method);
    EXCHANGES_TOTAL.with_label_values(&[method, outcome]).inc();
    EXCHANGE_DURATION_MS
        .with_label_values(&[method, outcome])
        .observe(duration.as_secs_f64() * 1000.0);
}

/// Helper to record one violation
pub fn record_violation(aspect: &str) {
    VIOLATIONS_TOTAL.with_label_values(&[aspect]).inc();
}

pub fn record_unmatched() {
    UNMATCHED_TOTAL.inc();
}

pub fn record_evaluator_failure(aspect: &str, kind: &str) {
    EVALUATOR_FAILURES_TOTAL
        .with_label_values(&[aspect, kind])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_exchange() {
        let before = EXCHANGES_TOTAL
            .with_label_values(&["GET", "response"])
            .get();
        record_exchange("GET", "response", Duration::from_millis(12));
        let after = EXCHANGES_TOTAL
            .with_label_values(&["GET", "response"])
            .get();
        assert!(after >= before + 1.0);
    }

    #[test]
    fn test_extension_methods_share_one_label() {
        assert_eq!(method_label("patch"), "PATCH");
        assert_eq!(method_label("PROPFIND"), "OTHER");

        let before = EXCHANGES_TOTAL
            .with_label_values(&["OTHER", "error"])
            .get();
        record_exchange("X-CUSTOM-VERB", "error", Duration::from_millis(1));
        assert!(
            EXCHANGES_TOTAL
                .with_label_values(&["OTHER", "error"])
                .get()
                >= before + 1.0
        );
    }

    #[test]
    fn test_record_violation() {
        record_violation("response-body");
        assert!(
            VIOLATIONS_TOTAL
                .with_label_values(&["response-body"])
                .get()
                >= 1.0
        );
    }

    #[test]
    fn test_collect_metrics() {
        record_unmatched();
        record_evaluator_failure("request-body", "panic");
        let output = collect_metrics();
        assert!(output.contains("contract_tap_unmatched_total"));
        assert!(output.contains("contract_tap_evaluator_failures_total"));
    }
}

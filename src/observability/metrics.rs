use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec, TextEncoder};

static LOGIN_RATE_LIMIT_DECISIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "login_rate_limit_decisions_total",
        "Login attempts seen by the rate limit gate",
        &["outcome"]
    )
    .expect("login_rate_limit_decisions_total registers once")
});

static RATE_LIMIT_BACKEND_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "rate_limit_backend_errors_total",
        "Rate limit store failures absorbed by the gate",
        &["backend", "operation"]
    )
    .expect("rate_limit_backend_errors_total registers once")
});

pub struct MetricsRecorder;

impl MetricsRecorder {
    /// `outcome` is one of `allowed`, `blocked`, `locked_out`
    pub fn record_gate_decision(outcome: &str) {
        LOGIN_RATE_LIMIT_DECISIONS
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn record_backend_error(backend: &str, operation: &str) {
        RATE_LIMIT_BACKEND_ERRORS
            .with_label_values(&[backend, operation])
            .inc();
    }

    pub fn gate_decisions(outcome: &str) -> u64 {
        LOGIN_RATE_LIMIT_DECISIONS
            .with_label_values(&[outcome])
            .get()
    }

    pub fn backend_errors(backend: &str, operation: &str) -> u64 {
        RATE_LIMIT_BACKEND_ERRORS
            .with_label_values(&[backend, operation])
            .get()
    }

    /// Export all metrics in Prometheus format
    pub fn export() -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        encoder.encode_to_string(&metric_families)
    }
}

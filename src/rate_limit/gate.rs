use crate::config::RateLimitConfig;
use crate::errors::AppError;
use crate::observability::MetricsRecorder;
use crate::rate_limit::policy::{LimiterPolicy, Outcome};
use crate::rate_limit::store::BucketStore;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Scope label of the login gate's keys
pub const LOGIN_SCOPE: &str = "login";

/// Receives a notice when the store keeps failing
pub trait BackendAlert: Send + Sync {
    fn notify(&self, backend: &str, consecutive_failures: u32, error: &AppError);
}

/// Default alert: an error-level log line
pub struct LogAlert;

impl BackendAlert for LogAlert {
    fn notify(&self, backend: &str, consecutive_failures: u32, error: &AppError) {
        tracing::error!(
            backend = %backend,
            consecutive_failures,
            error = %error,
            "Rate limit store keeps failing, login attempts are not being counted"
        );
    }
}

/// What the HTTP layer should do with the attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Allowed,
    Blocked {
        retry_after_secs: u64,
        message: String,
    },
}

impl GateOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateOutcome::Allowed)
    }

    pub fn into_result(self) -> crate::errors::Result<()> {
        match self {
            GateOutcome::Allowed => Ok(()),
            GateOutcome::Blocked {
                retry_after_secs,
                message,
            } => Err(AppError::RateLimited {
                message,
                retry_after_secs,
            }),
        }
    }
}

/// Request-facing entry point of the limiter.
///
/// Read, decide and write are not serialized per key: two concurrent
/// attempts from one identity can both read the same bucket and one update
/// is lost. Store failures never deny an attempt.
pub struct LoginGate {
    store: Arc<dyn BucketStore>,
    policy: LimiterPolicy,
    scope: String,
    lockout_message: String,
    alert: Arc<dyn BackendAlert>,
    alert_after_failures: u32,
    consecutive_failures: AtomicU32,
}

impl LoginGate {
    pub fn new(store: Arc<dyn BucketStore>, policy: LimiterPolicy, config: &RateLimitConfig) -> Self {
        Self {
            store,
            policy,
            scope: LOGIN_SCOPE.to_string(),
            lockout_message: config.lockout_message.clone(),
            alert: Arc::new(LogAlert),
            alert_after_failures: config.alert_after_failures.max(1),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub fn with_alert(mut self, alert: Arc<dyn BackendAlert>) -> Self {
        self.alert = alert;
        self
    }

    pub fn store(&self) -> &Arc<dyn BucketStore> {
        &self.store
    }

    pub fn policy(&self) -> &LimiterPolicy {
        &self.policy
    }

    pub fn key_for(&self, identity: &str) -> String {
        format!("{}:{}", self.scope, identity)
    }

    /// Check an attempt against the wall clock
    pub async fn check(&self, identity: &str) -> GateOutcome {
        self.check_at(identity, chrono::Utc::now().timestamp_millis())
            .await
    }

    /// Check an attempt made at `now` (ms since epoch)
    pub async fn check_at(&self, identity: &str, now: i64) -> GateOutcome {
        let key = self.key_for(identity);

        let existing = match self.store.get(&key).await {
            Ok(bucket) => {
                self.record_backend_success();
                bucket
            }
            Err(e) => {
                self.record_backend_failure("get", &e);
                None
            }
        };

        let decision = self.policy.decide(existing.as_ref(), now);

        if decision.needs_write() {
            match self.store.set(&key, &decision.bucket).await {
                Ok(()) => self.record_backend_success(),
                Err(e) => self.record_backend_failure("set", &e),
            }
        }

        match decision.outcome {
            Outcome::Allowed => {
                MetricsRecorder::record_gate_decision("allowed");
                tracing::debug!(
                    key = %key,
                    count = decision.bucket.count,
                    "Login attempt allowed"
                );
                GateOutcome::Allowed
            }
            Outcome::Blocked {
                retry_after_ms,
                newly_blocked,
            } => {
                if newly_blocked {
                    MetricsRecorder::record_gate_decision("locked_out");
                    tracing::warn!(
                        key = %key,
                        count = decision.bucket.count,
                        blocked_until = ?decision.bucket.blocked_until,
                        "Login lockout started"
                    );
                } else {
                    MetricsRecorder::record_gate_decision("blocked");
                    tracing::warn!(
                        key = %key,
                        retry_after_ms,
                        "Login attempt rejected during lockout"
                    );
                }

                GateOutcome::Blocked {
                    retry_after_secs: ceil_div(retry_after_ms, 1000),
                    message: self.lockout_message(retry_after_ms),
                }
            }
        }
    }

    fn lockout_message(&self, retry_after_ms: i64) -> String {
        let minutes = ceil_div(retry_after_ms, 60_000);
        self.lockout_message
            .replace("{minutes}", &minutes.to_string())
    }

    fn record_backend_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    fn record_backend_failure(&self, operation: &str, error: &AppError) {
        let backend = self.store.backend();
        MetricsRecorder::record_backend_error(backend, operation);

        match operation {
            "get" => tracing::error!(
                backend = %backend,
                error = %error,
                "Rate limit read failed, treating identity as unseen"
            ),
            _ => tracing::error!(
                backend = %backend,
                error = %error,
                "Rate limit write failed, attempt not recorded"
            ),
        }

        let failures = self
            .consecutive_failures
            .fetch_add(1, Ordering::Relaxed)
            .saturating_add(1);
        if failures % self.alert_after_failures == 0 {
            self.alert.notify(backend, failures, error);
        }
    }
}

// Whole units, never less than one
fn ceil_div(value_ms: i64, unit_ms: i64) -> u64 {
    let units = value_ms.max(1).saturating_add(unit_ms - 1) / unit_ms;
    units.max(1) as u64
}

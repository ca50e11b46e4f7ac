use crate::rate_limit::BucketStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthChecks {
    pub rate_limit_store: ComponentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentStatus {
    pub status: String,
    pub backend: String,
    pub message: Option<String>,
}

pub struct HealthChecker {
    store: Arc<dyn BucketStore>,
}

impl HealthChecker {
    pub fn new(store: Arc<dyn BucketStore>) -> Self {
        Self { store }
    }

    pub fn is_ok(status: &HealthStatus) -> bool {
        status.status == "ok"
    }

    /// Liveness check - is the service running?
    pub fn liveness(&self) -> HealthStatus {
        self.status(ComponentStatus {
            status: "unknown".to_string(),
            backend: self.store.backend().to_string(),
            message: None,
        })
    }

    /// Readiness check - can the store be reached?
    ///
    /// A degraded store does not stop logins (the gate fails open), but the
    /// instance reports it so orchestrators and operators notice.
    pub async fn readiness(&self) -> HealthStatus {
        let store_status = match self.store.health_check().await {
            Ok(()) => ComponentStatus {
                status: "ok".to_string(),
                backend: self.store.backend().to_string(),
                message: None,
            },
            Err(e) => ComponentStatus {
                status: "error".to_string(),
                backend: self.store.backend().to_string(),
                message: Some(format!("Rate limit store check failed: {}", e)),
            },
        };

        self.status(store_status)
    }

    fn status(&self, store_status: ComponentStatus) -> HealthStatus {
        let overall = match store_status.status.as_str() {
            "error" => "degraded",
            _ => "ok",
        };

        HealthStatus {
            status: overall.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            checks: HealthChecks {
                rate_limit_store: store_status,
            },
        }
    }
}

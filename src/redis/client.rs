use crate::{
    config::RedisConfig,
    errors::{AppError, Result},
};
use redis::{aio::ConnectionManager, Client};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Capped linear delay between connection attempts: `min(attempt * step, max_delay)`
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    step: Duration,
    max_delay: Duration,
    failures: u32,
    retry_at: Option<Instant>,
}

impl ReconnectBackoff {
    pub fn new(step: Duration, max_delay: Duration) -> Self {
        Self {
            step,
            max_delay,
            failures: 0,
            retry_at: None,
        }
    }

    /// Delay imposed after the given number of consecutive failures
    pub fn delay_for(&self, failures: u32) -> Duration {
        self.step.saturating_mul(failures).min(self.max_delay)
    }

    pub fn ready(&self, now: Instant) -> bool {
        self.retry_at.map_or(true, |at| now >= at)
    }

    /// Time left before the next attempt is allowed
    pub fn remaining(&self, now: Instant) -> Duration {
        self.retry_at
            .map_or(Duration::ZERO, |at| at.saturating_duration_since(now))
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Register a failed attempt and return the delay before the next one
    pub fn record_failure(&mut self, now: Instant) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let delay = self.delay_for(self.failures);
        self.retry_at = Some(now + delay);
        delay
    }

    pub fn reset(&mut self) {
        self.failures = 0;
        self.retry_at = None;
    }
}

struct ConnectorState {
    manager: Option<ConnectionManager>,
    connecting: bool,
    backoff: ReconnectBackoff,
}

/// Lazily established Redis connection.
///
/// Every connection attempt, the first one and each reconnect after a
/// dropped connection, is a single try paced by [`ReconnectBackoff`].
/// Callers inside the delay, or arriving while an attempt is in flight,
/// fail fast. The lock is never held across network I/O.
pub struct RedisConnector {
    client: Client,
    connect_timeout: Duration,
    state: Mutex<ConnectorState>,
}

/// Clears the in-flight flag even if the connecting future is dropped
struct AttemptGuard<'a> {
    state: &'a Mutex<ConnectorState>,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        lock(self.state).connecting = false;
    }
}

fn lock(state: &Mutex<ConnectorState>) -> MutexGuard<'_, ConnectorState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Errors after which the cached connection can no longer be trusted
pub fn is_connection_error(error: &AppError) -> bool {
    match error {
        AppError::Redis(e) => e.is_io_error() || e.is_connection_dropped() || e.is_timeout(),
        AppError::BackendTimeout(_) => true,
        _ => false,
    }
}

impl RedisConnector {
    /// Parse the URL without touching the network
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| AppError::Configuration(format!("Invalid Redis URL: {}", e)))?;

        Ok(Self {
            client,
            connect_timeout: Duration::from_millis(config.command_timeout_ms),
            state: Mutex::new(ConnectorState {
                manager: None,
                connecting: false,
                backoff: ReconnectBackoff::new(
                    Duration::from_millis(config.reconnect_step_ms),
                    Duration::from_millis(config.reconnect_max_delay_ms),
                ),
            }),
        })
    }

    /// Get a handle to the shared connection, connecting if needed
    pub async fn connection(&self) -> Result<ConnectionManager> {
        let _attempt = {
            let mut state = lock(&self.state);
            if let Some(manager) = &state.manager {
                return Ok(manager.clone());
            }
            if state.connecting {
                return Err(AppError::BackendUnavailable(
                    "Redis connection attempt already in progress".to_string(),
                ));
            }

            let now = Instant::now();
            if !state.backoff.ready(now) {
                return Err(AppError::BackendUnavailable(format!(
                    "Redis reconnect pending, next attempt in {} ms",
                    state.backoff.remaining(now).as_millis()
                )));
            }
            state.connecting = true;
            AttemptGuard { state: &self.state }
        };

        // Zero internal retries: the manager makes one attempt per connect
        // and per reconnect, the pacing above does the rest
        let attempt = tokio::time::timeout(
            self.connect_timeout,
            ConnectionManager::new_with_backoff(self.client.clone(), 2, 100, 0),
        )
        .await;

        let mut state = lock(&self.state);
        let error = match attempt {
            Ok(Ok(manager)) => {
                if state.backoff.failures() > 0 {
                    tracing::info!(
                        failed_attempts = state.backoff.failures(),
                        "Redis connection re-established"
                    );
                } else {
                    tracing::info!("Redis client connected");
                }
                state.backoff.reset();
                state.manager = Some(manager.clone());
                return Ok(manager);
            }
            Ok(Err(e)) => AppError::Redis(e),
            Err(_) => AppError::BackendTimeout(self.connect_timeout.as_millis() as u64),
        };

        let delay = state.backoff.record_failure(Instant::now());
        tracing::error!(
            error = %error,
            attempt = state.backoff.failures(),
            retry_in_ms = delay.as_millis() as u64,
            "Redis connection failed"
        );
        Err(error)
    }

    /// Drop the cached connection after a connection-level failure so the
    /// next caller reconnects through the backoff. Other errors are ignored.
    pub fn report_failure(&self, error: &AppError) {
        if !is_connection_error(error) {
            return;
        }
        let mut state = lock(&self.state);
        if state.manager.take().is_some() {
            let delay = state.backoff.record_failure(Instant::now());
            tracing::warn!(
                error = %error,
                retry_in_ms = delay.as_millis() as u64,
                "Redis connection lost"
            );
        }
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).manager.is_some()
    }

    /// Health check for Redis connection
    pub async fn health_check(&self) -> Result<()> {
        let mut manager = self.connection().await?;
        let cmd = redis::cmd("PING");
        let ping = cmd.query_async::<_, String>(&mut manager);

        let result = match tokio::time::timeout(self.connect_timeout, ping).await {
            Ok(reply) => reply.map(|_| ()).map_err(AppError::from),
            Err(_) => Err(AppError::BackendTimeout(
                self.connect_timeout.as_millis() as u64,
            )),
        };
        if let Err(error) = &result {
            self.report_failure(error);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff() -> ReconnectBackoff {
        ReconnectBackoff::new(Duration::from_millis(50), Duration::from_millis(2000))
    }

    #[test]
    fn test_backoff_is_linear_and_capped() {
        let backoff = backoff();
        assert_eq!(backoff.delay_for(0), Duration::ZERO);
        assert_eq!(backoff.delay_for(1), Duration::from_millis(50));
        assert_eq!(backoff.delay_for(10), Duration::from_millis(500));
        assert_eq!(backoff.delay_for(40), Duration::from_millis(2000));
        assert_eq!(backoff.delay_for(1000), Duration::from_millis(2000));
    }

    #[test]
    fn test_backoff_gates_attempts() {
        let mut backoff = backoff();
        let start = Instant::now();
        assert!(backoff.ready(start));

        assert_eq!(backoff.record_failure(start), Duration::from_millis(50));
        assert!(!backoff.ready(start + Duration::from_millis(49)));
        assert!(backoff.ready(start + Duration::from_millis(50)));

        assert_eq!(backoff.record_failure(start), Duration::from_millis(100));
        assert_eq!(backoff.failures(), 2);
        assert_eq!(backoff.remaining(start), Duration::from_millis(100));

        backoff.reset();
        assert!(backoff.ready(start));
        assert_eq!(backoff.failures(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_then_backs_off() {
        // Port 1 is never a Redis server
        let connector = RedisConnector::new(&RedisConfig {
            url: "redis://127.0.0.1:1".to_string(),
            command_timeout_ms: 200,
            reconnect_step_ms: 60_000,
            reconnect_max_delay_ms: 60_000,
        })
        .unwrap();

        let first = connector.connection().await;
        assert!(first.is_err());

        match connector.connection().await {
            Err(AppError::BackendUnavailable(msg)) => assert!(msg.contains("reconnect pending")),
            Err(other) => panic!("Expected backoff error, got {}", other),
            Ok(_) => panic!("Expected backoff error, got a connection"),
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_do_not_wait_on_connect() {
        // Non-routable address: the connect attempt runs until the timeout
        let connector = RedisConnector::new(&RedisConfig {
            url: "redis://10.255.255.1:6379".to_string(),
            command_timeout_ms: 300,
            reconnect_step_ms: 60_000,
            reconnect_max_delay_ms: 60_000,
        })
        .unwrap();

        let (first, second) = tokio::join!(connector.connection(), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let started = Instant::now();
            let result = connector.connection().await;
            (result, started.elapsed())
        });

        assert!(first.is_err());
        let (second, waited) = second;
        // "in progress" while the first attempt runs, "reconnect pending" if
        // the route was rejected outright
        match second {
            Err(AppError::BackendUnavailable(_)) => {}
            Err(other) => panic!("Expected fast failure, got {}", other),
            Ok(_) => panic!("Expected fast failure, got a connection"),
        }
        assert!(waited < Duration::from_millis(100));

        // The in-flight flag is released and the failure is paced
        assert!(matches!(
            connector.connection().await,
            Err(AppError::BackendUnavailable(msg)) if msg.contains("reconnect pending")
        ));
    }

    #[test]
    fn test_connection_errors_are_classified() {
        let refused = redis::RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(is_connection_error(&AppError::Redis(refused)));
        assert!(is_connection_error(&AppError::BackendTimeout(500)));

        let wrong_type = redis::RedisError::from((redis::ErrorKind::TypeError, "bad reply"));
        assert!(!is_connection_error(&AppError::Redis(wrong_type)));
        assert!(!is_connection_error(&AppError::Internal("x".to_string())));
    }

    #[test]
    fn test_report_failure_without_connection_is_noop() {
        let connector = RedisConnector::new(&RedisConfig {
            url: "redis://127.0.0.1:1".to_string(),
            command_timeout_ms: 200,
            reconnect_step_ms: 50,
            reconnect_max_delay_ms: 2000,
        })
        .unwrap();

        connector.report_failure(&AppError::BackendTimeout(200));
        assert!(!connector.is_connected());
        assert_eq!(lock(&connector.state).backoff.failures(), 0);
    }

    // Note: These tests require a running Redis instance
    #[tokio::test]
    #[ignore]
    async fn test_dropped_connection_reconnects_through_backoff() {
        let connector = RedisConnector::new(&RedisConfig {
            url: "redis://localhost:6379".to_string(),
            command_timeout_ms: 500,
            reconnect_step_ms: 60_000,
            reconnect_max_delay_ms: 60_000,
        })
        .unwrap();

        assert!(connector.connection().await.is_ok());
        assert!(connector.is_connected());

        connector.report_failure(&AppError::BackendTimeout(500));
        assert!(!connector.is_connected());
        assert!(matches!(
            connector.connection().await,
            Err(AppError::BackendUnavailable(msg)) if msg.contains("reconnect pending")
        ));
    }

    #[tokio::test]
    #[ignore]
    async fn test_health_check() {
        let connector = RedisConnector::new(&RedisConfig {
            url: "redis://localhost:6379".to_string(),
            command_timeout_ms: 500,
            reconnect_step_ms: 50,
            reconnect_max_delay_ms: 2000,
        })
        .unwrap();

        assert!(connector.health_check().await.is_ok());
    }
}

use crate::errors::{AppError, Result};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    /// Absent section selects the in-process store.
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    pub rate_limit: RateLimitConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    #[serde(default = "default_reconnect_step_ms")]
    pub reconnect_step_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
}

fn default_command_timeout_ms() -> u64 {
    500
}

fn default_reconnect_step_ms() -> u64 {
    50
}

fn default_reconnect_max_delay_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub window_ms: i64,
    pub max_attempts: u32,
    pub block_ms: i64,
    pub key_prefix: String,
    /// Overrides the computed `window + block + margin` expiry.
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
    /// `{minutes}` is replaced with the remaining lockout time.
    pub lockout_message: String,
    pub alert_after_failures: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
    pub metrics_enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: 5 * 60 * 1000,
            max_attempts: 10,
            block_ms: 15 * 60 * 1000,
            key_prefix: "rate:".to_string(),
            ttl_seconds: None,
            lockout_message:
                "Trop de tentatives de connexion. Veuillez réessayer dans {minutes} minute(s)."
                    .to_string(),
            alert_after_failures: 5,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
        }
    }
}

impl Config {
    /// Load configuration from built-in defaults, optional files and environment variables
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let environment =
            env::var("LOGIN_SHIELD_ENV").unwrap_or_else(|_| "development".to_string());

        let limits = RateLimitConfig::default();
        let observability = ObservabilityConfig::default();

        let config = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("rate_limit.window_ms", limits.window_ms)?
            .set_default("rate_limit.max_attempts", limits.max_attempts)?
            .set_default("rate_limit.block_ms", limits.block_ms)?
            .set_default("rate_limit.key_prefix", limits.key_prefix)?
            .set_default("rate_limit.lockout_message", limits.lockout_message)?
            .set_default("rate_limit.alert_after_failures", limits.alert_after_failures)?
            .set_default("observability.log_level", observability.log_level)?
            .set_default("observability.log_format", observability.log_format)?
            .set_default("observability.metrics_enabled", observability.metrics_enabled)?
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(
                config::File::with_name(&format!("config/{}", environment)).required(false),
            )
            // e.g., LOGIN_SHIELD__REDIS__URL=redis://127.0.0.1:6379
            .add_source(
                config::Environment::with_prefix("LOGIN_SHIELD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(AppError::Configuration("Invalid port number".to_string()));
        }

        if let Some(redis) = &self.redis {
            if redis.url.is_empty() {
                return Err(AppError::Configuration(
                    "Redis URL must not be empty when the redis section is present".to_string(),
                ));
            }
            if redis.command_timeout_ms == 0 {
                return Err(AppError::Configuration(
                    "Redis command timeout must be positive".to_string(),
                ));
            }
            if redis.reconnect_step_ms > redis.reconnect_max_delay_ms {
                return Err(AppError::Configuration(
                    "Redis reconnect step cannot exceed the maximum reconnect delay".to_string(),
                ));
            }
        }

        self.rate_limit.validate()?;

        match self.observability.log_format.as_str() {
            "json" | "pretty" => Ok(()),
            other => Err(AppError::Configuration(format!(
                "Unknown log format: {}",
                other
            ))),
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window_ms <= 0 {
            return Err(AppError::Configuration(
                "Rate limit window must be positive".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(AppError::Configuration(
                "Max attempts per window must be positive".to_string(),
            ));
        }
        if self.block_ms <= 0 {
            return Err(AppError::Configuration(
                "Block duration must be positive".to_string(),
            ));
        }
        if self.key_prefix.is_empty() {
            return Err(AppError::Configuration(
                "Rate limit key prefix must not be empty".to_string(),
            ));
        }
        if self.ttl_seconds == Some(0) {
            return Err(AppError::Configuration(
                "Rate limit TTL override must be positive".to_string(),
            ));
        }
        if self.alert_after_failures == 0 {
            return Err(AppError::Configuration(
                "Alert threshold must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

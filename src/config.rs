use crate::services::fees::FeeConfig;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_RATE_LIMIT_NAMESPACE: &str = "fundraiser:rl";
const DEFAULT_CASHOUT_RATE_LIMIT_REQUESTS: u32 = 5;
const DEFAULT_CASHOUT_RATE_LIMIT_WINDOW_SECS: u64 = 3600;
const DEFAULT_PENDING_MAX_AGE_SECS: u64 = 48 * 3600;
const DEFAULT_PENDING_SWEEP_INTERVAL_SECS: u64 = 900;
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Redis connection URL (only used when `rate_limit_use_redis` is set)
    pub redis_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Currency assumed when a checkout does not name one
    #[serde(default = "default_currency")]
    #[validate(custom = "validate_currency_code")]
    pub default_currency: String,

    /// Pending transactions older than this are failed by the sweep
    #[serde(default = "default_pending_max_age_secs")]
    #[validate(range(min = 60))]
    pub pending_max_age_secs: u64,

    /// Interval between stale-pending sweeps; 0 disables the background task
    #[serde(default = "default_pending_sweep_interval_secs")]
    pub pending_sweep_interval_secs: u64,

    /// Cash-out requests allowed per client per window
    #[serde(default = "default_cashout_rate_limit_requests")]
    #[validate(range(min = 1))]
    pub cashout_rate_limit_requests: u32,

    /// Cash-out rate limit window (seconds)
    #[serde(default = "default_cashout_rate_limit_window_secs")]
    #[validate(range(min = 1))]
    pub cashout_rate_limit_window_secs: u64,

    /// Enable Redis-backed rate limiter
    #[serde(default)]
    pub rate_limit_use_redis: bool,

    /// Namespace for rate limiter keys when Redis is enabled
    #[serde(default = "default_rate_limit_namespace")]
    pub rate_limit_namespace: String,

    /// Stripe endpoint signing secret (`whsec_...`)
    #[serde(default)]
    pub stripe_webhook_secret: Option<String>,

    /// PayPal webhook signing secret
    #[serde(default)]
    pub paypal_webhook_secret: Option<String>,

    /// PayPal webhook id, part of the signed transmission string
    #[serde(default)]
    pub paypal_webhook_id: Option<String>,

    /// Card gateway shared secret
    #[serde(default)]
    pub card_gateway_webhook_secret: Option<String>,

    /// Webhook timestamp tolerance (seconds)
    #[serde(default = "default_webhook_tolerance_secs")]
    pub webhook_tolerance_secs: u64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,

    /// Platform and processor fee rates
    #[serde(default)]
    pub fees: FeeConfig,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the essentials.
    pub fn new(
        database_url: String,
        redis_url: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            redis_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            default_currency: default_currency(),
            pending_max_age_secs: default_pending_max_age_secs(),
            pending_sweep_interval_secs: default_pending_sweep_interval_secs(),
            cashout_rate_limit_requests: default_cashout_rate_limit_requests(),
            cashout_rate_limit_window_secs: default_cashout_rate_limit_window_secs(),
            rate_limit_use_redis: false,
            rate_limit_namespace: default_rate_limit_namespace(),
            stripe_webhook_secret: None,
            paypal_webhook_secret: None,
            paypal_webhook_id: None,
            card_gateway_webhook_secret: None,
            webhook_tolerance_secs: default_webhook_tolerance_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            fees: FeeConfig::default(),
        }
    }

    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Gets Redis URL reference
    pub fn redis_url(&self) -> &str {
        &self.redis_url
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn pending_max_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.pending_max_age_secs as i64)
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(fee_error) = self.fees.validate_rates() {
            let mut err = ValidationError::new("fees");
            err.message = Some(fee_error.to_string().into());
            errors.add("fees", err);
        }

        if self.is_production() {
            let configured = [
                self.stripe_webhook_secret.as_deref(),
                self.paypal_webhook_secret.as_deref(),
                self.card_gateway_webhook_secret.as_deref(),
            ];
            if configured
                .iter()
                .all(|secret| secret.map(str::trim).unwrap_or_default().is_empty())
            {
                let mut err = ValidationError::new("webhook_secrets_required");
                err.message = Some(
                    "At least one processor webhook secret must be set in production".into(),
                );
                errors.add("stripe_webhook_secret", err);
            }
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),
    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    16
}

fn default_db_min_connections() -> u32 {
    2
}

fn default_db_connect_timeout_secs() -> u64 {
    30
}

fn default_db_idle_timeout_secs() -> u64 {
    600
}

fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_pending_max_age_secs() -> u64 {
    DEFAULT_PENDING_MAX_AGE_SECS
}

fn default_pending_sweep_interval_secs() -> u64 {
    DEFAULT_PENDING_SWEEP_INTERVAL_SECS
}

fn default_cashout_rate_limit_requests() -> u32 {
    DEFAULT_CASHOUT_RATE_LIMIT_REQUESTS
}

fn default_cashout_rate_limit_window_secs() -> u64 {
    DEFAULT_CASHOUT_RATE_LIMIT_WINDOW_SECS
}

fn default_rate_limit_namespace() -> String {
    DEFAULT_RATE_LIMIT_NAMESPACE.to_string()
}

fn default_webhook_tolerance_secs() -> u64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}

fn default_event_channel_capacity() -> usize {
    1024
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_currency_code(code: &str) -> Result<(), ValidationError> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("currency");
        err.message = Some("Must be a three-letter ISO 4217 code".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("fundraiser_ledger={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());

    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://fundraiser.db?mode=rwc")?
        .set_default("redis_url", "redis://localhost:6379")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

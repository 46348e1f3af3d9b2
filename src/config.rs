use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_CURRENCY: &str = "INR";
const DEFAULT_SHOP_NAME: &str = "Dangly Dreams";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_WIDGET_WAIT_SECS: u64 = 300;
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;
const CONFIG_DIR: &str = "config";

/// Application configuration
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Base URL of the storefront backend
    #[validate(url)]
    pub backend_url: String,

    /// ISO 4217 currency code used for gateway orders
    #[serde(default = "default_currency")]
    #[validate(length(min = 3, max = 3))]
    pub currency: String,

    /// Shop name shown in the hosted payment widget
    #[serde(default = "default_shop_name")]
    #[validate(length(min = 1))]
    pub shop_name: String,

    /// Timeout for a single backend request in seconds
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1, max = 600))]
    pub request_timeout_secs: u64,

    /// How long to wait for the hosted widget before treating the attempt
    /// as abandoned, in seconds
    #[serde(default = "default_widget_wait_secs")]
    #[validate(custom = "validate_widget_wait")]
    pub widget_wait_secs: u64,

    /// Environment (development, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Whether to use JSON format for logs
    #[serde(default)]
    pub log_json: bool,

    /// Capacity of the checkout event channel
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_shop_name() -> String {
    DEFAULT_SHOP_NAME.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_widget_wait_secs() -> u64 {
    DEFAULT_WIDGET_WAIT_SECS
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ValidationError::new("invalid_log_level")),
    }
}

// validator_derive 0.14 hands Copy-typed fields to custom validators by
// value.
fn validate_widget_wait(secs: u64) -> Result<(), ValidationError> {
    if secs == 0 {
        return Err(ValidationError::new("widget_wait_must_be_positive"));
    }
    Ok(())
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        return Err(ValidationError::new("capacity_must_be_positive"));
    }
    Ok(())
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the backend
    /// URL. Useful for tests and embedded use.
    pub fn new(backend_url: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into(),
            currency: default_currency(),
            shop_name: default_shop_name(),
            request_timeout_secs: default_request_timeout_secs(),
            widget_wait_secs: default_widget_wait_secs(),
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    pub fn backend_url(&self) -> &str {
        &self.backend_url
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn widget_wait(&self) -> Duration {
        Duration::from_secs(self.widget_wait_secs)
    }
}

/// Error type for configuration loading
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading error: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation error: {0}")]
    Validation(#[from] ValidationErrors),
}

/// Loads the application configuration from files and environment.
///
/// Sources, later ones overriding earlier: built-in defaults, then
/// `config/default`, then `config/{environment}`, then `APP__`-prefixed
/// environment variables. The files are optional.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let environment = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());

    info!("Loading configuration for environment: {}", environment);

    let config = Config::builder()
        .set_default("backend_url", "http://localhost:5000")?
        .set_default("currency", DEFAULT_CURRENCY)?
        .set_default("shop_name", DEFAULT_SHOP_NAME)?
        .set_default("request_timeout_secs", DEFAULT_REQUEST_TIMEOUT_SECS as i64)?
        .set_default("widget_wait_secs", DEFAULT_WIDGET_WAIT_SECS as i64)?
        .set_default("environment", environment.clone())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default(
            "event_channel_capacity",
            DEFAULT_EVENT_CHANNEL_CAPACITY as i64,
        )?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, environment)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    if let Err(validation_errors) = app_config.validate() {
        error!("Configuration validation failed: {}", validation_errors);
        return Err(AppConfigError::Validation(validation_errors));
    }

    info!(
        "Configuration loaded: backend={}, environment={}",
        app_config.backend_url, app_config.environment
    );

    Ok(app_config)
}

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` overrides the configured level when set. With `json` enabled
/// the output is one JSON object per line.
pub fn init_tracing(level: &str, json: bool) {
    let directive = format!("storefront_checkout={level}");
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(directive));

    if json {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }
}

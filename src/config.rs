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
const DEFAULT_ORDER_NUMBER_FLOOR: i32 = 4758;
const DEFAULT_ORDER_NUMBER_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_RETURN_WINDOW_DAYS: i64 = 30;
const DEFAULT_PAYMENT_API_URL: &str = "https://www.paytr.com/odeme/api/get-token";
const DEV_DEFAULT_JWT_SECRET: &str =
    "this_is_a_development_secret_key_that_is_at_least_64_characters_long_for_testing";

/// Hosted payment provider credentials and redirect settings
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PaymentConfig {
    #[serde(default)]
    pub merchant_id: String,

    /// Key for the keyed hash on token requests and callbacks
    #[serde(default)]
    pub merchant_key: String,

    #[serde(default)]
    pub merchant_salt: String,

    #[serde(default = "default_payment_api_url")]
    pub api_url: String,

    /// Where the provider sends the shopper after a successful payment
    #[serde(default)]
    pub ok_url: String,

    #[serde(default)]
    pub fail_url: String,

    #[serde(default = "default_true_bool")]
    pub test_mode: bool,

    #[serde(default)]
    pub debug_on: bool,

    /// Minutes the hosted page stays valid
    #[serde(default = "default_timeout_limit_minutes")]
    #[validate(range(min = 1, max = 1440))]
    pub timeout_limit_minutes: u32,

    #[serde(default = "default_payment_currency")]
    pub currency: String,

    #[serde(default = "default_payment_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            merchant_id: String::new(),
            merchant_key: String::new(),
            merchant_salt: String::new(),
            api_url: default_payment_api_url(),
            ok_url: String::new(),
            fail_url: String::new(),
            test_mode: true,
            debug_on: false,
            timeout_limit_minutes: default_timeout_limit_minutes(),
            currency: default_payment_currency(),
            request_timeout_secs: default_payment_request_timeout_secs(),
        }
    }
}

impl PaymentConfig {
    pub fn is_configured(&self) -> bool {
        !self.merchant_id.is_empty()
            && !self.merchant_key.is_empty()
            && !self.merchant_salt.is_empty()
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// JWT secret key used to verify bearer tokens
    #[validate(length(min = 32))]
    pub jwt_secret: String,

    /// JWT issuer name
    #[serde(default = "default_auth_issuer")]
    pub auth_issuer: String,

    /// JWT audience
    #[serde(default = "default_auth_audience")]
    pub auth_audience: String,

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

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,

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

    /// Per-request timeout applied at the HTTP layer (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Maximum notification jobs delivered concurrently after a commit
    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,

    /// Lowest order number ever handed out
    #[serde(default = "default_order_number_floor")]
    #[validate(range(min = 1))]
    pub order_number_floor: i32,

    /// Attempts at allocate + insert before giving up on a colliding order number
    #[serde(default = "default_order_number_max_attempts")]
    #[validate(range(min = 1, max = 20))]
    pub order_number_max_attempts: u32,

    /// Days after delivery during which a return may be requested
    #[serde(default = "default_return_window_days")]
    #[validate(range(min = 0))]
    pub return_window_days: i64,

    /// Hosted payment provider
    #[serde(default)]
    #[validate]
    pub payment: PaymentConfig,
}

impl AppConfig {
    /// Creates a new configuration
    pub fn new(
        database_url: String,
        jwt_secret: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            jwt_secret,
            auth_issuer: default_auth_issuer(),
            auth_audience: default_auth_audience(),
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            order_number_floor: DEFAULT_ORDER_NUMBER_FLOOR,
            order_number_max_attempts: DEFAULT_ORDER_NUMBER_MAX_ATTEMPTS,
            return_window_days: DEFAULT_RETURN_WINDOW_DAYS,
            payment: PaymentConfig::default(),
        }
    }

    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Returns true if explicit CORS origins are configured
    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if !self.is_development() && self.jwt_secret.trim() == DEV_DEFAULT_JWT_SECRET {
            let mut err = ValidationError::new("jwt_secret_default_dev");
            err.message = Some(
                "The bundled development JWT secret must not be used outside development. Set APP__JWT_SECRET to a unique, secure value."
                    .into(),
            );
            errors.add("jwt_secret", err);
        }

        if self.is_production() && !self.payment.is_configured() {
            let mut err = ValidationError::new("payment_credentials_required");
            err.message = Some(
                "Set APP__PAYMENT__MERCHANT_ID, APP__PAYMENT__MERCHANT_KEY and APP__PAYMENT__MERCHANT_SALT in production".into(),
            );
            errors.add("payment", err);
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

fn default_true_bool() -> bool {
    true
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

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    16
}

fn default_order_number_floor() -> i32 {
    DEFAULT_ORDER_NUMBER_FLOOR
}

fn default_order_number_max_attempts() -> u32 {
    DEFAULT_ORDER_NUMBER_MAX_ATTEMPTS
}

fn default_return_window_days() -> i64 {
    DEFAULT_RETURN_WINDOW_DAYS
}

fn default_payment_api_url() -> String {
    DEFAULT_PAYMENT_API_URL.to_string()
}

fn default_timeout_limit_minutes() -> u32 {
    30
}

fn default_payment_currency() -> String {
    "TL".to_string()
}

fn default_payment_request_timeout_secs() -> u64 {
    15
}

fn default_auth_issuer() -> String {
    "storefront-auth".to_string()
}

fn default_auth_audience() -> String {
    "storefront-api".to_string()
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

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("storefront_api={},tower_http=debug", level);
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
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET to the secret shared with the token issuer.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured. Set APP__JWT_SECRET environment variable."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "super_secure_jwt_secret_that_is_long_enough_123".into(),
            "127.0.0.1".into(),
            8080,
            "production".into(),
        )
    }

    #[test]
    fn defaults_match_order_and_return_policy() {
        let cfg = base_config();
        assert_eq!(cfg.order_number_floor, 4758);
        assert_eq!(cfg.order_number_max_attempts, 5);
        assert_eq!(cfg.return_window_days, 30);
        assert_eq!(cfg.payment.currency, "TL");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn non_dev_requires_cors_origins_and_payment_credentials() {
        let cfg = base_config();
        let errors = cfg.validate_additional_constraints().unwrap_err();
        let fields = errors.errors();
        assert!(fields.contains_key("cors_allowed_origins"));
        assert!(fields.contains_key("payment"));
    }

    #[test]
    fn production_with_origins_and_credentials_passes() {
        let mut cfg = base_config();
        cfg.cors_allowed_origins = Some("https://shop.example.com".into());
        cfg.payment.merchant_id = "123456".into();
        cfg.payment.merchant_key = "key".into();
        cfg.payment.merchant_salt = "salt".into();
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn development_allows_permissive_by_default() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut cfg = base_config();
        cfg.log_level = "verbose".into();
        assert!(cfg.validate().is_err());
    }
}

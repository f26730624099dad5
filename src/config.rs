use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use validator::{Validate, ValidationError};

use crate::entities::order::PaymentMethod;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "usd";
const DEFAULT_SHIPPING_FLAT_RATE: f64 = 10.0;
const DEFAULT_TAX_RATE: f64 = 0.08;
const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Application configuration with validation.
///
/// Loaded once at startup and handed to `AppState`; there is no implicit
/// module-level configuration anywhere else in the crate.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Redis connection URL (webhook replay deduplication)
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

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// ISO 4217 currency code used for orders and payment intents
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Flat shipping fee applied when the caller does not override it
    #[serde(default = "default_shipping_flat_rate")]
    pub shipping_flat_rate: f64,

    /// Default tax rate (as decimal, e.g. 0.08 for 8%)
    #[serde(default = "default_tax_rate")]
    #[validate(custom = "validate_tax_rate")]
    pub default_tax_rate: f64,

    /// Card provider secret key; card payments are unavailable without it
    #[serde(default)]
    pub stripe_secret_key: Option<String>,

    /// Card provider API base URL
    #[serde(default = "default_stripe_api_base")]
    pub stripe_api_base: String,

    /// Webhook secret for verifying card provider callbacks
    #[serde(default)]
    pub payment_webhook_secret: Option<String>,

    /// Webhook timestamp tolerance (seconds)
    #[serde(default = "default_webhook_tolerance_secs")]
    pub payment_webhook_tolerance_secs: u64,

    /// Mobile-money gateway verification endpoints and credentials.
    /// A method with no configured gateway degrades to manual verification.
    #[serde(default)]
    pub bkash_base_url: Option<String>,
    #[serde(default)]
    pub bkash_app_key: Option<String>,
    #[serde(default)]
    pub nagad_base_url: Option<String>,
    #[serde(default)]
    pub nagad_app_key: Option<String>,
    #[serde(default)]
    pub rocket_base_url: Option<String>,
    #[serde(default)]
    pub rocket_app_key: Option<String>,

    /// Outbound email delivery (HTTP provider); disabled when unset
    #[serde(default)]
    pub email_api_url: Option<String>,
    #[serde(default)]
    pub email_api_key: Option<String>,
    #[serde(default = "default_email_from")]
    pub email_from: String,

    /// Outbound SMS delivery (HTTP provider); disabled when unset
    #[serde(default)]
    pub sms_api_url: Option<String>,
    #[serde(default)]
    pub sms_api_key: Option<String>,
    #[serde(default)]
    pub sms_from: Option<String>,
}

/// Credentials for one mobile-money gateway verification API.
#[derive(Clone, Debug)]
pub struct MobileGatewayConfig {
    pub base_url: String,
    pub app_key: String,
}

impl AppConfig {
    /// Minimal constructor used by tests and tooling.
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
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            currency: default_currency(),
            shipping_flat_rate: default_shipping_flat_rate(),
            default_tax_rate: default_tax_rate(),
            stripe_secret_key: None,
            stripe_api_base: default_stripe_api_base(),
            payment_webhook_secret: None,
            payment_webhook_tolerance_secs: default_webhook_tolerance_secs(),
            bkash_base_url: None,
            bkash_app_key: None,
            nagad_base_url: None,
            nagad_app_key: None,
            rocket_base_url: None,
            rocket_app_key: None,
            email_api_url: None,
            email_api_key: None,
            email_from: default_email_from(),
            sms_api_url: None,
            sms_api_key: None,
            sms_from: None,
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self.environment.as_str(), "development" | "dev" | "test")
    }

    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Gateway credentials for a mobile-money method, if configured.
    /// Returns `None` for non-mobile methods and for unconfigured gateways.
    pub fn mobile_gateway(&self, method: PaymentMethod) -> Option<MobileGatewayConfig> {
        let (base_url, app_key) = match method {
            PaymentMethod::Bkash => (&self.bkash_base_url, &self.bkash_app_key),
            PaymentMethod::Nagad => (&self.nagad_base_url, &self.nagad_app_key),
            PaymentMethod::Rocket => (&self.rocket_base_url, &self.rocket_app_key),
            _ => return None,
        };
        match (base_url, app_key) {
            (Some(base_url), Some(app_key)) => Some(MobileGatewayConfig {
                base_url: base_url.clone(),
                app_key: app_key.clone(),
            }),
            _ => None,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
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
fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}
fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}
fn default_shipping_flat_rate() -> f64 {
    DEFAULT_SHIPPING_FLAT_RATE
}
fn default_tax_rate() -> f64 {
    DEFAULT_TAX_RATE
}
fn default_stripe_api_base() -> String {
    DEFAULT_STRIPE_API_BASE.to_string()
}
fn default_webhook_tolerance_secs() -> u64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}
fn default_email_from() -> String {
    "orders@storefront.example".to_string()
}

fn validate_tax_rate(rate: f64) -> Result<(), ValidationError> {
    if !rate.is_finite() || !(0.0..=1.0).contains(&rate) {
        let mut err = ValidationError::new("default_tax_rate");
        err.message = Some("default_tax_rate must be a finite value between 0.0 and 1.0".into());
        return Err(err);
    }
    Ok(())
}

/// Loads configuration from `config/{default,<env>}.toml` (when present)
/// layered under `APP__*` environment variables.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

    let mut builder = Config::builder();
    let default_file = Path::new(CONFIG_DIR).join("default.toml");
    if default_file.exists() {
        builder = builder.add_source(File::from(default_file));
    }
    let env_file = Path::new(CONFIG_DIR).join(format!("{environment}.toml"));
    if env_file.exists() {
        builder = builder.add_source(File::from(env_file));
    }

    let cfg: AppConfig = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .set_default("environment", environment)?
        .build()?
        .try_deserialize()?;

    cfg.validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {e}")))?;

    Ok(cfg)
}

/// Initializes the global tracing subscriber.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("storefront_api={level},tower_http=debug");
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);
    let filter = EnvFilter::try_new(filter_directive).unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "redis://127.0.0.1:6379".into(),
            "127.0.0.1".into(),
            18080,
            "test".into(),
        )
    }

    #[test]
    fn development_environments_allow_permissive_cors() {
        let cfg = test_config();
        assert!(cfg.is_development());
        assert!(cfg.should_allow_permissive_cors());
    }

    #[test]
    fn mobile_gateway_requires_both_url_and_key() {
        let mut cfg = test_config();
        assert!(cfg.mobile_gateway(PaymentMethod::Bkash).is_none());

        cfg.bkash_base_url = Some("https://gateway.example/bkash".into());
        assert!(cfg.mobile_gateway(PaymentMethod::Bkash).is_none());

        cfg.bkash_app_key = Some("key".into());
        let gw = cfg.mobile_gateway(PaymentMethod::Bkash).unwrap();
        assert_eq!(gw.base_url, "https://gateway.example/bkash");

        // Card never resolves to a mobile gateway
        assert!(cfg.mobile_gateway(PaymentMethod::Card).is_none());
    }

    #[test]
    fn tax_rate_validation_bounds() {
        assert!(validate_tax_rate(0.08).is_ok());
        assert!(validate_tax_rate(0.0).is_ok());
        assert!(validate_tax_rate(1.5).is_err());
        assert!(validate_tax_rate(-0.1).is_err());
    }
}

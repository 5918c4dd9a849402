//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `APP_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `APP_URL` - Public URL of the app, used for webhook callback addresses
//! - `SHOPIFY_API_KEY` - Shopify app API key
//! - `SHOPIFY_API_SECRET` - Shopify app API secret (webhook HMAC key, HIGH PRIVILEGE)
//! - `SMTP_HOST` - SMTP server hostname
//! - `SMTP_USER` - SMTP authentication username
//! - `SMTP_PASS` - SMTP authentication password
//! - `SMTP_FROM_EMAIL` - Email sender address
//!
//! ## Optional
//! - `APP_HOST` - Bind address (default: 127.0.0.1)
//! - `APP_PORT` - Listen port (default: 3000)
//! - `SHOPIFY_API_VERSION` - Admin API version (default: 2025-07)
//! - `SHOPIFY_USE_PII` - Register `ORDERS_FULFILLED` instead of `fulfillments/create` (default: false)
//! - `SMTP_PORT` - SMTP port (default: 587)
//! - `SMTP_FROM_NAME` - Sender display name (default: "Your Store")
//! - `SWEEP_ENABLED` - Run the daily review-request sweep in this process (default: true)
//! - `SWEEP_HOUR` / `SWEEP_MINUTE` - UTC time of the daily sweep (default: 01:00)
//! - `SWEEP_ITEM_TIMEOUT_SECS` - Upper bound for one item's render and send (default: 60)
//! - `SWEEP_LEASE_SECS` - How long a sweep holds its claim on an item (default: 900)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_API_VERSION: &str = "2025-07";
const DEFAULT_FROM_NAME: &str = "Your Store";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL of the app (no trailing slash)
    pub app_url: String,
    /// Shopify app configuration
    pub shopify: ShopifyAppConfig,
    /// SMTP configuration
    pub email: EmailConfig,
    /// Daily sweep configuration
    pub sweep: SweepConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "staging", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// Shopify app credentials and API settings.
///
/// Implements `Debug` manually to redact the API secret.
#[derive(Clone)]
pub struct ShopifyAppConfig {
    /// App API key (client ID)
    pub api_key: String,
    /// App API secret; also the HMAC key for webhook signatures
    pub api_secret: SecretString,
    /// Admin API version (e.g., 2025-07)
    pub api_version: String,
    /// Whether the app is approved for protected customer data
    pub use_pii: bool,
}

impl std::fmt::Debug for ShopifyAppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopifyAppConfig")
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("api_version", &self.api_version)
            .field("use_pii", &self.use_pii)
            .finish()
    }
}

/// Email (SMTP) configuration.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct EmailConfig {
    /// SMTP server hostname
    pub smtp_host: String,
    /// SMTP server port
    pub smtp_port: u16,
    /// SMTP authentication username
    pub smtp_username: String,
    /// SMTP authentication password
    pub smtp_password: SecretString,
    /// Sender display name
    pub from_name: String,
    /// Email sender address (From header)
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_name", &self.from_name)
            .field("from_address", &self.from_address)
            .finish()
    }
}

/// Daily review-request sweep settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepConfig {
    /// Whether this process runs the scheduler at all
    pub enabled: bool,
    /// UTC hour of the daily run (0-23)
    pub hour: u32,
    /// UTC minute of the daily run (0-59)
    pub minute: u32,
    /// Upper bound for rendering and sending one item
    pub item_timeout: Duration,
    /// How long a claimed item stays reserved for this instance
    pub lease: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hour: 1,
            minute: 0,
            item_timeout: Duration::from_secs(60),
            lease: Duration::from_secs(900),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("APP_DATABASE_URL")?;
        let host = get_env_or_default("APP_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("APP_HOST".to_string(), e.to_string()))?;
        let port = get_parsed_or_default("APP_PORT", 3000_u16)?;
        let app_url = parse_app_url(&get_required_env("APP_URL")?)?;

        let shopify = ShopifyAppConfig::from_env()?;
        let email = EmailConfig::from_env()?;
        let sweep = SweepConfig::from_env()?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);

        Ok(Self {
            database_url,
            host,
            port,
            app_url,
            shopify,
            email,
            sweep,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Callback address Shopify delivers fulfillment webhooks to.
    #[must_use]
    pub fn webhook_callback_url(&self) -> String {
        format!("{}{}", self.app_url, crate::routes::WEBHOOK_PATH)
    }
}

impl ShopifyAppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: get_required_env("SHOPIFY_API_KEY")?,
            api_secret: get_validated_secret("SHOPIFY_API_SECRET")?,
            api_version: get_env_or_default("SHOPIFY_API_VERSION", DEFAULT_API_VERSION),
            use_pii: get_bool_or_default("SHOPIFY_USE_PII", false)?,
        })
    }
}

impl EmailConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let smtp_password = get_required_env("SMTP_PASS")?;
        // Relay passwords are often short app passwords; warn rather than refuse
        if let Err(e) = validate_secret_strength(&smtp_password, "SMTP_PASS") {
            tracing::warn!("SMTP_PASS validation warning: {e}");
        }

        Ok(Self {
            smtp_host: get_required_env("SMTP_HOST")?,
            smtp_port: get_parsed_or_default("SMTP_PORT", 587_u16)?,
            smtp_username: get_required_env("SMTP_USER")?,
            smtp_password: SecretString::from(smtp_password),
            from_name: get_env_or_default("SMTP_FROM_NAME", DEFAULT_FROM_NAME),
            from_address: get_required_env("SMTP_FROM_EMAIL")?,
        })
    }
}

impl SweepConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let hour = get_parsed_or_default("SWEEP_HOUR", defaults.hour)?;
        if hour > 23 {
            return Err(ConfigError::InvalidEnvVar(
                "SWEEP_HOUR".to_string(),
                format!("must be 0-23 (got {hour})"),
            ));
        }
        let minute = get_parsed_or_default("SWEEP_MINUTE", defaults.minute)?;
        if minute > 59 {
            return Err(ConfigError::InvalidEnvVar(
                "SWEEP_MINUTE".to_string(),
                format!("must be 0-59 (got {minute})"),
            ));
        }

        let item_timeout_secs = get_parsed_or_default(
            "SWEEP_ITEM_TIMEOUT_SECS",
            defaults.item_timeout.as_secs(),
        )?;
        let lease_secs = get_parsed_or_default("SWEEP_LEASE_SECS", defaults.lease.as_secs())?;
        if lease_secs <= item_timeout_secs {
            return Err(ConfigError::InvalidEnvVar(
                "SWEEP_LEASE_SECS".to_string(),
                format!(
                    "must exceed SWEEP_ITEM_TIMEOUT_SECS ({lease_secs} <= {item_timeout_secs})"
                ),
            ));
        }

        Ok(Self {
            enabled: get_bool_or_default("SWEEP_ENABLED", defaults.enabled)?,
            hour,
            minute,
            item_timeout: Duration::from_secs(item_timeout_secs),
            lease: Duration::from_secs(lease_secs),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
///
/// # Errors
///
/// Returns `ConfigError::MissingEnvVar` if neither variable is set.
pub fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an optional environment variable, falling back to `default` when unset.
fn get_parsed_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Parse a boolean flag (`true`/`false`/`1`/`0`), falling back to `default` when unset.
fn get_bool_or_default(key: &str, default: bool) -> Result<bool, ConfigError> {
    get_optional_env(key).map_or(Ok(default), |raw| parse_bool(key, &raw))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("expected true or false, got {other:?}"),
        )),
    }
}

/// Validate `APP_URL` and strip any trailing slash.
fn parse_app_url(raw: &str) -> Result<String, ConfigError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidEnvVar("APP_URL".to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            "APP_URL".to_string(),
            format!("unsupported scheme {:?}", url.scheme()),
        ));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

//! API configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - `PostgreSQL` connection string (not needed when `MERKATO_STORE=memory`)
//! - `SESSION_SECRET` - Token signing secret (min 32 chars, high entropy)
//! - `ADMIN_EMAIL` - Operator login email
//! - `ADMIN_PASSWORD` - Operator login password
//! - `FRONTEND_URL` - Public URL of the storefront (verification links, gateway redirects)
//! - `SMTP_HOST`, `SMTP_USERNAME`, `SMTP_PASSWORD` - Outbound mail relay
//! - `EMAIL_FROM` - Sender address for transactional mail
//! - `CLOUDINARY_CLOUD_NAME`, `CLOUDINARY_API_KEY`, `CLOUDINARY_API_SECRET` - Image hosting
//!
//! ## Optional
//! - `MERKATO_HOST` - Bind address (default: 127.0.0.1)
//! - `MERKATO_PORT` - Listen port (default: 4000)
//! - `MERKATO_STORE` - `postgres` (default) or `memory`
//! - `SMTP_PORT` - SMTP port (default: 465)
//! - `CURRENCY` - Charge currency (default: etb)
//! - `DELIVERY_CHARGE` - Flat delivery fee in standard units (default: 50)
//! - `SESSION_TTL_SECS` - Session token lifetime; tokens never expire when unset
//! - `STRIPE_SECRET_KEY` - Enables Stripe checkout
//! - `RAZORPAY_KEY_ID`, `RAZORPAY_KEY_SECRET` - Enable Razorpay orders (both or neither)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag
//! - `LOG_FORMAT` - `pretty` (default) or `json`
//! - `MERKATO_RATE_LIMIT` - Throttle credential endpoints per client IP (default: true)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use merkato_core::Currency;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

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

/// Where records are kept.
#[derive(Debug, Clone)]
pub enum StoreBackend {
    /// `PostgreSQL` at the given URL.
    Postgres(SecretString),
    /// Process-local store, lost on restart.
    Memory,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// API application configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Record store backend
    pub store: StoreBackend,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public storefront URL
    pub frontend_url: String,
    /// Session token settings
    pub session: SessionConfig,
    /// Operator credentials
    pub admin: AdminCredentials,
    /// SMTP settings
    pub email: EmailConfig,
    /// Image hosting settings
    pub cloudinary: CloudinaryConfig,
    /// Payment settings
    pub payments: PaymentsConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
    /// Log output format
    pub log_format: LogFormat,
    /// Throttle login, registration and admin login
    pub rate_limit: bool,
}

/// Session token signing settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub secret: SecretString,
    /// `None` keeps tokens valid until the secret rotates.
    pub ttl: Option<Duration>,
}

/// Static operator login.
#[derive(Debug, Clone)]
pub struct AdminCredentials {
    pub email: String,
    pub password: SecretString,
}

/// SMTP configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: SecretString,
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

/// Cloudinary upload API configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: SecretString,
}

impl std::fmt::Debug for CloudinaryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudinaryConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

/// Payment gateway configuration.
#[derive(Debug, Clone)]
pub struct PaymentsConfig {
    pub currency: Currency,
    /// Flat fee added as its own checkout line
    pub delivery_charge: Decimal,
    pub stripe_secret_key: Option<SecretString>,
    pub razorpay: Option<RazorpayConfig>,
}

/// Razorpay API key pair.
#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: SecretString,
}

impl ApiConfig {
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

        let store = match get_env_or_default("MERKATO_STORE", "postgres").as_str() {
            "postgres" => StoreBackend::Postgres(get_required_secret("DATABASE_URL")?),
            "memory" => StoreBackend::Memory,
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "MERKATO_STORE".to_string(),
                    format!("expected 'postgres' or 'memory', got '{other}'"),
                ));
            }
        };
        let host = parse_env("MERKATO_HOST", "127.0.0.1")?;
        let port = parse_env("MERKATO_PORT", "4000")?;
        let frontend_url = get_required_env("FRONTEND_URL")?
            .trim_end_matches('/')
            .to_string();

        let session = SessionConfig::from_env()?;
        let admin = AdminCredentials {
            email: get_required_env("ADMIN_EMAIL")?,
            password: get_required_secret("ADMIN_PASSWORD")?,
        };
        let email = EmailConfig::from_env()?;
        let cloudinary = CloudinaryConfig::from_env()?;
        let payments = PaymentsConfig::from_env()?;

        let log_format = match get_env_or_default("LOG_FORMAT", "pretty").as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let rate_limit = parse_env("MERKATO_RATE_LIMIT", "true")?;

        Ok(Self {
            store,
            host,
            port,
            frontend_url,
            session,
            admin,
            email,
            cloudinary,
            payments,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            log_format,
            rate_limit,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl SessionConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let secret = get_validated_secret("SESSION_SECRET")?;
        validate_session_secret(&secret, "SESSION_SECRET")?;

        let ttl = get_optional_env("SESSION_TTL_SECS")
            .map(|raw| {
                raw.parse::<u64>().map(Duration::from_secs).map_err(|e| {
                    ConfigError::InvalidEnvVar("SESSION_TTL_SECS".to_string(), e.to_string())
                })
            })
            .transpose()?;

        Ok(Self { secret, ttl })
    }
}

impl EmailConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            smtp_host: get_required_env("SMTP_HOST")?,
            smtp_port: parse_env("SMTP_PORT", "465")?,
            smtp_username: get_required_env("SMTP_USERNAME")?,
            smtp_password: get_required_secret("SMTP_PASSWORD")?,
            from_address: get_required_env("EMAIL_FROM")?,
        })
    }
}

impl CloudinaryConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            cloud_name: get_required_env("CLOUDINARY_CLOUD_NAME")?,
            api_key: get_required_env("CLOUDINARY_API_KEY")?,
            api_secret: get_validated_secret("CLOUDINARY_API_SECRET")?,
        })
    }
}

impl PaymentsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let currency = get_env_or_default("CURRENCY", "etb")
            .parse::<Currency>()
            .map_err(|e| ConfigError::InvalidEnvVar("CURRENCY".to_string(), e))?;
        let delivery_charge: Decimal = parse_env("DELIVERY_CHARGE", "50")?;

        let stripe_secret_key = get_optional_env("STRIPE_SECRET_KEY")
            .map(|key| {
                validate_secret_strength(&key, "STRIPE_SECRET_KEY")?;
                Ok::<_, ConfigError>(SecretString::from(key))
            })
            .transpose()?;

        let razorpay = match (
            get_optional_env("RAZORPAY_KEY_ID"),
            get_optional_env("RAZORPAY_KEY_SECRET"),
        ) {
            (Some(key_id), Some(key_secret)) => {
                validate_secret_strength(&key_secret, "RAZORPAY_KEY_SECRET")?;
                Some(RazorpayConfig {
                    key_id,
                    key_secret: SecretString::from(key_secret),
                })
            }
            (None, None) => None,
            (Some(_), None) => {
                return Err(ConfigError::MissingEnvVar("RAZORPAY_KEY_SECRET".to_string()));
            }
            (None, Some(_)) => {
                return Err(ConfigError::MissingEnvVar("RAZORPAY_KEY_ID".to_string()));
            }
        };

        Ok(Self {
            currency,
            delivery_charge,
            stripe_secret_key,
            razorpay,
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

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get an optional environment variable, treating empty values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to a default.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
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

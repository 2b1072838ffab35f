//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront
//! - `STOREFRONT_SESSION_SECRET` - Session signing secret (min 32 chars, high entropy)
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STOREFRONT_SESSION_DAYS` - Days of inactivity before a session (and its guest cart) expires (default: 30)
//! - `CART_TAX_RATE` - VAT rate as a fraction (default: 0.18)
//! - `CART_SHIPPING_FEE` - Flat shipping fee below the threshold (default: 50.00)
//! - `CART_FREE_SHIPPING_THRESHOLD` - Subtotal at which shipping is free (default: 500.00)
//! - `CART_CURRENCY` - Currency for new carts and catalog prices (default: TRY)
//! - `CART_DISCOUNT_CODES` - `CODE=rate` or `CODE=fixed:amount` list (default: `WELCOME10=0.10,FORD20=0.20,YEDEK15=0.15`)
//! - `CART_MERGE_STRATEGY` - `sum`, `keep_larger` or `prefer_account` (default: sum)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error event sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Transaction sample rate (default: 0.1)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use yedek_core::{CodeTable, CurrencyCode, MergeStrategy, PricingConfig};

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

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Session signing secret
    pub session_secret: SecretString,
    /// Days of inactivity before a session expires
    pub session_days: u32,
    /// Cart pricing, discount and merge settings
    pub cart: CartConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Fraction of error events sent to Sentry
    pub sentry_sample_rate: f32,
    /// Fraction of transactions traced
    pub sentry_traces_sample_rate: f32,
}

/// Cart behaviour settings.
#[derive(Debug, Clone, Default)]
pub struct CartConfig {
    /// Tax, shipping and currency settings
    pub pricing: PricingConfig,
    /// Known discount codes
    pub discounts: CodeTable,
    /// How guest carts fold into account carts at sign-in
    pub merge_strategy: MergeStrategy,
}

impl StorefrontConfig {
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

        let database_url = get_database_url("STOREFRONT_DATABASE_URL")?;
        let host = parse_env_or_default::<IpAddr>("STOREFRONT_HOST", "127.0.0.1")?;
        let port = parse_env_or_default::<u16>("STOREFRONT_PORT", "3000")?;
        let base_url = get_required_env("STOREFRONT_BASE_URL")?;
        let session_secret = get_validated_secret("STOREFRONT_SESSION_SECRET")?;
        validate_session_secret(&session_secret, "STOREFRONT_SESSION_SECRET")?;
        let session_days = parse_env_or_default::<u32>("STOREFRONT_SESSION_DAYS", "30")?;

        let cart = CartConfig::from_env()?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            session_secret,
            session_days,
            cart,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env_or_default::<f32>("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_env_or_default::<f32>(
                "SENTRY_TRACES_SAMPLE_RATE",
                "0.1",
            )?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl CartConfig {
    /// Load cart settings from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` for unparsable or out-of-range values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load cart settings through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` for unparsable or out-of-range values.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let value = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let tax_rate = parse_or(&value, "CART_TAX_RATE", PricingConfig::DEFAULT_TAX_RATE)?;
        let shipping_fee = parse_or(
            &value,
            "CART_SHIPPING_FEE",
            PricingConfig::DEFAULT_SHIPPING_FEE,
        )?;
        let threshold = parse_or(
            &value,
            "CART_FREE_SHIPPING_THRESHOLD",
            PricingConfig::DEFAULT_FREE_SHIPPING_THRESHOLD,
        )?;
        let currency = parse_or(&value, "CART_CURRENCY", CurrencyCode::TRY)?;

        let pricing = PricingConfig::new(tax_rate, shipping_fee, threshold, currency)
            .map_err(|e| {
                invalid(
                    "CART_TAX_RATE, CART_SHIPPING_FEE or CART_FREE_SHIPPING_THRESHOLD",
                    e,
                )
            })?;

        let codes = value("CART_DISCOUNT_CODES");
        let discounts = CodeTable::parse(
            codes.as_deref().unwrap_or(CodeTable::DEFAULT_CODES),
            currency,
        )
        .map_err(|e| invalid("CART_DISCOUNT_CODES", e))?;

        let merge_strategy = parse_or(&value, "CART_MERGE_STRATEGY", MergeStrategy::default())?;

        Ok(Self {
            pricing,
            discounts,
            merge_strategy,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn invalid(key: &str, err: impl ToString) -> ConfigError {
    ConfigError::InvalidEnvVar(key.to_string(), err.to_string())
}

/// Parse an optional variable, falling back to `default` when unset.
fn parse_or<T>(
    value: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    value(key).map_or(Ok(default), |raw| {
        raw.trim().parse::<T>().map_err(|e| invalid(key, e))
    })
}

/// Parse an environment variable with a default value.
fn parse_env_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| invalid(key, e))
}

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
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

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use yedek_core::{DiscountPolicy, DiscountRule};

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-session-key-here", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_session_secret_too_short() {
        let secret = SecretString::from("short");
        assert!(validate_session_secret(&secret, "TEST_SESSION").is_err());
    }

    #[test]
    fn test_cart_config_defaults() {
        let config = CartConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.pricing, PricingConfig::default());
        assert_eq!(config.merge_strategy, MergeStrategy::Sum);
        assert_eq!(config.discounts.len(), 3);
        assert_eq!(
            config.discounts.lookup("YEDEK15"),
            Some(DiscountRule::Percentage(dec("0.15")))
        );
    }

    #[test]
    fn test_cart_config_overrides() {
        let config = CartConfig::from_lookup(lookup(&[
            ("CART_TAX_RATE", "0.20"),
            ("CART_SHIPPING_FEE", "29.99"),
            ("CART_FREE_SHIPPING_THRESHOLD", "1000"),
            ("CART_CURRENCY", "try"),
            ("CART_DISCOUNT_CODES", "BAHAR=fixed:75"),
            ("CART_MERGE_STRATEGY", "keep_larger"),
        ]))
        .unwrap();

        assert_eq!(config.pricing.tax_rate(), dec("0.20"));
        assert_eq!(config.pricing.shipping_fee(), dec("29.99"));
        assert_eq!(config.pricing.free_shipping_threshold(), dec("1000"));
        assert_eq!(config.merge_strategy, MergeStrategy::KeepLarger);
        assert!(config.discounts.lookup("WELCOME10").is_none());
        assert!(matches!(
            config.discounts.lookup("BAHAR"),
            Some(DiscountRule::Fixed(_))
        ));
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let config = CartConfig::from_lookup(lookup(&[("CART_TAX_RATE", "  ")])).unwrap();
        assert_eq!(config.pricing.tax_rate(), dec("0.18"));
    }

    #[test]
    fn test_cart_config_rejects_bad_values() {
        for (key, value) in [
            ("CART_TAX_RATE", "eighteen"),
            ("CART_TAX_RATE", "1.8"),
            ("CART_SHIPPING_FEE", "-5"),
            ("CART_CURRENCY", "DOGE"),
            ("CART_DISCOUNT_CODES", "BROKEN"),
            ("CART_MERGE_STRATEGY", "overwrite"),
        ] {
            let result = CartConfig::from_lookup(lookup(&[(key, value)]));
            assert!(
                matches!(result, Err(ConfigError::InvalidEnvVar(_, _))),
                "{key}={value} should be rejected"
            );
        }
    }

    #[test]
    fn test_socket_addr() {
        let config = StorefrontConfig {
            database_url: SecretString::from("postgres://localhost/test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            session_secret: SecretString::from("x".repeat(32)),
            session_days: 30,
            cart: CartConfig::default(),
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
        };

        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
    }
}

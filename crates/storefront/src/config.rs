//! Storefront client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `MARKETPLACE_API_URL` - Base URL of the marketplace REST API
//!
//! ## Optional
//! - `MARKETPLACE_STATE_DIR` - Directory for the cart and token files (default: `.marketplace`)
//! - `MARKETPLACE_HTTP_TIMEOUT_SECS` - Per-request timeout (default: 30)
//! - `MARKETPLACE_CART_FEEDBACK_MS` - "Added to cart" display time (default: 3000)
//! - `MARKETPLACE_PAYMENT_CALLBACK_URL` - Where the gateway sends the user back
//!   (default: `{MARKETPLACE_API_URL origin}/payment-success`)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront client configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Marketplace API root
    pub api_url: Url,
    /// Local state directory (cart blob, tokens)
    pub state_dir: PathBuf,
    /// HTTP request timeout
    pub http_timeout: Duration,
    /// How long the "added to cart" feedback stays up
    pub cart_feedback: Duration,
    /// Payment gateway return URL
    pub payment_callback_url: Url,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_url = parse_url("MARKETPLACE_API_URL", &get_required_env("MARKETPLACE_API_URL")?)?;

        let state_dir = PathBuf::from(get_env_or_default("MARKETPLACE_STATE_DIR", ".marketplace"));

        let http_timeout = Duration::from_secs(parse_number(
            "MARKETPLACE_HTTP_TIMEOUT_SECS",
            &get_env_or_default("MARKETPLACE_HTTP_TIMEOUT_SECS", "30"),
        )?);

        let cart_feedback = Duration::from_millis(parse_number(
            "MARKETPLACE_CART_FEEDBACK_MS",
            &get_env_or_default("MARKETPLACE_CART_FEEDBACK_MS", "3000"),
        )?);

        let payment_callback_url = match get_optional_env("MARKETPLACE_PAYMENT_CALLBACK_URL") {
            Some(value) => parse_url("MARKETPLACE_PAYMENT_CALLBACK_URL", &value)?,
            None => default_callback_url(&api_url)?,
        };

        let sentry_dsn = get_optional_env("SENTRY_DSN");

        Ok(Self {
            api_url,
            state_dir,
            http_timeout,
            cart_feedback,
            payment_callback_url,
            sentry_dsn,
        })
    }
}

fn default_callback_url(api_url: &Url) -> Result<Url, ConfigError> {
    api_url.join("/payment-success").map_err(|e| {
        ConfigError::InvalidEnvVar("MARKETPLACE_API_URL".to_string(), e.to_string())
    })
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable. Empty counts as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

fn parse_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url)
}

fn parse_number(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

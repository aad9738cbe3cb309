//! Cart sync configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Cart API (required when using [`crate::service::HttpCartService`])
//! - `CART_API_BASE_URL` - Base URL of the food-ordering backend
//! - `CART_API_TOKEN` - Bearer token for the cart endpoints
//!
//! ## Optional
//! - `CART_API_TIMEOUT_SECS` - Per-request timeout (default: 10)
//! - `CART_RETRY_ATTEMPTS` - Attempts per remote call (default: 3)
//! - `CART_RETRY_BACKOFF_MS` - Fixed delay between attempts (default: 500)
//! - `CART_QUEUE_MAX_RETRIES` - Failed drain passes before a queued operation is evicted (default: 3)
//! - `CART_BACKUP_SLOT` - Persistent store slot for the item backup (default: `cart_backup`)
//! - `CART_QUEUE_SLOT` - Persistent store slot for the offline queue (default: `cart_offline_queue`)

use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;
const DEFAULT_QUEUE_MAX_RETRIES: u32 = 3;
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_BACKUP_SLOT: &str = "cart_backup";
const DEFAULT_QUEUE_SLOT: &str = "cart_offline_queue";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Cart store tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartSyncConfig {
    /// Attempts per remote call before the failure is surfaced
    pub retry_attempts: u32,
    /// Delay between attempts
    pub retry_backoff: Duration,
    /// Failed drain passes before a queued operation is evicted
    pub queue_max_retries: u32,
    /// Persistent store slot holding the item backup
    pub backup_slot: String,
    /// Persistent store slot holding the offline queue
    pub queue_slot: String,
}

impl Default for CartSyncConfig {
    fn default() -> Self {
        Self {
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            queue_max_retries: DEFAULT_QUEUE_MAX_RETRIES,
            backup_slot: DEFAULT_BACKUP_SLOT.to_string(),
            queue_slot: DEFAULT_QUEUE_SLOT.to_string(),
        }
    }
}

impl CartSyncConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let retry_attempts = parse_positive_u32(
            "CART_RETRY_ATTEMPTS",
            &get_env_or_default("CART_RETRY_ATTEMPTS", &DEFAULT_RETRY_ATTEMPTS.to_string()),
        )?;
        let retry_backoff_ms = get_env_or_default(
            "CART_RETRY_BACKOFF_MS",
            &DEFAULT_RETRY_BACKOFF_MS.to_string(),
        )
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidEnvVar("CART_RETRY_BACKOFF_MS".to_string(), e.to_string()))?;
        let queue_max_retries = parse_positive_u32(
            "CART_QUEUE_MAX_RETRIES",
            &get_env_or_default("CART_QUEUE_MAX_RETRIES", &DEFAULT_QUEUE_MAX_RETRIES.to_string()),
        )?;

        Ok(Self {
            retry_attempts,
            retry_backoff: Duration::from_millis(retry_backoff_ms),
            queue_max_retries,
            backup_slot: get_env_or_default("CART_BACKUP_SLOT", DEFAULT_BACKUP_SLOT),
            queue_slot: get_env_or_default("CART_QUEUE_SLOT", DEFAULT_QUEUE_SLOT),
        })
    }
}

/// Backend cart API configuration.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct CartApiConfig {
    /// Base URL, always ending in `/`
    pub base_url: Url,
    /// Bearer token
    pub token: SecretString,
    /// Per-request timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for CartApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartApiConfig")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl CartApiConfig {
    /// Load the API configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let base_url = parse_base_url("CART_API_BASE_URL", &get_required_env("CART_API_BASE_URL")?)?;
        let token = SecretString::from(get_required_env("CART_API_TOKEN")?);
        let timeout_secs = get_env_or_default("CART_API_TIMEOUT_SECS", &DEFAULT_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidEnvVar("CART_API_TIMEOUT_SECS".to_string(), e.to_string()))?;

        Ok(Self {
            base_url,
            token,
            timeout: Duration::from_secs(timeout_secs),
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

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse a count that must be at least one.
fn parse_positive_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    let parsed = value
        .parse::<u32>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if parsed == 0 {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be at least 1".to_string(),
        ));
    }
    Ok(parsed)
}

/// Parse a base URL, appending a trailing slash so relative joins keep its path.
fn parse_base_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    let mut url =
        Url::parse(value).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

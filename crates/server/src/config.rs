//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `BAZAAR_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `BAZAAR_BASE_URL` - Public URL of the API (decides secure cookies)
//! - `BAZAAR_SESSION_SECRET` - Session secret (min 32 chars, high entropy)
//!
//! ## Optional
//! - `BAZAAR_HOST` - Bind address (default: 127.0.0.1)
//! - `BAZAAR_PORT` - Listen port (default: 3000)
//! - `BAZAAR_PLATFORM_FEE_BPS` - Platform fee in basis points (default: 500 = 5%)
//! - `BAZAAR_WEBHOOK_SECRET` - Payment webhook signing secret (enables `/api/webhooks/payments`)
//! - `IMAGE_HOST_UPLOAD_URL` / `IMAGE_HOST_API_KEY` - Image host for product uploads
//! - `SMTP_HOST` / `SMTP_PORT` / `SMTP_USERNAME` / `SMTP_PASSWORD` / `SMTP_FROM` - Order emails
//! - `SENTRY_DSN` / `SENTRY_ENVIRONMENT` / `SENTRY_SAMPLE_RATE` / `SENTRY_TRACES_SAMPLE_RATE`

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_PLATFORM_FEE_BPS: u32 = 500;
const MAX_PLATFORM_FEE_BPS: u32 = 10_000;

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
    /// Public base URL
    pub base_url: String,
    /// Session signing secret
    pub session_secret: SecretString,
    /// Platform fee charged on each sale, in basis points
    pub platform_fee_bps: u32,
    /// Payment webhook signing secret (webhook disabled when absent)
    pub webhook_secret: Option<SecretString>,
    /// Image host for product uploads (uploads disabled when absent)
    pub image_host: Option<ImageHostConfig>,
    /// SMTP settings for order emails (emails disabled when absent)
    pub email: Option<EmailConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "staging", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// Third-party image host configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct ImageHostConfig {
    /// Endpoint accepting multipart uploads
    pub upload_url: String,
    /// Bearer token for the host
    pub api_key: SecretString,
}

impl std::fmt::Debug for ImageHostConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageHostConfig")
            .field("upload_url", &self.upload_url)
            .field("api_key", &"[REDACTED]")
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
            .field("from_address", &self.from_address)
            .finish()
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
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`Self::from_env`].
    pub fn from_vars(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars(&get);

        let database_url = vars
            .optional("BAZAAR_DATABASE_URL")
            .or_else(|| vars.optional("DATABASE_URL"))
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar("BAZAAR_DATABASE_URL".to_string()))?;
        let host = vars
            .or_default("BAZAAR_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("BAZAAR_HOST".to_string(), e.to_string()))?;
        let port = vars
            .or_default("BAZAAR_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("BAZAAR_PORT".to_string(), e.to_string()))?;
        let base_url = vars.required("BAZAAR_BASE_URL")?;
        url::Url::parse(&base_url).map_err(|e| {
            ConfigError::InvalidEnvVar("BAZAAR_BASE_URL".to_string(), e.to_string())
        })?;

        let session_secret = vars.validated_secret("BAZAAR_SESSION_SECRET")?;
        validate_session_secret(&session_secret, "BAZAAR_SESSION_SECRET")?;

        let platform_fee_bps = vars
            .or_default("BAZAAR_PLATFORM_FEE_BPS", &DEFAULT_PLATFORM_FEE_BPS.to_string())
            .parse::<u32>()
            .ok()
            .filter(|bps| *bps <= MAX_PLATFORM_FEE_BPS)
            .ok_or_else(|| {
                ConfigError::InvalidEnvVar(
                    "BAZAAR_PLATFORM_FEE_BPS".to_string(),
                    format!("must be an integer between 0 and {MAX_PLATFORM_FEE_BPS}"),
                )
            })?;

        let webhook_secret = match vars.optional("BAZAAR_WEBHOOK_SECRET") {
            Some(value) => {
                validate_secret_strength(&value, "BAZAAR_WEBHOOK_SECRET")?;
                Some(SecretString::from(value))
            }
            None => None,
        };

        let image_host = ImageHostConfig::from_vars(&vars)?;
        let email = EmailConfig::from_vars(&vars)?;

        let sentry_dsn = vars.optional("SENTRY_DSN");
        let sentry_environment = vars.optional("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = vars
            .optional("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = vars
            .optional("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.1);

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            session_secret,
            platform_fee_bps,
            webhook_secret,
            image_host,
            email,
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

    /// Whether cookies should carry the `Secure` flag.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl ImageHostConfig {
    fn from_vars(vars: &Vars<'_>) -> Result<Option<Self>, ConfigError> {
        match (
            vars.optional("IMAGE_HOST_UPLOAD_URL"),
            vars.optional("IMAGE_HOST_API_KEY"),
        ) {
            (Some(upload_url), Some(api_key)) => {
                url::Url::parse(&upload_url).map_err(|e| {
                    ConfigError::InvalidEnvVar("IMAGE_HOST_UPLOAD_URL".to_string(), e.to_string())
                })?;
                validate_secret_strength(&api_key, "IMAGE_HOST_API_KEY")?;
                Ok(Some(Self {
                    upload_url,
                    api_key: SecretString::from(api_key),
                }))
            }
            (None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "IMAGE_HOST_*".to_string(),
                "Both IMAGE_HOST_UPLOAD_URL and IMAGE_HOST_API_KEY must be set together"
                    .to_string(),
            )),
        }
    }
}

impl EmailConfig {
    fn from_vars(vars: &Vars<'_>) -> Result<Option<Self>, ConfigError> {
        let Some(smtp_host) = vars.optional("SMTP_HOST") else {
            return Ok(None);
        };

        let smtp_port = vars
            .or_default("SMTP_PORT", "587")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("SMTP_PORT".to_string(), e.to_string()))?;

        Ok(Some(Self {
            smtp_host,
            smtp_port,
            smtp_username: vars.required("SMTP_USERNAME")?,
            smtp_password: SecretString::from(vars.required("SMTP_PASSWORD")?),
            from_address: vars.required("SMTP_FROM")?,
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Variable lookup shared by the section loaders.
struct Vars<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Vars<'_> {
    /// Get an optional variable, treating empty values as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Get a required variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Load and validate a secret.
    fn validated_secret(&self, key: &str) -> Result<SecretString, ConfigError> {
        let value = self.required(key)?;
        validate_secret_strength(&value, key)?;
        Ok(SecretString::from(value))
    }
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
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
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

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const GOOD_SECRET: &str = "aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6%";

    fn base_vars() -> HashMap<&'static str, String> {
        HashMap::from([
            ("BAZAAR_DATABASE_URL", "postgres://localhost/bazaar".to_string()),
            ("BAZAAR_BASE_URL", "https://shop.test".to_string()),
            ("BAZAAR_SESSION_SECRET", GOOD_SECRET.to_string()),
        ])
    }

    fn load(vars: &HashMap<&'static str, String>) -> Result<ServerConfig, ConfigError> {
        ServerConfig::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = load(&base_vars()).unwrap();
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:3000");
        assert_eq!(config.platform_fee_bps, 500);
        assert!(config.webhook_secret.is_none());
        assert!(config.image_host.is_none());
        assert!(config.email.is_none());
        assert!(config.is_secure());
    }

    #[test]
    fn test_database_url_fallback() {
        let mut vars = base_vars();
        vars.remove("BAZAAR_DATABASE_URL");
        assert!(matches!(load(&vars), Err(ConfigError::MissingEnvVar(_))));

        vars.insert("DATABASE_URL", "postgres://fly/bazaar".to_string());
        let config = load(&vars).unwrap();
        assert_eq!(config.database_url.expose_secret(), "postgres://fly/bazaar");
    }

    #[test]
    fn test_rejects_placeholder_session_secret() {
        let mut vars = base_vars();
        vars.insert(
            "BAZAAR_SESSION_SECRET",
            "your-session-secret-goes-here-please".to_string(),
        );
        assert!(matches!(load(&vars), Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_rejects_fee_above_100_percent() {
        let mut vars = base_vars();
        vars.insert("BAZAAR_PLATFORM_FEE_BPS", "10001".to_string());
        assert!(matches!(load(&vars), Err(ConfigError::InvalidEnvVar(_, _))));
    }

    #[test]
    fn test_image_host_requires_both_vars() {
        let mut vars = base_vars();
        vars.insert("IMAGE_HOST_UPLOAD_URL", "https://img.test/upload".to_string());
        assert!(matches!(load(&vars), Err(ConfigError::InvalidEnvVar(_, _))));

        vars.insert("IMAGE_HOST_API_KEY", GOOD_SECRET.to_string());
        let config = load(&vars).unwrap();
        let debug = format!("{:?}", config.image_host.unwrap());
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(GOOD_SECRET));
    }

    #[test]
    fn test_email_requires_credentials_when_host_set() {
        let mut vars = base_vars();
        vars.insert("SMTP_HOST", "smtp.test".to_string());
        assert!(matches!(load(&vars), Err(ConfigError::MissingEnvVar(_))));

        vars.insert("SMTP_USERNAME", "mailer".to_string());
        vars.insert("SMTP_PASSWORD", "hunter22".to_string());
        vars.insert("SMTP_FROM", "orders@shop.test".to_string());
        let email = load(&vars).unwrap().email.unwrap();
        assert_eq!(email.smtp_port, 587);
    }

    #[test]
    fn test_shannon_entropy() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("ab") - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_session_secret_too_short() {
        let secret = SecretString::from("short");
        assert!(validate_session_secret(&secret, "TEST_SESSION").is_err());
    }
}

//! Configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required for backend commands
//! - `TAKEOUT_BACKEND_URL` - Backend project URL (e.g. `https://abc.backend.co`)
//! - `TAKEOUT_BACKEND_ANON_KEY` - Project anon API key
//!
//! ## Optional
//! - `TAKEOUT_DATA_DIR` - Where the cart snapshot and session live
//!   (default: the platform data directory + `takeout`)
//! - `TAKEOUT_CATALOG_CACHE_TTL_SECS` - Catalog cache lifetime (default: 300)
//! - `TAKEOUT_SYNC_MAX_ATTEMPTS` - Attempts per rate-limited remote cart write (default: 3)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//!
//! The local cart works without any of these; only commands that talk to
//! the backend need the two backend variables.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const DEFAULT_CATALOG_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_SYNC_MAX_ATTEMPTS: u32 = 3;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
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

/// Application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Directory holding `cart-storage.json` and `session.json`
    pub data_dir: PathBuf,
    /// Backend connection, when configured
    backend: Option<BackendConfig>,
    /// Lifetime of cached catalog reads
    pub catalog_cache_ttl: Duration,
    /// Attempts per remote cart write before giving up on rate limits
    pub sync_max_attempts: u32,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Connection details for the hosted backend.
///
/// Implements `Debug` manually to redact the key.
#[derive(Clone)]
pub struct BackendConfig {
    /// Project URL, always ending in `/`
    pub url: Url,
    /// Anon API key sent with every request
    pub anon_key: SecretString,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url.as_str())
            .field("anon_key", &"[REDACTED]")
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is invalid, if only one of the
    /// backend variables is set, or if the anon key fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`from_env`](Self::from_env).
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let data_dir = match env.optional("TAKEOUT_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .map(|dir| dir.join("takeout"))
                .ok_or_else(|| ConfigError::MissingEnvVar("TAKEOUT_DATA_DIR".to_string()))?,
        };

        let catalog_cache_ttl = Duration::from_secs(
            env.parsed("TAKEOUT_CATALOG_CACHE_TTL_SECS", DEFAULT_CATALOG_CACHE_TTL_SECS)?,
        );
        let sync_max_attempts =
            env.parsed("TAKEOUT_SYNC_MAX_ATTEMPTS", DEFAULT_SYNC_MAX_ATTEMPTS)?;
        if sync_max_attempts == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "TAKEOUT_SYNC_MAX_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            data_dir,
            backend: BackendConfig::from_env(&env)?,
            catalog_cache_ttl,
            sync_max_attempts,
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
        })
    }

    /// The backend connection.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if the backend is not configured.
    pub fn backend(&self) -> Result<&BackendConfig, ConfigError> {
        self.backend
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("TAKEOUT_BACKEND_URL".to_string()))
    }

    /// Configuration for a fixed data directory and backend, with defaults
    /// for everything else.
    #[must_use]
    pub fn new(data_dir: PathBuf, backend: Option<BackendConfig>) -> Self {
        Self {
            data_dir,
            backend,
            catalog_cache_ttl: Duration::from_secs(DEFAULT_CATALOG_CACHE_TTL_SECS),
            sync_max_attempts: DEFAULT_SYNC_MAX_ATTEMPTS,
            sentry_dsn: None,
            sentry_environment: None,
        }
    }
}

impl BackendConfig {
    fn from_env<F>(env: &Env<F>) -> Result<Option<Self>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = env.optional("TAKEOUT_BACKEND_URL");
        let key = env.optional("TAKEOUT_BACKEND_ANON_KEY");
        if url.is_none() && key.is_none() {
            return Ok(None);
        }

        let url = url.ok_or_else(|| ConfigError::MissingEnvVar("TAKEOUT_BACKEND_URL".to_string()))?;
        let key =
            key.ok_or_else(|| ConfigError::MissingEnvVar("TAKEOUT_BACKEND_ANON_KEY".to_string()))?;
        validate_secret_strength(&key, "TAKEOUT_BACKEND_ANON_KEY")?;

        Ok(Some(Self {
            url: parse_base_url(&url, "TAKEOUT_BACKEND_URL")?,
            anon_key: SecretString::from(key),
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Variable lookup with the helpers every loader needs.
struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// A set, non-blank variable.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    /// A variable parsed as `T`, or `default` when unset.
    fn parsed<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key).map_or(Ok(default), |value| {
            value
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
    }
}

/// Parse an http(s) URL and make sure relative joins land under it.
fn parse_base_url(raw: &str, var_name: &str) -> Result<Url, ConfigError> {
    let mut url =
        Url::parse(raw).map_err(|e| ConfigError::InvalidEnvVar(var_name.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
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
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Copy the key from the project settings."
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    const KEY: &str = "eyJhbGciOiJIUzI1NiJ9.aB3xY9mK2nL5pQ7rT0uW4zC6";

    fn load(vars: &[(&str, &str)]) -> Result<StorefrontConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        StorefrontConfig::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("TAKEOUT_DATA_DIR", "/tmp/takeout")]).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/takeout"));
        assert_eq!(config.catalog_cache_ttl, Duration::from_secs(300));
        assert_eq!(config.sync_max_attempts, 3);
        assert!(config.sentry_dsn.is_none());
        assert!(matches!(
            config.backend(),
            Err(ConfigError::MissingEnvVar(var)) if var == "TAKEOUT_BACKEND_URL"
        ));
    }

    #[test]
    fn test_backend_config() {
        let config = load(&[
            ("TAKEOUT_DATA_DIR", "/tmp/takeout"),
            ("TAKEOUT_BACKEND_URL", "https://abc.backend.co"),
            ("TAKEOUT_BACKEND_ANON_KEY", KEY),
        ])
        .unwrap();
        let backend = config.backend().unwrap();
        assert_eq!(backend.url.as_str(), "https://abc.backend.co/");
        assert_eq!(backend.anon_key.expose_secret(), KEY);
    }

    #[test]
    fn test_backend_url_keeps_path_prefix() {
        let url = parse_base_url("https://host.test/api", "X").unwrap();
        assert_eq!(url.join("rest/v1/food").unwrap().path(), "/api/rest/v1/food");
        assert!(parse_base_url("ftp://host.test", "X").is_err());
        assert!(parse_base_url("not a url", "X").is_err());
    }

    #[test]
    fn test_half_configured_backend_is_an_error() {
        let result = load(&[
            ("TAKEOUT_DATA_DIR", "/tmp/takeout"),
            ("TAKEOUT_BACKEND_URL", "https://abc.backend.co"),
        ]);
        assert!(matches!(
            result,
            Err(ConfigError::MissingEnvVar(var)) if var == "TAKEOUT_BACKEND_ANON_KEY"
        ));
    }

    #[test]
    fn test_invalid_numbers() {
        assert!(matches!(
            load(&[("TAKEOUT_DATA_DIR", "/tmp"), ("TAKEOUT_SYNC_MAX_ATTEMPTS", "lots")]),
            Err(ConfigError::InvalidEnvVar(_, _))
        ));
        assert!(matches!(
            load(&[("TAKEOUT_DATA_DIR", "/tmp"), ("TAKEOUT_SYNC_MAX_ATTEMPTS", "0")]),
            Err(ConfigError::InvalidEnvVar(_, _))
        ));
        let config = load(&[
            ("TAKEOUT_DATA_DIR", "/tmp"),
            ("TAKEOUT_CATALOG_CACHE_TTL_SECS", "5"),
        ])
        .unwrap();
        assert_eq!(config.catalog_cache_ttl, Duration::from_secs(5));
    }

    #[test]
    fn test_blank_values_count_as_unset() {
        let config = load(&[("TAKEOUT_DATA_DIR", "/tmp"), ("SENTRY_DSN", "   ")]).unwrap();
        assert!(config.sentry_dsn.is_none());
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
    fn test_placeholder_anon_key_rejected() {
        let result = load(&[
            ("TAKEOUT_DATA_DIR", "/tmp"),
            ("TAKEOUT_BACKEND_URL", "https://abc.backend.co"),
            ("TAKEOUT_BACKEND_ANON_KEY", "your-anon-key"),
        ]);
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_low_entropy_key_rejected() {
        assert!(validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR").is_err());
        assert!(validate_secret_strength(KEY, "TEST_VAR").is_ok());
    }

    #[test]
    fn test_backend_config_debug_redacts_key() {
        let config = BackendConfig {
            url: Url::parse("https://abc.backend.co/").unwrap(),
            anon_key: SecretString::from("super_secret_anon_key"),
        };
        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("abc.backend.co"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_anon_key"));
    }
}

//! Client for the hosted backend (managed auth + PostgREST).
//!
//! # Architecture
//!
//! - The backend is the source of truth for users, catalog, carts, and
//!   orders; this client is a thin typed layer over its REST API
//! - Every request carries the project's anon key; requests made on behalf
//!   of a signed-in user also carry the user's access token
//! - Catalog reads are cached in-memory via `moka` (5 minute TTL by default)
//!
//! # APIs
//!
//! - [`auth`] - Sign up, sign in, sign out, current user, token refresh
//! - [`catalog`] - Food, restaurants, menu items
//! - [`cart`] - Remote cart rows (the mirror of the local cart)
//! - [`orders`] - Order history and order creation
//! - [`profile`] - The signed-in user's profile row
//!
//! # Example
//!
//! ```rust,ignore
//! use takeout_storefront::backend::BackendClient;
//!
//! let client = BackendClient::new(config.backend()?, config.catalog_cache_ttl)?;
//! let session = client.sign_in(&email, &password).await?;
//! let client = client.with_session(&session);
//!
//! let rows = client.fetch_server_cart(&session.user_id).await?;
//! ```

pub mod auth;
mod cache;
pub mod cart;
pub mod catalog;
pub mod orders;
pub mod profile;

pub use auth::{AuthUser, SignUpOutcome};
pub use cart::{CartBackend, NewCartRow, ServerCartRow};
pub use catalog::{Food, FoodFilter, MenuItem, Restaurant};
pub use orders::{NewOrder, NewOrderItem, Order, OrderBackend, OrderItem};
pub use profile::{NewProfile, Profile, ProfileUpdate};

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use crate::config::BackendConfig;
use crate::session::AuthSession;

use cache::{CacheKey, CacheValue};

/// Maximum number of characters of a response body kept in errors and logs.
const BODY_EXCERPT_LEN: usize = 500;

/// Errors that can occur when talking to the backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing, expired, or rejected credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Request URL could not be built.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Input rejected before any request was sent.
    #[error("Invalid input: {0}")]
    Validation(String),
}

impl BackendError {
    /// Whether the same request may succeed if sent again later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// Client for the backend REST API.
///
/// Cheap to clone. [`with_session`](Self::with_session) returns a copy that
/// authorizes requests as the signed-in user; the catalog cache is shared
/// between copies.
#[derive(Clone)]
pub struct BackendClient {
    inner: Arc<BackendClientInner>,
    access_token: Option<SecretString>,
}

struct BackendClientInner {
    http: reqwest::Client,
    base_url: Url,
    anon_key: SecretString,
    cache: Cache<CacheKey, CacheValue>,
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("anon_key", &"[REDACTED]")
            .field("signed_in", &self.access_token.is_some())
            .finish()
    }
}

impl BackendClient {
    /// Create a client for the configured project.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &BackendConfig, cache_ttl: Duration) -> Result<Self, BackendError> {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(cache_ttl)
            .build();

        let http = reqwest::Client::builder()
            .user_agent(concat!("takeout/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            inner: Arc::new(BackendClientInner {
                http,
                base_url: config.url.clone(),
                anon_key: config.anon_key.clone(),
                cache,
            }),
            access_token: None,
        })
    }

    /// Copy of this client that acts as the session's user.
    #[must_use]
    pub fn with_session(&self, session: &AuthSession) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            access_token: Some(session.access_token.clone()),
        }
    }

    /// Whether requests carry a user access token.
    #[must_use]
    pub const fn is_signed_in(&self) -> bool {
        self.access_token.is_some()
    }

    /// Build the URL for a table or auth endpoint with query parameters.
    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, BackendError> {
        let mut url = self.inner.base_url.join(path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Start a request with the API key and bearer token applied.
    ///
    /// Without a user session the anon key doubles as the bearer token, as
    /// the backend expects.
    fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<RequestBuilder, BackendError> {
        let url = self.url(path, query)?;
        let bearer = self
            .access_token
            .as_ref()
            .unwrap_or(&self.inner.anon_key)
            .expose_secret();

        Ok(self
            .inner
            .http
            .request(method, url)
            .header("apikey", self.inner.anon_key.expose_secret())
            .bearer_auth(bearer))
    }

    /// Start a request against a table under `rest/v1/`.
    fn table(
        &self,
        method: Method,
        table: &str,
        query: &[(&str, &str)],
    ) -> Result<RequestBuilder, BackendError> {
        self.request(method, &format!("rest/v1/{table}"), query)
    }

    /// Send a request and parse a JSON response body.
    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, BackendError> {
        let body = Self::send_checked(request).await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %excerpt(&body),
                "Failed to parse backend response"
            );
            BackendError::Parse(e)
        })
    }

    /// Send a request, discarding the response body.
    async fn send_empty(request: RequestBuilder) -> Result<(), BackendError> {
        Self::send_checked(request).await.map(drop)
    }

    /// Send a request and map non-success statuses to errors.
    async fn send_checked(request: RequestBuilder) -> Result<String, BackendError> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(BackendError::RateLimited(retry_after));
        }

        let body = response.text().await?;
        if status.is_success() {
            return Ok(body);
        }

        tracing::warn!(
            status = %status,
            body = %excerpt(&body),
            "Backend returned non-success status"
        );
        Err(status_error(status, &body))
    }
}

/// Map a failed response to an error, preferring the backend's own message.
fn status_error(status: StatusCode, body: &str) -> BackendError {
    let message = error_message(body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Unauthorized(message),
        StatusCode::NOT_FOUND => BackendError::NotFound(message),
        _ => BackendError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

/// Pull a human-readable message out of an error body.
///
/// The REST layer uses `message`, the auth layer uses `msg` or
/// `error_description`; anything else is passed through as an excerpt.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|key| value.get(*key).and_then(|v| v.as_str()).map(str::to_owned))
        })
        .unwrap_or_else(|| excerpt(body))
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_LEN).collect()
}

/// PostgREST equality filter value.
fn eq(value: &str) -> String {
    format!("eq.{value}")
}

/// Take the single row a filtered select is expected to return.
fn single<T>(rows: Vec<T>, what: impl FnOnce() -> String) -> Result<T, BackendError> {
    rows.into_iter()
        .next()
        .ok_or_else(|| BackendError::NotFound(what()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn client() -> BackendClient {
        let config = BackendConfig {
            url: Url::parse("https://project.example.co/").unwrap(),
            anon_key: SecretString::from("anon-key-value"),
        };
        BackendClient::new(&config, Duration::from_secs(60)).unwrap()
    }

    #[test]
    fn test_url_builds_table_path_and_filters() {
        let url = client()
            .url("rest/v1/cart", &[("user_id", eq("u1").as_str()), ("select", "id,food(name)")])
            .unwrap();
        assert_eq!(url.path(), "/rest/v1/cart");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("user_id".to_string(), "eq.u1".to_string()),
                ("select".to_string(), "id,food(name)".to_string()),
            ]
        );
    }

    #[test]
    fn test_status_error_mapping() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, r#"{"message":"JWT expired"}"#),
            BackendError::Unauthorized(msg) if msg == "JWT expired"
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "gone"),
            BackendError::NotFound(msg) if msg == "gone"
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, r#"{"error_description":"Invalid login credentials"}"#),
            BackendError::Api { status: 400, message } if message == "Invalid login credentials"
        ));
    }

    #[test]
    fn test_error_message_truncates_plain_bodies() {
        let body = "x".repeat(BODY_EXCERPT_LEN * 2);
        assert_eq!(error_message(&body).len(), BODY_EXCERPT_LEN);
    }

    #[test]
    fn test_single_reports_missing_rows() {
        let rows: Vec<u8> = Vec::new();
        assert!(matches!(
            single(rows, || "food p1".to_string()),
            Err(BackendError::NotFound(what)) if what == "food p1"
        ));
        assert_eq!(single(vec![1, 2], String::new).unwrap(), 1);
    }

    #[test]
    fn test_only_rate_limits_are_retryable() {
        assert!(BackendError::RateLimited(3).is_retryable());
        assert!(!BackendError::NotFound("x".to_string()).is_retryable());
    }

    #[test]
    fn test_debug_redacts_keys() {
        let debug = format!("{:?}", client());
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("anon-key-value"));
    }

    #[test]
    fn test_rate_limited_error() {
        let err = BackendError::RateLimited(60);
        assert_eq!(err.to_string(), "Rate limited, retry after 60 seconds");
    }
}

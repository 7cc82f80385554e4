//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type for everything a command can fail
//! with. Commands return `Result<T, AppError>` and the binary calls
//! [`AppError::report`] once, right before printing the message, so
//! failures that are not the user's fault reach Sentry.

use thiserror::Error;

use crate::backend::BackendError;
use crate::cart::{CartError, SnapshotError};
use crate::checkout::CheckoutError;
use crate::config::ConfigError;
use crate::session::SessionError;
use crate::sync::SyncError;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A cart operation was rejected.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// The cart snapshot could not be read or written.
    #[error("Storage error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// Backend request failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Remote cart sync failed.
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Checkout was refused or failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Bad input from the user.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::SignedOut | SessionError::Expired => {
                Self::Unauthorized("sign in first".to_string())
            }
            SessionError::Io { .. } | SessionError::Json(_) => Self::Internal(err.to_string()),
        }
    }
}

impl AppError {
    /// Whether this failure is ours rather than the user's.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        match self {
            Self::Snapshot(_) | Self::Internal(_) => true,
            Self::Backend(err) | Self::Checkout(CheckoutError::Backend(err)) => {
                !matches!(
                    err,
                    BackendError::Unauthorized(_)
                        | BackendError::NotFound(_)
                        | BackendError::RateLimited(_)
                        | BackendError::Validation(_)
                )
            }
            Self::Sync(err) | Self::Checkout(CheckoutError::Sync(err)) => {
                !matches!(err, SyncError::Cart(_))
            }
            _ => false,
        }
    }

    /// Log the error and, if it is internal, capture it to Sentry.
    pub fn report(&self) {
        if self.is_internal() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Command failed"
            );
        } else {
            tracing::debug!(error = %self, "Command refused");
        }
    }

    /// Process exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 78,
            Self::Unauthorized(_) => 77,
            Self::Cart(_)
            | Self::BadRequest(_)
            | Self::Checkout(CheckoutError::EmptyCart | CheckoutError::MissingAddress) => 65,
            _ if self.is_internal() => 70,
            _ => 1,
        }
    }

    /// Message safe to show the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Backend(BackendError::RateLimited(secs)) => {
                format!("The service is busy, try again in {secs} seconds")
            }
            Self::Backend(BackendError::Unauthorized(_)) => {
                "Not signed in, or the session has expired. Run `takeout auth login`.".to_string()
            }
            Self::Unauthorized(msg) => {
                format!("Unauthorized: {msg}. Run `takeout auth login`.")
            }
            _ => self.to_string(),
        }
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after sign-in to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added item", Some(&[("item_id", "p1")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

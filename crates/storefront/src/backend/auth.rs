//! Managed auth: accounts, sign in/out, and token refresh.

use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use takeout_core::{Email, UserId};
use tracing::{info, instrument};

use super::{BackendClient, BackendError};
use crate::session::AuthSession;

/// Minimum password length accepted by the auth service.
pub const MIN_PASSWORD_LEN: usize = 6;

/// The authenticated user as reported by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<Email>,
    #[serde(default)]
    pub email_confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Result of creating an account.
#[derive(Debug)]
pub enum SignUpOutcome {
    /// The account is usable right away.
    SignedIn(AuthSession),
    /// The account exists but the email address must be confirmed before
    /// signing in.
    ConfirmationRequired(AuthUser),
}

impl SignUpOutcome {
    /// The new account's user.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        match self {
            Self::SignedIn(session) => &session.user_id,
            Self::ConfirmationRequired(user) => &user.id,
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> AuthSession {
        AuthSession {
            access_token: SecretString::from(self.access_token),
            refresh_token: SecretString::from(self.refresh_token),
            expires_at: now + Duration::seconds(self.expires_in),
            user_id: self.user.id,
            email: self.user.email,
        }
    }
}

/// The signup endpoint answers with a session when confirmation is off and
/// with a bare user when it is on.
#[derive(Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    User(AuthUser),
}

/// Reject passwords the auth service would refuse anyway.
///
/// # Errors
///
/// Returns [`BackendError::Validation`] if the password is too short.
pub fn check_password(password: &SecretString) -> Result<(), BackendError> {
    if password.expose_secret().chars().count() < MIN_PASSWORD_LEN {
        return Err(BackendError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Wrong email/password pairs come back as a 400; report them as auth
/// failures rather than API errors.
fn credentials_error(err: BackendError) -> BackendError {
    match err {
        BackendError::Api {
            status: 400,
            message,
        } => BackendError::Unauthorized(message),
        other => other,
    }
}

impl BackendClient {
    /// Create an account.
    ///
    /// # Errors
    ///
    /// Returns error if the password is too short or the auth service
    /// rejects the signup (for example, the email is already registered).
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn sign_up(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<SignUpOutcome, BackendError> {
        check_password(password)?;
        let request = self.request(Method::POST, "auth/v1/signup", &[])?.json(&json!({
            "email": email.as_str(),
            "password": password.expose_secret(),
        }));

        let outcome = match Self::send_json::<SignUpResponse>(request).await? {
            SignUpResponse::Session(token) => SignUpOutcome::SignedIn(token.into_session(Utc::now())),
            SignUpResponse::User(user) => SignUpOutcome::ConfirmationRequired(user),
        };
        info!(user_id = %outcome.user_id(), "Account created");
        Ok(outcome)
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unauthorized`] for bad credentials.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn sign_in(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthSession, BackendError> {
        let request = self
            .request(Method::POST, "auth/v1/token", &[("grant_type", "password")])?
            .json(&json!({
                "email": email.as_str(),
                "password": password.expose_secret(),
            }));

        let token: TokenResponse = Self::send_json(request).await.map_err(credentials_error)?;
        let session = token.into_session(Utc::now());
        info!(user_id = %session.user_id, "Signed in");
        Ok(session)
    }

    /// Exchange a refresh token for a new session.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unauthorized`] if the refresh token is no
    /// longer valid.
    #[instrument(skip_all)]
    pub async fn refresh_session(
        &self,
        refresh_token: &SecretString,
    ) -> Result<AuthSession, BackendError> {
        let request = self
            .request(Method::POST, "auth/v1/token", &[("grant_type", "refresh_token")])?
            .json(&json!({ "refresh_token": refresh_token.expose_secret() }));

        let token: TokenResponse = Self::send_json(request).await.map_err(credentials_error)?;
        Ok(token.into_session(Utc::now()))
    }

    /// Revoke the current session's tokens.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unauthorized`] if the client has no session.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), BackendError> {
        self.require_user_token()?;
        let request = self.request(Method::POST, "auth/v1/logout", &[])?;
        Self::send_empty(request).await
    }

    /// The user the current session belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unauthorized`] if the client has no session
    /// or the token was rejected.
    #[instrument(skip(self))]
    pub async fn get_user(&self) -> Result<AuthUser, BackendError> {
        self.require_user_token()?;
        let request = self.request(Method::GET, "auth/v1/user", &[])?;
        Self::send_json(request).await
    }

    /// Send a password reset link to an address.
    ///
    /// The service answers the same way whether or not the address is
    /// registered.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self), fields(email = %email))]
    pub async fn request_password_reset(&self, email: &Email) -> Result<(), BackendError> {
        let request = self
            .request(Method::POST, "auth/v1/recover", &[])?
            .json(&json!({ "email": email.as_str() }));
        Self::send_empty(request).await
    }

    /// Change the signed-in user's password.
    ///
    /// # Errors
    ///
    /// Returns error if the password is too short, the client has no
    /// session, or the service rejects the change.
    #[instrument(skip_all)]
    pub async fn update_password(&self, password: &SecretString) -> Result<(), BackendError> {
        check_password(password)?;
        self.require_user_token()?;
        let request = self
            .request(Method::PUT, "auth/v1/user", &[])?
            .json(&json!({ "password": password.expose_secret() }));
        Self::send_empty(request).await
    }

    fn require_user_token(&self) -> Result<(), BackendError> {
        if self.is_signed_in() {
            Ok(())
        } else {
            Err(BackendError::Unauthorized("sign in first".to_string()))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::tests::client;

    const TOKEN_JSON: &str = r#"{
        "access_token": "at",
        "token_type": "bearer",
        "expires_in": 3600,
        "refresh_token": "rt",
        "user": {"id": "user-1", "email": "Ada@Example.com", "aud": "authenticated"}
    }"#;

    #[test]
    fn test_token_response_into_session() {
        let token: TokenResponse = serde_json::from_str(TOKEN_JSON).unwrap();
        let now = Utc::now();
        let session = token.into_session(now);
        assert_eq!(session.user_id.as_str(), "user-1");
        assert_eq!(session.email.unwrap().as_str(), "ada@example.com");
        assert_eq!(session.expires_at, now + Duration::seconds(3600));
        assert_eq!(session.access_token.expose_secret(), "at");
    }

    #[test]
    fn test_signup_response_shapes() {
        assert!(matches!(
            serde_json::from_str::<SignUpResponse>(TOKEN_JSON).unwrap(),
            SignUpResponse::Session(_)
        ));
        let user_only = r#"{"id":"user-2","email":"bob@example.com","confirmation_sent_at":"2024-05-01T10:00:00Z"}"#;
        assert!(matches!(
            serde_json::from_str::<SignUpResponse>(user_only).unwrap(),
            SignUpResponse::User(user) if user.id.as_str() == "user-2"
        ));
    }

    #[test]
    fn test_check_password() {
        assert!(check_password(&SecretString::from("12345")).is_err());
        assert!(check_password(&SecretString::from("123456")).is_ok());
    }

    #[test]
    fn test_bad_credentials_become_unauthorized() {
        let err = credentials_error(BackendError::Api {
            status: 400,
            message: "Invalid login credentials".to_string(),
        });
        assert!(matches!(err, BackendError::Unauthorized(msg) if msg == "Invalid login credentials"));

        let err = credentials_error(BackendError::Api {
            status: 500,
            message: "boom".to_string(),
        });
        assert!(matches!(err, BackendError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_user_endpoints_require_a_session() {
        let client = client();
        assert!(matches!(
            client.get_user().await,
            Err(BackendError::Unauthorized(_))
        ));
        assert!(matches!(
            client.sign_out().await,
            Err(BackendError::Unauthorized(_))
        ));
    }
}

//! The signed-in user's auth session, kept on disk between runs.
//!
//! Commands that act on the user's data call [`SessionStore::require`]
//! first; no saved session, or one that has expired and cannot be
//! refreshed, means the command is refused.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use takeout_core::{Email, UserId};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::{BackendClient, BackendError};

const SESSION_FILE: &str = "session.json";

/// Sessions this close to expiry are refreshed before use.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Errors from loading or saving the session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Nobody is signed in.
    #[error("not signed in")]
    SignedOut,

    /// The saved session expired and could not be refreshed.
    #[error("session expired")]
    Expired,

    #[error("session file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("session file is corrupt: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tokens for a signed-in user.
#[derive(Clone)]
pub struct AuthSession {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    pub expires_at: DateTime<Utc>,
    pub user_id: UserId,
    pub email: Option<Email>,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .finish()
    }
}

impl AuthSession {
    /// Whether the access token is expired, or will be within a minute.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) <= now
    }
}

/// On-disk form. Tokens are written in the clear, so the file is only ever
/// created inside the user's private data directory.
#[derive(Serialize, Deserialize)]
struct StoredSession {
    access_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
    user_id: UserId,
    email: Option<Email>,
}

impl From<&AuthSession> for StoredSession {
    fn from(session: &AuthSession) -> Self {
        Self {
            access_token: session.access_token.expose_secret().to_owned(),
            refresh_token: session.refresh_token.expose_secret().to_owned(),
            expires_at: session.expires_at,
            user_id: session.user_id.clone(),
            email: session.email.clone(),
        }
    }
}

impl From<StoredSession> for AuthSession {
    fn from(stored: StoredSession) -> Self {
        Self {
            access_token: SecretString::from(stored.access_token),
            refresh_token: SecretString::from(stored.refresh_token),
            expires_at: stored.expires_at,
            user_id: stored.user_id,
            email: stored.email,
        }
    }
}

/// File-backed session storage at `<data_dir>/session.json`.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(SESSION_FILE),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The saved session, if any, without checking expiry.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<Option<AuthSession>, SessionError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SessionError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let stored: StoredSession = serde_json::from_str(&raw)?;
        Ok(Some(stored.into()))
    }

    /// Save a session, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written.
    pub fn save(&self, session: &AuthSession) -> Result<(), SessionError> {
        let raw = serde_json::to_string_pretty(&StoredSession::from(session))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }
        fs::write(&self.path, raw).map_err(|source| self.io_error(source))?;
        debug!(user_id = %session.user_id, "Session saved");
        Ok(())
    }

    /// Forget the saved session. Does nothing if there is none.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be removed.
    pub fn clear(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(self.io_error(source)),
        }
    }

    /// The saved session, refreshed through the backend if it has expired.
    ///
    /// A refreshed session is saved back. A session that cannot be
    /// refreshed is cleared.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SignedOut`] when there is no session and
    /// [`SessionError::Expired`] when it expired and the refresh was
    /// rejected.
    pub async fn require(&self, client: &BackendClient) -> Result<AuthSession, SessionError> {
        let session = self.load()?.ok_or(SessionError::SignedOut)?;
        if !session.is_expired() {
            return Ok(session);
        }

        debug!(user_id = %session.user_id, "Access token expired, refreshing");
        match client.refresh_session(&session.refresh_token).await {
            Ok(refreshed) => {
                self.save(&refreshed)?;
                info!(user_id = %refreshed.user_id, "Session refreshed");
                Ok(refreshed)
            }
            Err(BackendError::Unauthorized(reason) | BackendError::Api { message: reason, .. }) => {
                warn!(reason = %reason, "Session refresh rejected, signing out");
                self.clear()?;
                Err(SessionError::Expired)
            }
            Err(e) => {
                warn!(error = %e, "Session refresh failed");
                Err(SessionError::Expired)
            }
        }
    }

    fn io_error(&self, source: io::Error) -> SessionError {
        SessionError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn session(expires_in: i64) -> AuthSession {
        AuthSession {
            access_token: SecretString::from("access-token"),
            refresh_token: SecretString::from("refresh-token"),
            expires_at: Utc::now() + Duration::seconds(expires_in),
            user_id: UserId::parse("user-1").unwrap(),
            email: Some(Email::parse("ada@example.com").unwrap()),
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::in_dir(dir.path());
        assert!(store.load().unwrap().is_none());

        store.save(&session(3600)).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.user_id.as_str(), "user-1");
        assert_eq!(loaded.access_token.expose_secret(), "access-token");
        assert_eq!(loaded.email.unwrap().as_str(), "ada@example.com");
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::in_dir(dir.path());
        store.save(&session(3600)).unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::in_dir(dir.path());
        fs::write(store.path(), "not json").unwrap();
        assert!(matches!(store.load(), Err(SessionError::Json(_))));
    }

    #[test]
    fn test_expiry_includes_margin() {
        assert!(session(-10).is_expired());
        assert!(session(30).is_expired());
        assert!(!session(3600).is_expired());
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let debug = format!("{:?}", session(3600));
        assert!(!debug.contains("access-token"));
        assert!(!debug.contains("refresh-token"));
    }

    #[tokio::test]
    async fn test_require_without_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::in_dir(dir.path());
        let client = crate::backend::tests::client();
        assert!(matches!(
            store.require(&client).await,
            Err(SessionError::SignedOut)
        ));
    }

    #[tokio::test]
    async fn test_require_returns_fresh_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::in_dir(dir.path());
        store.save(&session(3600)).unwrap();
        let client = crate::backend::tests::client();

        let found = store.require(&client).await.unwrap();
        assert_eq!(found.user_id.as_str(), "user-1");
    }
}

//! Command implementations.
//!
//! Every command gets a [`Context`] built once in `main`; it knows where
//! local state lives and how to reach the backend.

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod orders;
pub mod profile;

use std::io::{self, BufRead, Write};

use secrecy::SecretString;
use takeout_storefront::backend::BackendClient;
use takeout_storefront::cart::{CartEvent, CartStore, FileSnapshotStore};
use takeout_storefront::config::StorefrontConfig;
use takeout_storefront::error::{AppError, set_sentry_user};
use takeout_storefront::session::{AuthSession, SessionError, SessionStore};

/// A backend client acting as the signed-in user.
pub struct SignedIn {
    pub client: BackendClient,
    pub session: AuthSession,
}

pub struct Context {
    config: StorefrontConfig,
}

impl Context {
    pub const fn new(config: StorefrontConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &StorefrontConfig {
        &self.config
    }

    /// Open the cart, warning on stderr whenever a change is not saved.
    pub fn cart(&self) -> CartStore<FileSnapshotStore> {
        let mut cart = CartStore::open(FileSnapshotStore::in_dir(&self.config.data_dir));
        cart.subscribe(|event| {
            if let CartEvent::PersistenceUnavailable(warning) = event {
                eprintln!("warning: {warning}");
            }
        });
        cart
    }

    pub fn sessions(&self) -> SessionStore {
        SessionStore::in_dir(&self.config.data_dir)
    }

    /// An anonymous backend client.
    pub fn client(&self) -> Result<BackendClient, AppError> {
        Ok(BackendClient::new(
            self.config.backend()?,
            self.config.catalog_cache_ttl,
        )?)
    }

    /// The signed-in user, or `Unauthorized` if there is none.
    pub async fn require_sign_in(&self) -> Result<SignedIn, AppError> {
        let client = self.client()?;
        let session = self.sessions().require(&client).await?;
        Ok(signed_in(&client, session))
    }

    /// The signed-in user, if the backend is configured and someone is
    /// signed in.
    pub async fn sign_in_if_available(&self) -> Result<Option<SignedIn>, AppError> {
        if self.config.backend().is_err() {
            return Ok(None);
        }
        let client = self.client()?;
        match self.sessions().require(&client).await {
            Ok(session) => Ok(Some(signed_in(&client, session))),
            Err(SessionError::SignedOut) => Ok(None),
            Err(SessionError::Expired) => {
                eprintln!("warning: session expired, changes stay local until you sign in again");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn signed_in(client: &BackendClient, session: AuthSession) -> SignedIn {
    set_sentry_user(
        &session.user_id,
        session.email.as_ref().map(takeout_core::Email::as_str),
    );
    SignedIn {
        client: client.with_session(&session),
        session,
    }
}

/// Use a password passed on the command line or through the environment,
/// or read one line from stdin.
pub fn password_or_prompt(given: Option<String>, prompt: &str) -> Result<SecretString, AppError> {
    if let Some(password) = given {
        return Ok(SecretString::from(password));
    }

    eprint!("{prompt}: ");
    io::stderr()
        .flush()
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        return Err(AppError::BadRequest("password is required".to_string()));
    }
    Ok(SecretString::from(password.to_owned()))
}

//! Account and sign-in commands.
//!
//! # Usage
//!
//! ```bash
//! takeout auth signup -e ada@example.com -n "Ada Lovelace"
//! takeout auth login -e ada@example.com
//! takeout auth whoami
//! takeout auth logout
//! takeout auth reset-password -e ada@example.com
//! takeout auth set-password
//! ```
//!
//! Passwords are read from `--password`, `TAKEOUT_PASSWORD`, or stdin.

use clap::Subcommand;
use takeout_core::Email;
use takeout_storefront::backend::{NewProfile, SignUpOutcome};
use takeout_storefront::error::{AppError, add_breadcrumb, clear_sentry_user};

use super::{Context, password_or_prompt};

#[derive(Subcommand)]
pub enum AuthAction {
    /// Create an account
    Signup {
        /// Email address
        #[arg(short, long)]
        email: String,
        /// Your name
        #[arg(short, long)]
        name: Option<String>,
        /// Password (prompted if omitted)
        #[arg(long, env = "TAKEOUT_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Sign in
    Login {
        /// Email address
        #[arg(short, long)]
        email: String,
        /// Password (prompted if omitted)
        #[arg(long, env = "TAKEOUT_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Sign out and forget the saved session
    Logout,
    /// Show who is signed in
    Whoami,
    /// Email a password reset link
    ResetPassword {
        /// Email address
        #[arg(short, long)]
        email: String,
    },
    /// Change the signed-in user's password
    SetPassword {
        /// New password (prompted if omitted)
        #[arg(long, env = "TAKEOUT_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
}

pub async fn run(action: AuthAction, context: &Context) -> Result<(), AppError> {
    match action {
        AuthAction::Signup {
            email,
            name,
            password,
        } => signup(context, &email, name, password).await,
        AuthAction::Login { email, password } => login(context, &email, password).await,
        AuthAction::Logout => logout(context).await,
        AuthAction::Whoami => whoami(context).await,
        AuthAction::ResetPassword { email } => {
            let email = parse_email(&email)?;
            context.client()?.request_password_reset(&email).await?;
            println!("If {email} has an account, a reset link is on its way.");
            Ok(())
        }
        AuthAction::SetPassword { password } => {
            let password = password_or_prompt(password, "New password")?;
            let signed_in = context.require_sign_in().await?;
            signed_in.client.update_password(&password).await?;
            println!("Password changed.");
            Ok(())
        }
    }
}

fn parse_email(email: &str) -> Result<Email, AppError> {
    Email::parse(email).map_err(|e| AppError::BadRequest(e.to_string()))
}

async fn signup(
    context: &Context,
    email: &str,
    name: Option<String>,
    password: Option<String>,
) -> Result<(), AppError> {
    let email = parse_email(email)?;
    let password = password_or_prompt(password, "Password")?;
    let client = context.client()?;

    match client.sign_up(&email, &password).await? {
        SignUpOutcome::SignedIn(session) => {
            let profile = NewProfile {
                id: session.user_id.clone(),
                email: email.clone(),
                full_name: name.filter(|name| !name.trim().is_empty()),
            };
            // The account exists even if the profile row does not.
            if let Err(e) = client.with_session(&session).create_profile(&profile).await {
                tracing::warn!(error = %e, "Profile row not created");
                eprintln!("warning: profile not saved: {e}");
            }
            context.sessions().save(&session)?;
            add_breadcrumb("auth", "Signed up", None);
            println!("Welcome! Signed in as {email}.");
        }
        SignUpOutcome::ConfirmationRequired(_) => {
            println!("Check {email} for a confirmation link, then run `takeout auth login`.");
        }
    }
    Ok(())
}

async fn login(context: &Context, email: &str, password: Option<String>) -> Result<(), AppError> {
    let email = parse_email(email)?;
    let password = password_or_prompt(password, "Password")?;
    let session = context.client()?.sign_in(&email, &password).await?;
    context.sessions().save(&session)?;
    add_breadcrumb("auth", "Signed in", None);
    println!("Signed in as {email}.");
    Ok(())
}

async fn logout(context: &Context) -> Result<(), AppError> {
    let sessions = context.sessions();
    if let Some(session) = sessions.load()? {
        // The local session goes regardless of what the server says.
        let revoked = match context.client() {
            Ok(client) => client.with_session(&session).sign_out().await,
            Err(e) => {
                tracing::debug!(error = %e, "Backend not configured, skipping remote sign-out");
                Ok(())
            }
        };
        if let Err(e) = revoked {
            tracing::warn!(error = %e, "Remote sign-out failed");
        }
    }
    sessions.clear()?;
    clear_sentry_user();
    println!("Signed out.");
    Ok(())
}

async fn whoami(context: &Context) -> Result<(), AppError> {
    let signed_in = context.require_sign_in().await?;
    let user = signed_in.client.get_user().await?;
    let email = user
        .email
        .as_ref()
        .map_or_else(|| "(no email)".to_string(), ToString::to_string);
    println!("{email} [{}]", user.id);
    if user.email_confirmed_at.is_none() {
        println!("Email address not confirmed yet.");
    }
    Ok(())
}

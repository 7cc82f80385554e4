//! The `users` table: one profile row per account.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use takeout_core::{Email, UserId};
use tracing::{info, instrument};

use super::{BackendClient, BackendError, eq, single};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<Email>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Default delivery address.
    #[serde(default)]
    pub address: Option<String>,
}

/// Profile row created right after signup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewProfile {
    pub id: UserId,
    pub email: Email,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

/// Fields to change. `None` leaves a column as it is; blank strings are
/// sent as-is so a field can be emptied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl ProfileUpdate {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.full_name.is_none() && self.phone.is_none() && self.address.is_none()
    }
}

impl BackendClient {
    /// The profile row for a user.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotFound`] if the user has no profile row.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_profile(&self, user_id: &UserId) -> Result<Profile, BackendError> {
        let filter = eq(user_id.as_str());
        let request = self.table(
            Method::GET,
            "users",
            &[("select", "*"), ("id", filter.as_str()), ("limit", "1")],
        )?;
        let rows: Vec<Profile> = Self::send_json(request).await?;
        single(rows, || format!("profile for user {user_id}"))
    }

    /// Insert the profile row for a new account.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    #[instrument(skip(self, profile), fields(user_id = %profile.id))]
    pub async fn create_profile(&self, profile: &NewProfile) -> Result<(), BackendError> {
        let request = self
            .table(Method::POST, "users", &[])?
            .header("Prefer", "return=minimal")
            .json(profile);
        Self::send_empty(request).await
    }

    /// Apply an update and return the stored row.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Validation`] for an empty update and
    /// [`BackendError::NotFound`] if the user has no profile row.
    #[instrument(skip(self, update), fields(user_id = %user_id))]
    pub async fn update_profile(
        &self,
        user_id: &UserId,
        update: &ProfileUpdate,
    ) -> Result<Profile, BackendError> {
        if update.is_empty() {
            return Err(BackendError::Validation("nothing to update".to_string()));
        }

        let filter = eq(user_id.as_str());
        let request = self
            .table(Method::PATCH, "users", &[("id", filter.as_str())])?
            .header("Prefer", "return=representation")
            .json(update);
        let rows: Vec<Profile> = Self::send_json(request).await?;
        let profile = single(rows, || format!("profile for user {user_id}"))?;
        info!("Profile updated");
        Ok(profile)
    }
}

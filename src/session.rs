//! Provider-issued session and user records.
//!
//! DESIGN
//! ======
//! Sessions are owned by the provider and mirrored here as transient state.
//! The one piece of local business logic is the tenant tag: users created by
//! any deployment carry an `app_id` string in their metadata, and a session
//! only counts as belonging to this deployment when that tag is absent
//! (legacy accounts) or equal to the configured tag.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Metadata key holding the tenant tag.
pub const APP_ID_KEY: &str = "app_id";

/// Provider identity record for an authenticated user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    /// Provider-assigned user id.
    pub id: Uuid,
    /// Sign-in email, when the provider discloses it.
    pub email: Option<String>,
    /// Free-form metadata attached at sign-up. Holds the tenant tag.
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

impl AuthUser {
    /// The tenant tag embedded in user metadata, if any.
    #[must_use]
    pub fn app_id(&self) -> Option<&str> {
        self.user_metadata.get(APP_ID_KEY).and_then(|v| v.as_str())
    }

    /// Whether this user belongs to the deployment tagged `app_id`.
    /// Untagged users pass: accounts predating tagging are accepted.
    #[must_use]
    pub fn belongs_to(&self, app_id: &str) -> bool {
        match self.app_id() {
            Some(tag) => tag == app_id,
            None => true,
        }
    }
}

/// Credential bundle issued by the provider on sign-in or refresh.
#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Instant the access token expires, per the provider's `expires_in`.
    pub expires_at: OffsetDateTime,
    pub user: AuthUser,
}

impl Session {
    /// Seconds until the access token should be refreshed. Zero when the
    /// token is already due (or past due).
    #[must_use]
    pub fn refresh_in_secs(&self, now: OffsetDateTime, margin_secs: i64) -> u64 {
        let due = self.expires_at - time::Duration::seconds(margin_secs);
        let remaining = (due - now).whole_seconds();
        u64::try_from(remaining).unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

//! Thoughts client — create, list, delete against the remote table.
//!
//! Deliberately thin: no client-side validation, caching, retry, or
//! pagination. Row-level security on the provider scopes list and delete to
//! the caller's own rows; the one client-side rule is that saving requires a
//! live authenticated user.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{AuthError, DataError};
use crate::provider::{AuthApi, ThoughtsApi};

/// A persisted thought row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thought {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    /// Optional follow-up ideas attached to the thought, in order.
    pub ideas: Option<Vec<String>>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Insert payload; id and timestamp are server-assigned.
#[derive(Debug, Clone, Serialize)]
pub struct NewThought {
    pub user_id: Uuid,
    pub content: String,
    pub ideas: Option<Vec<String>>,
}

/// Client for the caller's thoughts.
pub struct ThoughtsClient<P> {
    provider: Arc<P>,
}

impl<P> ThoughtsClient<P>
where
    P: AuthApi + ThoughtsApi,
{
    #[must_use]
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    /// Persist a thought for the authenticated user and return it with the
    /// server-assigned id and timestamp.
    pub async fn save(&self, content: &str, ideas: Vec<String>) -> Result<Thought, DataError> {
        let user = match self.provider.get_user().await {
            Ok(Some(user)) => user,
            Ok(None) => return Err(DataError::NotAuthenticated),
            // Carry the backend's own message through without re-wrapping.
            Err(AuthError::Provider(msg)) => return Err(DataError::Provider(msg)),
            Err(e) => return Err(DataError::Provider(e.to_string())),
        };

        let row = NewThought {
            user_id: user.id,
            content: content.to_owned(),
            ideas: Some(ideas),
        };
        self.provider.insert(&row).await
    }

    /// All thoughts visible to the caller, newest first.
    pub async fn list(&self) -> Result<Vec<Thought>, DataError> {
        self.provider.select_all().await
    }

    /// Delete a thought by id. Deleting another user's row is rejected
    /// server-side and surfaces as a provider error.
    pub async fn delete(&self, id: Uuid) -> Result<(), DataError> {
        self.provider.delete(id).await
    }
}

#[cfg(test)]
#[path = "thoughts_test.rs"]
mod tests;

//! Backend provider boundary.
//!
//! ARCHITECTURE
//! ============
//! The guard and thoughts client never speak HTTP directly; they depend on
//! these traits so tests can substitute an in-process provider. [`http`]
//! holds the production implementation. The provider handle owns the current
//! session (the SDK-style session store) and fans auth state changes out on a
//! broadcast channel that the guard consumes.

pub mod http;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{AuthError, DataError};
use crate::session::{AuthUser, Session};
use crate::thoughts::{NewThought, Thought};

pub use http::HttpProvider;

/// Capacity of the auth event channel. Events are tiny and consumers keep
/// up; overflow is treated as a fatal subscription failure by the guard.
pub const AUTH_EVENT_CAPACITY: usize = 16;

/// Auth state change emitted by the provider.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    /// A session was established (sign-in, or sign-up that returned tokens).
    SignedIn(Session),
    /// The access token was renewed; the session user is unchanged.
    TokenRefreshed(Session),
    /// The session ended (explicit sign-out or failed refresh).
    SignedOut,
}

/// Auth API: sign-up, password sign-in, sign-out, session state, events.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Create an account with the given metadata attached to the user.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: serde_json::Value,
    ) -> Result<(), AuthError>;

    /// Password sign-in. On success the provider stores the session and
    /// emits [`AuthEvent::SignedIn`].
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    /// Revoke the current session, clear local session state, and emit
    /// [`AuthEvent::SignedOut`]. A no-op when no session is held.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// The session currently held by the provider handle, if any.
    async fn current_session(&self) -> Result<Option<Session>, AuthError>;

    /// Fetch the authenticated user for the current session, or `None` when
    /// signed out.
    async fn get_user(&self) -> Result<Option<AuthUser>, AuthError>;

    /// Subscribe to auth state changes.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

/// Table API for the `thoughts` table. Row-level security on the provider
/// scopes reads and deletes to the caller's own rows.
#[async_trait]
pub trait ThoughtsApi: Send + Sync {
    /// Insert a row and return it with server-assigned id and timestamp.
    async fn insert(&self, row: &NewThought) -> Result<Thought, DataError>;

    /// All rows visible to the caller, newest first.
    async fn select_all(&self) -> Result<Vec<Thought>, DataError>;

    /// Delete the row with the given id.
    async fn delete(&self, id: Uuid) -> Result<(), DataError>;
}

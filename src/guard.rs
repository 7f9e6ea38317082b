//! Session guard — tenant-validated auth state over the provider.
//!
//! ARCHITECTURE
//! ============
//! One task owns the published state: it runs the initial session check,
//! then consumes the provider's auth event stream sequentially. Every
//! session, including the initial one, passes the tenant-tag rule before it
//! is published; a foreign tag clears local state and revokes the provider
//! session. Consumers watch [`GuardState`] through the handle returned by
//! [`SessionGuard::spawn`].
//!
//! ERROR HANDLING
//! ==============
//! A sign-in that lands on a foreign-tagged account reports the same generic
//! `AccountNotFound` a nonexistent account would, so tenant membership is
//! not probeable. Loss of the event subscription is fatal: the task stops
//! and later commands fail with `GuardClosed` until the guard is respawned.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::AuthError;
use crate::provider::{AuthApi, AuthEvent};
use crate::session::{APP_ID_KEY, AuthUser, Session};

/// Auth state published to consumers.
#[derive(Debug, Clone)]
pub struct GuardState {
    pub user: Option<AuthUser>,
    pub session: Option<Session>,
    /// True until the initial session check completes.
    pub loading: bool,
}

impl GuardState {
    fn initial() -> Self {
        Self { user: None, session: None, loading: true }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }
}

/// Handle to a running guard. State is only reachable through this handle.
pub struct SessionGuard<P> {
    provider: Arc<P>,
    app_id: String,
    state: watch::Receiver<GuardState>,
    task: JoinHandle<()>,
}

impl<P: AuthApi + 'static> SessionGuard<P> {
    /// Start the guard: subscribe to provider auth events, run the initial
    /// session check, and process events until the stream fails.
    #[must_use]
    pub fn spawn(provider: Arc<P>, app_id: impl Into<String>) -> Self {
        let app_id = app_id.into();
        let (tx, rx) = watch::channel(GuardState::initial());
        let events = provider.subscribe();

        let task = tokio::spawn(run(Arc::clone(&provider), app_id.clone(), tx, events));

        Self { provider, app_id, state: rx, task }
    }

    /// Watch receiver for the published auth state.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<GuardState> {
        self.state.clone()
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn current(&self) -> GuardState {
        self.state.borrow().clone()
    }

    /// Create an account tagged with this deployment's tenant id.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<(), AuthError> {
        self.ensure_running()?;
        let metadata = serde_json::json!({ APP_ID_KEY: self.app_id });
        self.provider.sign_up(email, password, metadata).await
    }

    /// Password sign-in. A session carrying a foreign tenant tag is revoked
    /// immediately and reported as `AccountNotFound`.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthError> {
        self.ensure_running()?;
        let session = self.provider.sign_in(email, password).await?;

        if !session.user.belongs_to(&self.app_id) {
            let _ = self.provider.sign_out().await;
            return Err(AuthError::AccountNotFound);
        }
        Ok(())
    }

    /// End the current session.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.ensure_running()?;
        self.provider.sign_out().await
    }

    fn ensure_running(&self) -> Result<(), AuthError> {
        if self.task.is_finished() {
            return Err(AuthError::GuardClosed);
        }
        Ok(())
    }
}

impl<P> Drop for SessionGuard<P> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Guard task: initial check, then sequential event processing.
async fn run<P: AuthApi>(
    provider: Arc<P>,
    app_id: String,
    tx: watch::Sender<GuardState>,
    mut events: broadcast::Receiver<AuthEvent>,
) {
    let initial = match provider.current_session().await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "initial session check failed");
            None
        }
    };
    let validated = validate(provider.as_ref(), &app_id, initial).await;
    publish(&tx, validated, false);
    info!("session guard ready");

    loop {
        match events.recv().await {
            Ok(AuthEvent::SignedIn(session) | AuthEvent::TokenRefreshed(session)) => {
                let validated = validate(provider.as_ref(), &app_id, Some(session)).await;
                publish(&tx, validated, false);
            }
            Ok(AuthEvent::SignedOut) => {
                publish(&tx, None, false);
            }
            Err(RecvError::Closed) => {
                info!("auth event stream closed; guard stopping");
                break;
            }
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "auth event stream lagged; guard stopping");
                break;
            }
        }
    }
}

/// Apply the tenant rule: a foreign-tagged session is revoked and never
/// published. Untagged sessions pass.
async fn validate<P: AuthApi>(provider: &P, app_id: &str, session: Option<Session>) -> Option<Session> {
    let session = session?;
    if session.user.belongs_to(app_id) {
        return Some(session);
    }

    warn!(user = %session.user.id, "session carries foreign tenant tag; signing out");
    if let Err(e) = provider.sign_out().await {
        warn!(error = %e, "revoking mismatched session failed");
    }
    None
}

fn publish(tx: &watch::Sender<GuardState>, session: Option<Session>, loading: bool) {
    let user = session.as_ref().map(|s| s.user.clone());
    let _ = tx.send(GuardState { user, session, loading });
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;

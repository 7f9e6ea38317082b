//! In-process provider used by guard and thoughts-client tests.
//!
//! Mirrors the backend contract closely enough for the properties under
//! test: accounts keyed by email, one in-memory session slot, strictly
//! increasing row timestamps, and row filtering scoped to the session user
//! the way row-level security would.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{AUTH_EVENT_CAPACITY, AuthApi, AuthEvent, ThoughtsApi};
use crate::error::{AuthError, DataError};
use crate::session::{AuthUser, Session};
use crate::thoughts::{NewThought, Thought};

struct Account {
    password: String,
    user: AuthUser,
}

pub(crate) struct MockProvider {
    accounts: Mutex<HashMap<String, Account>>,
    session: Mutex<Option<Session>>,
    rows: Mutex<Vec<Thought>>,
    seq: AtomicI64,
    sign_outs: AtomicUsize,
    get_user_error: Mutex<Option<String>>,
    events: broadcast::Sender<AuthEvent>,
}

impl MockProvider {
    pub(crate) fn new() -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            accounts: Mutex::new(HashMap::new()),
            session: Mutex::new(None),
            rows: Mutex::new(Vec::new()),
            seq: AtomicI64::new(0),
            sign_outs: AtomicUsize::new(0),
            get_user_error: Mutex::new(None),
            events,
        }
    }

    /// Preseed an account with arbitrary metadata (e.g. a foreign tag).
    pub(crate) fn register(
        &self,
        email: &str,
        password: &str,
        metadata: serde_json::Value,
    ) -> AuthUser {
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: Some(email.to_owned()),
            user_metadata: metadata,
        };
        self.accounts.lock().unwrap().insert(
            email.to_owned(),
            Account { password: password.to_owned(), user: user.clone() },
        );
        user
    }

    pub(crate) fn make_session(user: AuthUser) -> Session {
        Session {
            access_token: format!("token-{}", Uuid::new_v4()),
            refresh_token: format!("refresh-{}", Uuid::new_v4()),
            expires_at: OffsetDateTime::now_utc() + time::Duration::hours(1),
            user,
        }
    }

    /// Place a session in the slot without emitting an event, as if it were
    /// restored from provider-managed storage before startup.
    pub(crate) fn set_session(&self, session: Session) {
        *self.session.lock().unwrap() = Some(session);
    }

    pub(crate) fn emit(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn sign_out_count(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }

    /// Make `get_user` fail with the given backend message.
    pub(crate) fn fail_get_user(&self, msg: &str) {
        *self.get_user_error.lock().unwrap() = Some(msg.to_owned());
    }

    pub(crate) fn metadata_for(&self, email: &str) -> Option<serde_json::Value> {
        self.accounts
            .lock()
            .unwrap()
            .get(email)
            .map(|a| a.user.user_metadata.clone())
    }

    fn adopt(&self, session: Session) {
        *self.session.lock().unwrap() = Some(session.clone());
        let _ = self.events.send(AuthEvent::SignedIn(session));
    }
}

#[async_trait]
impl AuthApi for MockProvider {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: serde_json::Value,
    ) -> Result<(), AuthError> {
        if self.accounts.lock().unwrap().contains_key(email) {
            return Err(AuthError::Provider("user already registered".into()));
        }
        let user = self.register(email, password, metadata);
        // Confirmation disabled: sign-up yields a live session.
        self.adopt(Self::make_session(user));
        Ok(())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let user = {
            let accounts = self.accounts.lock().unwrap();
            let account = accounts.get(email).ok_or(AuthError::InvalidCredentials)?;
            if account.password != password {
                return Err(AuthError::InvalidCredentials);
            }
            account.user.clone()
        };
        let session = Self::make_session(user);
        self.adopt(session.clone());
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        *self.session.lock().unwrap() = None;
        let _ = self.events.send(AuthEvent::SignedOut);
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<Session>, AuthError> {
        Ok(self.session.lock().unwrap().clone())
    }

    async fn get_user(&self) -> Result<Option<AuthUser>, AuthError> {
        if let Some(msg) = self.get_user_error.lock().unwrap().clone() {
            return Err(AuthError::Provider(msg));
        }
        Ok(self.session.lock().unwrap().as_ref().map(|s| s.user.clone()))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl ThoughtsApi for MockProvider {
    async fn insert(&self, row: &NewThought) -> Result<Thought, DataError> {
        if self.session.lock().unwrap().is_none() {
            return Err(DataError::Provider("401: permission denied".into()));
        }
        let n = self.seq.fetch_add(1, Ordering::SeqCst);
        let thought = Thought {
            id: Uuid::new_v4(),
            user_id: row.user_id,
            content: row.content.clone(),
            ideas: row.ideas.clone(),
            created_at: OffsetDateTime::now_utc() + time::Duration::seconds(n),
        };
        self.rows.lock().unwrap().push(thought.clone());
        Ok(thought)
    }

    async fn select_all(&self) -> Result<Vec<Thought>, DataError> {
        let caller = self.session.lock().unwrap().as_ref().map(|s| s.user.id);
        let mut rows: Vec<Thought> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|t| Some(t.user_id) == caller)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn delete(&self, id: Uuid) -> Result<(), DataError> {
        let caller = self.session.lock().unwrap().as_ref().map(|s| s.user.id);
        self.rows
            .lock()
            .unwrap()
            .retain(|t| !(t.id == id && Some(t.user_id) == caller));
        Ok(())
    }
}

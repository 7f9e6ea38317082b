//! HTTP provider — GoTrue-style auth plus PostgREST-style table access.
//!
//! DESIGN
//! ======
//! One handle owns the reqwest client, the in-memory session slot, and the
//! auth event channel. Sign-in stores the returned session, emits
//! `SignedIn`, and starts a refresh loop that renews the access token
//! shortly before expiry; a failed renewal ends the session (`SignedOut`).
//! Table requests carry the current access token when a session is held and
//! fall back to the anon key otherwise, leaving row security to the server.
//!
//! ERROR HANDLING
//! ==============
//! No retries. Credential rejections map to `InvalidCredentials`; everything
//! else propagates as a provider error carrying the backend's own message.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use time::OffsetDateTime;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{AUTH_EVENT_CAPACITY, AuthApi, AuthEvent, ThoughtsApi};
use crate::config::AppConfig;
use crate::error::{AuthError, DataError};
use crate::session::{AuthUser, Session};
use crate::thoughts::{NewThought, Thought};

/// Seconds before expiry at which the refresh loop renews the token.
const REFRESH_MARGIN_SECS: i64 = 30;

const THOUGHTS_TABLE: &str = "thoughts";

/// Token bundle as the auth API returns it.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self, now: OffsetDateTime) -> Session {
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: now + time::Duration::seconds(self.expires_in),
            user: self.user,
        }
    }
}

/// Production provider speaking HTTP to a Supabase-style backend.
#[derive(Clone)]
pub struct HttpProvider {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    session: Mutex<Option<Session>>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<AuthEvent>,
}

impl HttpProvider {
    #[must_use]
    pub fn new(config: &AppConfig) -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                http: reqwest::Client::new(),
                base_url: config.provider_url.trim_end_matches('/').to_owned(),
                anon_key: config.anon_key.clone(),
                session: Mutex::new(None),
                refresh_task: Mutex::new(None),
                events,
            }),
        }
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.inner.base_url)
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{THOUGHTS_TABLE}", self.inner.base_url)
    }

    async fn bearer_token(&self) -> String {
        let session = self.inner.session.lock().await;
        session
            .as_ref()
            .map_or_else(|| self.inner.anon_key.clone(), |s| s.access_token.clone())
    }

    /// Store a session, emit the event, and (re)start the refresh loop.
    async fn adopt_session(&self, session: Session, refreshed: bool) {
        *self.inner.session.lock().await = Some(session.clone());

        let event = if refreshed {
            AuthEvent::TokenRefreshed(session.clone())
        } else {
            AuthEvent::SignedIn(session.clone())
        };
        let _ = self.inner.events.send(event);

        let provider = self.clone();
        let handle = tokio::spawn(refresh_loop(provider, session));
        if let Some(prev) = self.inner.refresh_task.lock().await.replace(handle) {
            prev.abort();
        }
    }

    /// Drop the local session and announce the sign-out. The refresh task is
    /// stopped before the slot is cleared so an in-flight renewal cannot
    /// rewrite it after sign-out.
    async fn end_session(&self) {
        if let Some(task) = self.inner.refresh_task.lock().await.take() {
            task.abort();
        }
        *self.inner.session.lock().await = None;
        let _ = self.inner.events.send(AuthEvent::SignedOut);
    }

    /// `refresh_token` grant. Does not touch the session slot; the refresh
    /// loop decides what to do with the outcome.
    async fn refresh_grant(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let resp = self
            .inner
            .http
            .post(self.auth_url("token"))
            .query(&[("grant_type", "refresh_token")])
            .header("apikey", &self.inner.anon_key)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::Provider(provider_error_message(
                status.as_u16(),
                &body,
            )));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;
        Ok(token.into_session(OffsetDateTime::now_utc()))
    }
}

/// Renew the access token before it expires, until renewal fails or the
/// session is replaced (the task is aborted on sign-out and new sign-in).
async fn refresh_loop(provider: HttpProvider, mut session: Session) {
    loop {
        let delay = session.refresh_in_secs(OffsetDateTime::now_utc(), REFRESH_MARGIN_SECS);
        tokio::time::sleep(Duration::from_secs(delay)).await;

        match provider.refresh_grant(&session.refresh_token).await {
            Ok(next) => {
                debug!(user = %next.user.id, "access token refreshed");
                *provider.inner.session.lock().await = Some(next.clone());
                let _ = provider
                    .inner
                    .events
                    .send(AuthEvent::TokenRefreshed(next.clone()));
                session = next;
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed; ending session");
                *provider.inner.session.lock().await = None;
                let _ = provider.inner.events.send(AuthEvent::SignedOut);
                break;
            }
        }
    }
}

/// Pull the human-readable message out of an auth/table error body.
/// The backend is inconsistent about the field name across endpoints.
fn provider_error_message(status: u16, body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|v| {
        ["error_description", "msg", "message", "error"]
            .iter()
            .find_map(|key| v.get(key).and_then(|m| m.as_str()))
            .map(str::to_owned)
    });
    match message {
        Some(m) => format!("{status}: {m}"),
        None => format!("{status}: {body}"),
    }
}

#[async_trait]
impl AuthApi for HttpProvider {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: serde_json::Value,
    ) -> Result<(), AuthError> {
        let resp = self
            .inner
            .http
            .post(self.auth_url("signup"))
            .header("apikey", &self.inner.anon_key)
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "data": metadata,
            }))
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::Provider(provider_error_message(
                status.as_u16(),
                &body,
            )));
        }

        // With email confirmation disabled the signup response is a full
        // token bundle; adopt it so the guard sees the new session.
        let body = resp
            .text()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;
        if let Ok(token) = serde_json::from_str::<TokenResponse>(&body) {
            self.adopt_session(token.into_session(OffsetDateTime::now_utc()), false)
                .await;
        }
        Ok(())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let resp = self
            .inner
            .http
            .post(self.auth_url("token"))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.inner.anon_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::UNAUTHORIZED
        {
            return Err(AuthError::InvalidCredentials);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::Provider(provider_error_message(
                status.as_u16(),
                &body,
            )));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;
        let session = token.into_session(OffsetDateTime::now_utc());
        self.adopt_session(session.clone(), false).await;
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let token = {
            let session = self.inner.session.lock().await;
            session.as_ref().map(|s| s.access_token.clone())
        };
        let Some(token) = token else {
            return Ok(());
        };

        // Local state is cleared regardless of whether revocation reaches
        // the backend; a stale server-side token expires on its own.
        self.end_session().await;

        let resp = self
            .inner
            .http
            .post(self.auth_url("logout"))
            .header("apikey", &self.inner.anon_key)
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::Provider(provider_error_message(
                status.as_u16(),
                &body,
            )));
        }
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<Session>, AuthError> {
        Ok(self.inner.session.lock().await.clone())
    }

    async fn get_user(&self) -> Result<Option<AuthUser>, AuthError> {
        let token = {
            let session = self.inner.session.lock().await;
            session.as_ref().map(|s| s.access_token.clone())
        };
        let Some(token) = token else {
            return Ok(None);
        };

        let resp = self
            .inner
            .http
            .get(self.auth_url("user"))
            .header("apikey", &self.inner.anon_key)
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::Provider(provider_error_message(
                status.as_u16(),
                &body,
            )));
        }

        let user: AuthUser = resp
            .json()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;
        Ok(Some(user))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }
}

#[async_trait]
impl ThoughtsApi for HttpProvider {
    async fn insert(&self, row: &NewThought) -> Result<Thought, DataError> {
        let bearer = self.bearer_token().await;
        let resp = self
            .inner
            .http
            .post(self.table_url())
            .header("apikey", &self.inner.anon_key)
            .header("Authorization", format!("Bearer {bearer}"))
            .header("Prefer", "return=representation")
            .header("Accept", "application/vnd.pgrst.object+json")
            .json(row)
            .send()
            .await
            .map_err(|e| DataError::Provider(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(DataError::Provider(provider_error_message(
                status.as_u16(),
                &body,
            )));
        }

        resp.json::<Thought>()
            .await
            .map_err(|e| DataError::Provider(e.to_string()))
    }

    async fn select_all(&self) -> Result<Vec<Thought>, DataError> {
        let bearer = self.bearer_token().await;
        let resp = self
            .inner
            .http
            .get(self.table_url())
            .query(&[("select", "*"), ("order", "created_at.desc")])
            .header("apikey", &self.inner.anon_key)
            .header("Authorization", format!("Bearer {bearer}"))
            .send()
            .await
            .map_err(|e| DataError::Provider(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(DataError::Provider(provider_error_message(
                status.as_u16(),
                &body,
            )));
        }

        resp.json::<Vec<Thought>>()
            .await
            .map_err(|e| DataError::Provider(e.to_string()))
    }

    async fn delete(&self, id: Uuid) -> Result<(), DataError> {
        let bearer = self.bearer_token().await;
        let resp = self
            .inner
            .http
            .delete(self.table_url())
            .query(&[("id", format!("eq.{id}"))])
            .header("apikey", &self.inner.anon_key)
            .header("Authorization", format!("Bearer {bearer}"))
            .send()
            .await
            .map_err(|e| DataError::Provider(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(DataError::Provider(provider_error_message(
                status.as_u16(),
                &body,
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;

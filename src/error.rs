//! Error taxonomy shared across the guard and the thoughts client.
//!
//! Tenant mismatch is reported as the same generic "account not found" a bad
//! credential gets, so callers cannot probe which deployment an email belongs
//! to. Backend and network failures pass through unchanged as strings.

/// Authentication failures surfaced by the guard and the auth provider.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("account not found")]
    AccountNotFound,
    #[error("session guard is not running")]
    GuardClosed,
    #[error("provider error: {0}")]
    Provider(String),
}

/// Data-access failures surfaced by the thoughts client and table API.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("provider error: {0}")]
    Provider(String),
}

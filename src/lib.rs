//! thoughtpad — session-guarded client for the thoughts backend.
//!
//! ARCHITECTURE
//! ============
//! Everything stateful lives behind the external provider (auth + row-secured
//! table API). This crate is the application core a view layer binds to:
//!
//! - [`provider`] — the backend boundary: `AuthApi` / `ThoughtsApi` traits and
//!   the production HTTP implementation.
//! - [`guard`] — session guard: validates every provider session against the
//!   deployment's tenant tag before publishing it, and exposes
//!   sign-up/sign-in/sign-out.
//! - [`thoughts`] — create/list/delete against the `thoughts` table, scoped
//!   to the authenticated caller.
//!
//! Accounts from sibling deployments share one provider project and are
//! distinguished by an `app_id` tag in user metadata; the guard never lets a
//! foreign-tagged session reach consumers as authenticated.

pub mod config;
pub mod error;
pub mod guard;
pub mod provider;
pub mod session;
pub mod thoughts;

pub use config::AppConfig;
pub use error::{AuthError, DataError};
pub use guard::{GuardState, SessionGuard};
pub use session::{AuthUser, Session};
pub use thoughts::{Thought, ThoughtsClient};

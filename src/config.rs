//! Deployment configuration loaded from environment variables.

/// Configuration for one deployment sharing the provider project.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the provider, e.g. `https://xyz.supabase.co`.
    pub provider_url: String,
    /// Public (anon) API key sent with every request.
    pub anon_key: String,
    /// Tenant tag stamped into user metadata at sign-up and checked on every
    /// session before it is treated as authenticated.
    pub app_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
}

impl AppConfig {
    /// Load from `PROVIDER_URL`, `PROVIDER_ANON_KEY`, and `APP_ID`.
    /// A `.env` file is honored when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let provider_url = require("PROVIDER_URL")?.trim_end_matches('/').to_owned();
        let anon_key = require("PROVIDER_ANON_KEY")?;
        let app_id = require("APP_ID")?;

        Ok(Self { provider_url, anon_key, app_id })
    }
}

fn require(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingVar(key))
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

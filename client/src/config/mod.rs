//! Central module for client configuration settings.
//!
//! This module loads the backend location, transport timeout, optional
//! on-disk credential persistence, and the login used by the `helpdesk`
//! binary from the environment (and a `.env` file when present).

use anyhow::{Context, Result, bail};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_seconds: u64,
    pub credential_file: Option<PathBuf>,
    pub encryption_key: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let api_base_url = env::var("HELPDESK_API_URL").context("HELPDESK_API_URL not set")?;
        let api_base_url = normalize_base_url(&api_base_url)?;

        let request_timeout_seconds = env::var("HELPDESK_REQUEST_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u64>()
            .context("HELPDESK_REQUEST_TIMEOUT_SECONDS must be a valid number")?;

        let credential_file = env::var("HELPDESK_CREDENTIAL_FILE").ok().map(PathBuf::from);

        let encryption_key = env::var("HELPDESK_ENCRYPTION_KEY").ok();
        if credential_file.is_some() && encryption_key.is_none() {
            bail!("HELPDESK_ENCRYPTION_KEY must be set when HELPDESK_CREDENTIAL_FILE is used");
        }

        Ok(Config {
            api_base_url,
            request_timeout_seconds,
            credential_file,
            encryption_key,
            username: env::var("HELPDESK_USERNAME").ok(),
            password: env::var("HELPDESK_PASSWORD").ok(),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Trims whitespace and trailing slashes so paths like `/api/me/` can be
/// appended directly.
pub fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        bail!("HELPDESK_API_URL must start with http:// or https://, got '{}'", raw);
    }
    Ok(trimmed.to_string())
}

//! Data structures for authentication-related payloads.
//!
//! This module defines the credential pair held by the client and the
//! request/response bodies of the token, refresh, and logout endpoints.

use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use validator::Validate;

/// Access/refresh token pair identifying an authenticated session.
///
/// The pair is always stored and replaced as a unit.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

// Tokens must never reach the logs.
impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Login request payload
#[derive(Serialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

impl LoginRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into().trim().to_string(),
            password: password.into(),
        }
    }
}

/// Token pair issued by `/api/token/`
#[derive(Debug, Deserialize)]
pub struct TokenPairResponse {
    pub access: String,
    pub refresh: String,
}

impl From<TokenPairResponse> for Credential {
    fn from(pair: TokenPairResponse) -> Self {
        Credential::new(pair.access, pair.refresh)
    }
}

/// Token refresh request, also the body of the logout call
#[derive(Debug, Serialize)]
pub struct RefreshTokenRequest {
    pub refresh: String,
}

/// Token refresh response. `refresh` is present only when the backend
/// rotates refresh tokens.
#[derive(Debug, Deserialize)]
pub struct RefreshTokenResponse {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

impl RefreshTokenResponse {
    /// Builds the replacement pair, keeping the old refresh token unless a
    /// rotated one was issued.
    pub fn into_credential(self, previous_refresh: String) -> Credential {
        Credential::new(self.access, self.refresh.unwrap_or(previous_refresh))
    }
}

//! Session lifecycle: login, role discovery, and logout.

use crate::api::client::AuthenticatedClient;
use crate::api::common;
use crate::auth::models::{Credential, LoginRequest, RefreshTokenRequest, TokenPairResponse};
use crate::errors::{ClientError, ClientResult};
use crate::models::{Profile, Role};
use reqwest::Method;
use serde_json::Value;
use tracing::{info, warn};
use validator::Validate;

pub const LOGIN_PATH: &str = "/api/token/";
pub const LOGOUT_PATH: &str = "/api/logout/";
pub const PROFILE_PATH: &str = "/api/me/";

/// Authentication service for login, role lookup, and logout
#[derive(Clone)]
pub struct AuthService {
    client: AuthenticatedClient,
}

impl AuthService {
    pub fn new(client: AuthenticatedClient) -> Self {
        Self { client }
    }

    /// Exchanges username/password for a credential pair, stores it, and
    /// caches the user's role.
    ///
    /// Any previous session is discarded first. If the role cannot be
    /// resolved the new session is cleared again, so a half-established
    /// login never lingers in the store.
    pub async fn login(&self, login_request: LoginRequest) -> ClientResult<Profile> {
        login_request.validate()?;

        let body = serde_json::to_value(&login_request)
            .map_err(|e| ClientError::protocol(e.to_string()))?;
        let response = self
            .client
            .anonymous(Method::POST, LOGIN_PATH, Some(body))
            .await?;

        let pair: TokenPairResponse = match response.status {
            200..=299 => common::decode(&response.body)?,
            401 => return Err(ClientError::InvalidCredentials),
            status => return Err(common::classify(status, &response.body)),
        };

        let store = self.client.store();
        store.clear()?;
        store.set(Credential::from(pair))?;

        match self.profile().await {
            Ok(profile) => {
                info!("Logged in as {} ({})", profile.username, profile.role);
                Ok(profile)
            }
            Err(error) => {
                warn!("Could not resolve profile after login: {}", error);
                store.clear()?;
                Err(error)
            }
        }
    }

    /// Fetches the current user's profile and caches the role.
    pub async fn profile(&self) -> ClientResult<Profile> {
        let profile: Profile = self.client.request(Method::GET, PROFILE_PATH, None).await?;
        self.client.store().set_role(profile.role)?;
        Ok(profile)
    }

    /// The cached role, falling back to `/api/me/` once per session.
    pub async fn current_role(&self) -> ClientResult<Role> {
        if let Some(role) = self.client.store().role()? {
            return Ok(role);
        }
        Ok(self.profile().await?.role)
    }

    /// Whether a credential is currently stored.
    pub fn is_authenticated(&self) -> ClientResult<bool> {
        Ok(self.client.store().get()?.is_some())
    }

    /// Blacklists the refresh token on the backend (best effort) and clears
    /// the local session unconditionally.
    pub async fn logout(&self) -> ClientResult<()> {
        let store = self.client.store();

        if let Some(credential) = store.get()? {
            let body = serde_json::to_value(RefreshTokenRequest {
                refresh: credential.refresh_token,
            })
            .map_err(|e| ClientError::protocol(e.to_string()))?;

            match self
                .client
                .request::<Value>(Method::POST, LOGOUT_PATH, Some(body))
                .await
            {
                Ok(_) => info!("Logged out"),
                Err(error) => warn!("Logout request failed, clearing local session anyway: {}", error),
            }
        }

        store.clear()
    }
}

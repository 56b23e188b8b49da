//! Session facade.
//!
//! A [`Session`] bundles everything a UI needs for one signed-in user: the
//! authenticated client, the auth and ticket services, the role-derived
//! navigation, and a factory for ticket workflows.

use crate::api::client::AuthenticatedClient;
use crate::api::transport::{ReqwestTransport, Transport};
use crate::auth::gate::{NavItem, RoleGate};
use crate::auth::models::LoginRequest;
use crate::auth::service::AuthService;
use crate::auth::store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
use crate::config::Config;
use crate::errors::ClientResult;
use crate::models::{Profile, Role};
use crate::services::ticket_service::TicketService;
use crate::services::workflow::TicketWorkflow;
use crate::utils::crypto::StringCrypto;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct Session {
    client: AuthenticatedClient,
    auth: AuthService,
    tickets: TicketService,
}

impl Session {
    pub fn new(client: AuthenticatedClient) -> Self {
        Self {
            auth: AuthService::new(client.clone()),
            tickets: TicketService::new(client.clone()),
            client,
        }
    }

    /// Builds a session over HTTP using the configured store.
    ///
    /// With `credential_file` set the session is persisted encrypted on disk
    /// and resumed by the next process; otherwise it lives in memory.
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(
            ReqwestTransport::new(config.request_timeout())
                .context("Failed to build HTTP transport")?,
        );

        let store: Arc<dyn CredentialStore> = match &config.credential_file {
            Some(path) => {
                let key = config
                    .encryption_key
                    .as_deref()
                    .context("HELPDESK_ENCRYPTION_KEY must be set when HELPDESK_CREDENTIAL_FILE is used")?;
                let crypto = StringCrypto::new(key).context("Invalid HELPDESK_ENCRYPTION_KEY")?;
                info!("Persisting session to {}", path.display());
                Arc::new(FileCredentialStore::new(path.clone(), crypto))
            }
            None => Arc::new(MemoryCredentialStore::new()),
        };

        Ok(Self::new(AuthenticatedClient::new(
            config.api_base_url.clone(),
            transport,
            store,
        )))
    }

    pub fn client(&self) -> &AuthenticatedClient {
        &self.client
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub fn tickets(&self) -> &TicketService {
        &self.tickets
    }

    pub async fn login(&self, username: &str, password: &str) -> ClientResult<Profile> {
        self.auth.login(LoginRequest::new(username, password)).await
    }

    pub async fn logout(&self) -> ClientResult<()> {
        self.auth.logout().await
    }

    pub fn is_authenticated(&self) -> ClientResult<bool> {
        self.auth.is_authenticated()
    }

    /// The role cached at login, without any network call.
    pub fn cached_role(&self) -> ClientResult<Option<Role>> {
        self.client.store().role()
    }

    /// The cached role, fetched from the backend if a resumed session has
    /// none yet.
    pub async fn role(&self) -> ClientResult<Role> {
        self.auth.current_role().await
    }

    pub async fn navigation(&self) -> ClientResult<Vec<NavItem>> {
        Ok(RoleGate::visible_nav(self.role().await?))
    }

    /// A fresh workflow for one ticket detail screen, bound to this user's
    /// role.
    pub async fn ticket_workflow(&self) -> ClientResult<TicketWorkflow> {
        let role = self.role().await?;
        Ok(TicketWorkflow::new(self.tickets.clone(), role))
    }
}

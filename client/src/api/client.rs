//! Authenticated access to the HelpDesk backend.
//!
//! [`AuthenticatedClient`] attaches the stored access token to every call and
//! keeps the session alive across access-token expiry:
//!
//! 1. A request answered with 401 triggers a token refresh.
//! 2. Refreshes are coalesced: while one is in flight, every other request
//!    that hits a 401 awaits the same shared future instead of starting its
//!    own, so at most one refresh call is outstanding at any instant.
//! 3. Each rejected request is retried exactly once with the renewed token.
//! 4. A rejected refresh token clears the store and yields
//!    [`ClientError::SessionExpired`].
//!
//! Ordinary requests never take a lock; only the refresh slot is guarded.

use crate::api::common;
use crate::api::transport::{HttpRequest, HttpResponse, Transport};
use crate::auth::models::{Credential, RefreshTokenRequest, RefreshTokenResponse};
use crate::auth::store::CredentialStore;
use crate::errors::{ClientError, ClientResult};
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const REFRESH_PATH: &str = "/api/token/refresh/";

type RefreshFuture = Shared<BoxFuture<'static, ClientResult<Credential>>>;

struct ClientInner {
    base_url: String,
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    /// The in-flight (or most recently finished) refresh.
    refresh_slot: Mutex<Option<RefreshFuture>>,
}

/// Backend client shared by every service of a session. Cheap to clone.
#[derive(Clone)]
pub struct AuthenticatedClient {
    inner: Arc<ClientInner>,
}

impl AuthenticatedClient {
    pub fn new(
        base_url: impl Into<String>,
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            inner: Arc::new(ClientInner {
                base_url,
                transport,
                store,
                refresh_slot: Mutex::new(None),
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.inner.store
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.inner.base_url, path)
    }

    /// Issues an authenticated request and decodes the response body.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> ClientResult<T> {
        self.request_with_query(method, path, &[], body).await
    }

    /// Like [`request`](Self::request), with query parameters.
    pub async fn request_with_query<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<Value>,
    ) -> ClientResult<T> {
        let credential = self
            .inner
            .store
            .get()?
            .ok_or(ClientError::Unauthenticated)?;

        let response = self
            .dispatch(&method, path, query, body.clone(), &credential.access_token)
            .await?;
        if !response.is_unauthorized() {
            return common::into_result(response);
        }

        debug!("{} {} rejected with 401, renewing access token", method, path);
        let renewed = self.renewed_credential(&credential).await?;

        let retried = self
            .dispatch(&method, path, query, body, &renewed.access_token)
            .await?;
        if retried.is_unauthorized() {
            warn!(
                "Renewed access token rejected for {} {}, ending session",
                method, path
            );
            self.inner
                .store
                .swap_if_current(&renewed.refresh_token, None)?;
            return Err(ClientError::SessionExpired);
        }

        common::into_result(retried)
    }

    /// Sends a request without credentials (login). The raw response is
    /// returned so the caller can interpret endpoint-specific statuses.
    pub async fn anonymous(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> ClientResult<HttpResponse> {
        let request = HttpRequest::new(method, self.url(path)).json(body);
        self.inner.transport.send(request).await
    }

    async fn dispatch(
        &self,
        method: &Method,
        path: &str,
        query: &[(String, String)],
        body: Option<Value>,
        access_token: &str,
    ) -> ClientResult<HttpResponse> {
        let request = HttpRequest::new(method.clone(), self.url(path))
            .query(query)
            .bearer(access_token)
            .json(body);
        self.inner.transport.send(request).await
    }

    /// Returns a credential newer than `stale`, refreshing at most once no
    /// matter how many callers ask concurrently.
    async fn renewed_credential(&self, stale: &Credential) -> ClientResult<Credential> {
        let refresh = {
            let mut slot = self.inner.refresh_slot.lock().await;

            match slot.as_ref().filter(|pending| pending.peek().is_none()) {
                Some(pending) => {
                    debug!("Joining in-flight token refresh");
                    pending.clone()
                }
                None => match self.inner.store.get()? {
                    // Cleared by a failed refresh or a logout since our request went out
                    None => return Err(ClientError::SessionExpired),
                    Some(current) if current.access_token != stale.access_token => {
                        debug!("Access token already renewed by a concurrent request");
                        return Ok(current);
                    }
                    Some(current) => {
                        let pending = refresh_credential(
                            Arc::clone(&self.inner.transport),
                            Arc::clone(&self.inner.store),
                            self.url(REFRESH_PATH),
                            current.refresh_token,
                        )
                        .boxed()
                        .shared();
                        *slot = Some(pending.clone());
                        pending
                    }
                },
            }
        };

        refresh.await
    }
}

/// Exchanges the refresh token for a new access token and stores the
/// replacement pair.
///
/// The store is only written while it still holds `refresh_token`. If a new
/// login (or a logout) replaced the session while the call was in flight,
/// the result belongs to a session that no longer exists: nothing is
/// written and the waiters get `SessionExpired`.
///
/// Takes owned handles rather than the client so the stored future does
/// not keep the client alive.
async fn refresh_credential(
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    url: String,
    refresh_token: String,
) -> ClientResult<Credential> {
    info!("Refreshing access token");

    let body = serde_json::to_value(RefreshTokenRequest {
        refresh: refresh_token.clone(),
    })
    .map_err(|e| ClientError::protocol(e.to_string()))?;

    // Transport failures leave the stored pair untouched: it may still be valid.
    let response = transport
        .send(HttpRequest::new(Method::POST, url).json(Some(body)))
        .await?;

    match response.status {
        200..=299 => {
            let renewed: RefreshTokenResponse = common::decode(&response.body)?;
            let credential = renewed.into_credential(refresh_token.clone());
            if !store.swap_if_current(&refresh_token, Some(credential.clone()))? {
                warn!("Session replaced during token refresh, discarding renewed token");
                return Err(ClientError::SessionExpired);
            }
            info!("Access token refreshed");
            Ok(credential)
        }
        400 | 401 => {
            if store.swap_if_current(&refresh_token, None)? {
                warn!("Refresh token rejected, clearing session");
            } else {
                debug!("Refresh token of a replaced session rejected");
            }
            Err(ClientError::SessionExpired)
        }
        status => {
            warn!("Token refresh failed with status {}", status);
            Err(common::classify(status, &response.body))
        }
    }
}

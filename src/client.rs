// Authenticated dispatcher for the portal API
// Attaches the stored credential to every outbound call and recovers
// from token expiry with a single-flight refresh

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::{header, Client, Method, Request, Response, StatusCode};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::refresh;
use crate::auth::types::LoginRequest;
use crate::auth::{Credential, CredentialStore, FlightTicket, RefreshCoordinator, SessionEnvelope};
use crate::error::{ClientError, RefreshError, Result};
use crate::redirect::Navigator;

/// Request paths that must never enter the refresh protocol. A rejected
/// sign-in or refresh call recursing into another refresh would loop
/// forever.
const EXEMPT_PATH_MARKERS: [&str; 3] = ["/login", "/signin", "/refresh-token"];

fn is_auth_failure(status: StatusCode) -> bool {
    matches!(status.as_u16(), 401 | 403)
}

fn is_exempt_path(path: &str) -> bool {
    EXEMPT_PATH_MARKERS
        .iter()
        .any(|marker| path.contains(marker))
}

/// HTTP client for the portal API.
///
/// Every call dispatched through [`execute`](Self::execute) carries the
/// stored bearer credential. On 401/403 the client refreshes the token
/// once, transparently to the caller, serializing concurrent refresh
/// attempts through a [`RefreshCoordinator`]. When recovery is
/// impossible the stored session is dropped and the [`Navigator`] is
/// routed to the role's login entry point.
pub struct PortalClient {
    http: Client,
    origin: String,
    store: CredentialStore,
    coordinator: RefreshCoordinator,
    navigator: Arc<dyn Navigator>,
    refresh_timeout: Duration,
}

impl PortalClient {
    pub fn new(
        origin: &str,
        store: CredentialStore,
        navigator: Arc<dyn Navigator>,
        connect_timeout: Duration,
        request_timeout: Duration,
        refresh_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            origin: origin.trim_end_matches('/').to_string(),
            store,
            coordinator: RefreshCoordinator::new(),
            navigator,
            refresh_timeout,
        })
    }

    /// Credential store this client reads and maintains
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Stored session, if any
    pub fn current_session(&self) -> Option<Credential> {
        self.store.read()
    }

    /// Builder for an arbitrary request against the portal origin.
    /// Finish it with [`execute`](Self::execute) to get credential
    /// attachment and refresh handling.
    pub fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.origin, path))
    }

    /// GET an API path with the session attached
    pub async fn get(&self, path: &str) -> Result<Response> {
        let request = self.request(Method::GET, path).build()?;
        self.execute(request).await
    }

    /// POST a JSON body to an API path with the session attached
    pub async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response> {
        let request = self.request(Method::POST, path).json(body).build()?;
        self.execute(request).await
    }

    /// Dispatch a request with the stored credential attached,
    /// recovering transparently from a single token expiry.
    ///
    /// 401/403 on a non-exempt path triggers the refresh protocol and
    /// exactly one resubmission with the fresh token. Every other error
    /// response is terminal and surfaces unchanged.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        let request_id = Uuid::new_v4();
        let method = request.method().clone();
        let url = request.url().clone();
        let exempt = is_exempt_path(url.path());

        // Attempt count travels with this call, not with the request
        // object: a second 401 after the retry is terminal.
        let mut attempt: u32 = 0;
        let mut fresh_token: Option<String> = None;

        loop {
            let mut outbound = request.try_clone().ok_or_else(|| {
                ClientError::Internal(anyhow::anyhow!("request body is not cloneable"))
            })?;

            let token = match fresh_token.clone() {
                Some(token) => Some(token),
                None => self.store.read().map(|credential| credential.token),
            };
            if let Some(ref token) = token {
                match header::HeaderValue::from_str(&format!("Bearer {token}")) {
                    Ok(value) => {
                        outbound.headers_mut().insert(header::AUTHORIZATION, value);
                    }
                    Err(_) => {
                        // A token that cannot ride in a header is as good
                        // as no token; the endpoint decides what that means
                        tracing::warn!(%request_id, "Stored token is not header-safe, sending unauthenticated");
                    }
                }
            }

            tracing::debug!(%request_id, %method, %url, attempt, "Dispatching portal request");

            let response = self.http.execute(outbound).await?;
            let status = response.status();

            if status.is_success() {
                tracing::debug!(%request_id, %status, "Portal request succeeded");
                return Ok(response);
            }

            if is_auth_failure(status) && attempt == 0 && !exempt {
                tracing::warn!(%request_id, %url, %status, "Credential rejected, entering refresh");
                // The retry is spent before anything suspends, so this
                // call can never refresh twice
                attempt += 1;
                let token = self.refreshed_token().await?;
                fresh_token = Some(token);
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                %request_id,
                %url,
                status = status.as_u16(),
                "Portal request failed"
            );
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
    }

    /// Establish a session: exchange credentials for a token and
    /// persist the resulting identity.
    pub async fn login(&self, email: &str, password: &str) -> Result<Credential> {
        let url = format!("{}/api/login", self.origin);
        let payload = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };

        let response = self
            .http
            .post(&url)
            .header(header::USER_AGENT, refresh::client_user_agent())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let envelope: SessionEnvelope = response.json().await?;
        let credential =
            Credential::from_login(&envelope).map_err(|e| ClientError::Auth(e.to_string()))?;
        self.store.write(&credential).map_err(ClientError::Internal)?;

        tracing::info!(email = %credential.email, role = ?credential.role, "Signed in");
        Ok(credential)
    }

    /// Drop the stored session. Safe to call when already signed out.
    pub fn logout(&self) -> Result<()> {
        self.store.clear().map_err(ClientError::Internal)
    }

    /// Obtain a fresh token, serializing concurrent attempts: one
    /// caller performs the exchange, everyone else queues for its
    /// outcome.
    async fn refreshed_token(&self) -> std::result::Result<String, RefreshError> {
        match self.coordinator.join() {
            FlightTicket::Follower(outcome) => {
                tracing::debug!("Refresh already in flight, queueing");
                outcome.await.unwrap_or(Err(RefreshError::Abandoned))
            }
            FlightTicket::Leader => {
                let guard = self.coordinator.guard();
                let outcome = self.run_refresh().await;
                guard.settle(&outcome);
                outcome
            }
        }
    }

    /// Leader half of the refresh protocol
    async fn run_refresh(&self) -> std::result::Result<String, RefreshError> {
        // Nothing to refresh without a stored token
        let current = match self.store.read() {
            Some(credential) => credential,
            None => {
                tracing::warn!("No stored session to refresh");
                return Err(RefreshError::NoSession);
            }
        };
        let role = current.role;

        match refresh::exchange_token(&self.http, &self.origin, &current, self.refresh_timeout)
            .await
        {
            Ok(renewed) => {
                // Persist before anyone resumes so queued callers and
                // fresh reads agree on the token
                if let Err(e) = self.store.write(&renewed) {
                    // The exchanged token is still valid; the next
                    // expiry will just arrive early
                    tracing::error!(error = %e, "Failed to persist refreshed session");
                }
                tracing::info!(role = ?role, "Session refreshed");
                Ok(renewed.token)
            }
            Err(e) => {
                tracing::error!(error = %e, "Session refresh failed, forcing logout");
                if let Err(clear_err) = self.store.clear() {
                    tracing::warn!(error = %clear_err, "Failed to clear stored session");
                }
                self.navigator.navigate(role.login_entry());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_auth_failure_statuses() {
        assert!(is_auth_failure(StatusCode::UNAUTHORIZED));
        assert!(is_auth_failure(StatusCode::FORBIDDEN));
        assert!(!is_auth_failure(StatusCode::BAD_REQUEST));
        assert!(!is_auth_failure(StatusCode::NOT_FOUND));
        assert!(!is_auth_failure(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn test_exempt_paths() {
        assert!(is_exempt_path("/api/login"));
        assert!(is_exempt_path("/api/admin/login"));
        assert!(is_exempt_path("/api/signin"));
        assert!(is_exempt_path("/api/refresh-token"));
        assert!(is_exempt_path("/api/admin/refresh-token"));

        assert!(!is_exempt_path("/api/widgets"));
        assert!(!is_exempt_path("/api/accounts/42"));
    }

    proptest! {
        // Substring match: any path carrying a session-endpoint marker
        // is exempt, wherever the marker sits
        #[test]
        fn exempt_markers_always_detected(
            prefix in "[a-z0-9/]{0,12}",
            suffix in "[a-z0-9/]{0,12}",
            idx in 0usize..EXEMPT_PATH_MARKERS.len(),
        ) {
            let path = format!("/{}{}{}", prefix, EXEMPT_PATH_MARKERS[idx], suffix);
            prop_assert!(is_exempt_path(&path));
        }
    }
}

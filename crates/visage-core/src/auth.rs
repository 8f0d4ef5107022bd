//! Admin login/logout cycle against the remote authentication endpoint.
//!
//! The server is the trust boundary; this client only manages the local side
//! of the bearer-token cycle. Local token expiry is authoritative for remote
//! calls: an expired token never leaves the process. The session flag on the
//! store is authoritative only for local UI gating and is never consulted
//! here.

use crate::error::RemoteError;
use crate::gateway::upstream_message;
use crate::store::ConversationStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct LoginRequest<'a> {
    code: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Client for the admin authentication endpoint.
pub struct AdminAuthClient {
    endpoint: String,
    client: reqwest::Client,
}

impl AdminAuthClient {
    /// Creates a client for the auth service rooted at `endpoint`
    /// (e.g. `http://127.0.0.1:8900/admin`).
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Exchanges an admin code for a bearer token, persisting the token and
    /// raising the session flag on success.
    ///
    /// A blank code fails locally as [`RemoteError::Validation`] without any
    /// network traffic.
    pub async fn login(
        &self,
        store: &ConversationStore,
        code: &str,
    ) -> Result<AdminSessionOutcome, RemoteError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(RemoteError::Validation("admin code must not be empty".into()));
        }

        let url = format!("{}/login", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&LoginRequest { code })
            .send()
            .await
            .map_err(|e| RemoteError::Connectivity(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RemoteError::Upstream {
                status: status.as_u16(),
                message: upstream_message(status.as_u16(), &text),
            });
        }

        let parsed: LoginResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::MalformedResponse(e.to_string()))?;

        // The store logs persistence failures; the session stays valid in
        // memory for this process either way.
        let _ = store.set_admin_token(&parsed.token, parsed.expires_at);
        store.set_admin_authenticated(true);
        Ok(AdminSessionOutcome {
            token: parsed.token,
            expires_at: parsed.expires_at,
        })
    }

    /// Checks the stored token against the auth service's session endpoint.
    ///
    /// The local expiry check runs first and wins: an absent or expired token
    /// is cleared and reported as [`RemoteError::AuthExpired`] with no
    /// request made. A remote `401` also clears the token before surfacing;
    /// a `403` surfaces as [`RemoteError::Permission`] and keeps the token.
    pub async fn verify(&self, store: &ConversationStore) -> Result<(), RemoteError> {
        let token = match store.admin_session().token {
            Some(token) if !store.is_admin_token_expired() => token,
            _ => {
                let _ = store.clear_admin_token();
                return Err(RemoteError::AuthExpired);
            }
        };

        let url = format!("{}/session", self.endpoint);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .map_err(|e| RemoteError::Connectivity(e.to_string()))?;

        let status = response.status().as_u16();
        match status {
            200..=299 => Ok(()),
            401 => {
                let _ = store.clear_admin_token();
                Err(RemoteError::AuthExpired)
            }
            403 => Err(RemoteError::Permission),
            _ => {
                let text = response.text().await.unwrap_or_default();
                Err(RemoteError::Upstream {
                    status,
                    message: upstream_message(status, &text),
                })
            }
        }
    }

    /// Client-side logout: drops the token and lowers the session flag.
    pub fn logout(&self, store: &ConversationStore) {
        let _ = store.clear_admin_token();
        store.set_admin_authenticated(false);
    }
}

/// What a successful login hands back to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSessionOutcome {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

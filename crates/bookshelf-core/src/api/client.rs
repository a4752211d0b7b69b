//! Client for the backend login endpoint.
//!
//! Trades an identity-provider token for a bearer credential and writes it
//! to the persisted slot. The session manager never calls this; it only
//! sees the slot change.

use std::time::Duration;

use chrono::Utc;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::auth::{BearerCredential, IdentityProvider, Principal};
use crate::slot::CredentialSlot;

use super::ExchangeError;

// ============================================================================
// Constants
// ============================================================================

/// Backend used when nothing is configured.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    #[serde(rename = "idToken")]
    id_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

/// Who may sign in. The book catalog is personal: at most one email.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    pub allowed_email: Option<String>,
}

impl AccessPolicy {
    pub fn only(email: impl Into<String>) -> Self {
        Self {
            allowed_email: Some(email.into()),
        }
    }

    /// With no configured email everyone is allowed.
    pub fn permits(&self, principal: &Principal) -> bool {
        match &self.allowed_email {
            None => true,
            Some(allowed) => principal
                .email
                .as_deref()
                .map(|email| email.eq_ignore_ascii_case(allowed))
                .unwrap_or(false),
        }
    }
}

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct CredentialExchange {
    client: Client,
    backend_url: String,
    policy: AccessPolicy,
}

impl CredentialExchange {
    pub fn new(backend_url: impl Into<String>, policy: AccessPolicy) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            backend_url: backend_url.into().trim_end_matches('/').to_string(),
            policy,
        })
    }

    pub fn login_url(&self) -> String {
        format!("{}/login", self.backend_url)
    }

    /// Full login flow: allow-list, exchange, validate, store.
    ///
    /// On any failure the identity session is revoked (best effort) so a
    /// rejected principal does not linger half signed in.
    pub async fn sign_in(
        &self,
        principal: &Principal,
        id_token: &str,
        slot: &dyn CredentialSlot,
        identity: &dyn IdentityProvider,
    ) -> Result<BearerCredential, ExchangeError> {
        let result = self.exchange_and_store(principal, id_token, slot).await;

        if let Err(ref e) = result {
            warn!(uid = %principal.uid, error = %e, "Login failed, revoking identity session");
            if let Err(revoke_err) = identity.sign_out().await {
                warn!(error = %revoke_err, "Error signing out rejected user");
            }
        }
        result
    }

    async fn exchange_and_store(
        &self,
        principal: &Principal,
        id_token: &str,
        slot: &dyn CredentialSlot,
    ) -> Result<BearerCredential, ExchangeError> {
        if !self.policy.permits(principal) {
            return Err(ExchangeError::NotAllowed(
                principal.email.clone().unwrap_or_else(|| principal.uid.clone()),
            ));
        }

        let token = self.request_token(id_token).await?;
        let credential = BearerCredential::decode(&token)?;
        if !credential.is_valid_at(Utc::now()) {
            return Err(ExchangeError::ExpiredCredential);
        }

        slot.set(credential.as_str())?;
        info!(
            uid = %principal.uid,
            expires_at = %credential.expires_at(),
            "Credential stored"
        );
        Ok(credential)
    }

    /// POST the identity token to the backend and return the raw bearer token.
    pub async fn request_token(&self, id_token: &str) -> Result<String, ExchangeError> {
        let url = self.login_url();
        debug!(url = %url, "Exchanging identity token");

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(&LoginRequest { id_token })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExchangeError::from_status(status, &body));
        }

        let body = response.text().await?;
        parse_login_response(&body)
    }
}

fn parse_login_response(body: &str) -> Result<String, ExchangeError> {
    let login: LoginResponse = serde_json::from_str(body)
        .map_err(|e| ExchangeError::InvalidResponse(format!("Failed to parse login response: {}", e)))?;
    if login.token.trim().is_empty() {
        return Err(ExchangeError::InvalidResponse("Login response has an empty token".to_string()));
    }
    Ok(login.token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{IdentityState, LocalIdentityProvider};
    use crate::slot::MemoryStore;

    #[test]
    fn test_policy_without_email_allows_everyone() {
        let policy = AccessPolicy::default();
        assert!(policy.permits(&Principal::new("uid-1")));
    }

    #[test]
    fn test_policy_matches_single_email() {
        let policy = AccessPolicy::only("Owner@Example.com");
        assert!(policy.permits(&Principal::new("uid-1").with_email("owner@example.com")));
        assert!(!policy.permits(&Principal::new("uid-2").with_email("guest@example.com")));
        assert!(!policy.permits(&Principal::new("uid-3")));
    }

    #[test]
    fn test_login_url_strips_trailing_slash() {
        let exchange = CredentialExchange::new("http://localhost:5000/", AccessPolicy::default()).unwrap();
        assert_eq!(exchange.login_url(), "http://localhost:5000/login");
    }

    #[test]
    fn test_parse_login_response() {
        assert_eq!(parse_login_response(r#"{"token":"a.b.c"}"#).unwrap(), "a.b.c");
        assert!(matches!(
            parse_login_response(r#"{"jwt":"a.b.c"}"#),
            Err(ExchangeError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_login_response(r#"{"token":"  "}"#),
            Err(ExchangeError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_login_request_shape() {
        let json = serde_json::to_string(&LoginRequest { id_token: "google-token" }).unwrap();
        assert_eq!(json, r#"{"idToken":"google-token"}"#);
    }

    #[tokio::test]
    async fn test_rejected_principal_is_revoked_without_network() {
        let exchange = CredentialExchange::new(
            "http://127.0.0.1:9",
            AccessPolicy::only("owner@example.com"),
        )
        .unwrap();
        let principal = Principal::new("uid-2").with_email("guest@example.com");
        let identity = LocalIdentityProvider::signed_in(principal.clone());
        let slot = MemoryStore::new().context();

        let err = exchange
            .sign_in(&principal, "google-token", &slot, &identity)
            .await
            .unwrap_err();

        assert!(matches!(err, ExchangeError::NotAllowed(email) if email == "guest@example.com"));
        assert_eq!(identity.state(), IdentityState::SignedOut);
        assert_eq!(slot.get().unwrap(), None);
    }
}

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// Reasons a stored token cannot be used as a bearer credential.
///
/// Every variant resolves to an unauthenticated session; none of them is
/// shown to the user as a distinct message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Malformed token: expected three dot-separated segments, found {0}")]
    Malformed(usize),

    #[error("Token payload is not valid base64url: {0}")]
    Encoding(String),

    #[error("Token payload is not a JSON object: {0}")]
    Payload(String),

    #[error("Token payload has no numeric exp claim")]
    MissingExpiry,
}

/// Claims we read out of the payload segment. Anything else is ignored.
#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    exp: Option<serde_json::Value>,
    #[serde(default)]
    iat: Option<serde_json::Value>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

/// A signed bearer token with its embedded expiry.
///
/// The signature is never verified here: the backend that issued the token
/// checks it on every request. We only need the expiry to decide when the
/// local session must end.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerCredential {
    token: String,
    expires_at: DateTime<Utc>,
    issued_at: Option<DateTime<Utc>>,
    subject: Option<String>,
    email: Option<String>,
}

impl BearerCredential {
    /// Decode the payload segment of a compact JWT.
    pub fn decode(token: &str) -> Result<Self, CredentialError> {
        let token = token.trim();
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(CredentialError::Malformed(parts.len()));
        }

        // Some issuers keep the padding; the no-pad engine rejects it.
        let payload_b64 = parts[1].trim_end_matches('=');
        let payload_bytes = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|e| CredentialError::Encoding(e.to_string()))?;

        let claims: Claims = serde_json::from_slice(&payload_bytes)
            .map_err(|e| CredentialError::Payload(e.to_string()))?;

        let expires_at = claims
            .exp
            .as_ref()
            .and_then(timestamp_from_claim)
            .ok_or(CredentialError::MissingExpiry)?;
        let issued_at = claims.iat.as_ref().and_then(timestamp_from_claim);

        Ok(Self {
            token: token.to_string(),
            expires_at,
            issued_at,
            subject: claims.sub,
            email: claims.email,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Valid while the expiry is strictly in the future.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }

    /// Seconds remaining (for display), never negative.
    pub fn seconds_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        self.remaining_at(now).num_seconds().max(0)
    }
}

/// `exp`/`iat` are NumericDate values: integer or fractional seconds.
fn timestamp_from_claim(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    if let Some(secs) = value.as_i64() {
        return DateTime::from_timestamp(secs, 0);
    }
    let secs = value.as_f64().filter(|s| s.is_finite())?;
    DateTime::from_timestamp_millis((secs * 1000.0).floor() as i64)
}

// The raw token is a secret; keep it out of logs.
impl fmt::Debug for BearerCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerCredential")
            .field("expires_at", &self.expires_at)
            .field("subject", &self.subject)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl Serialize for BearerCredential {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.token)
    }
}

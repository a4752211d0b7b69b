use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::credential::BearerCredential;

/// Identity-provider subject. Opaque apart from what we display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Principal {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl Principal {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            display_name: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Name to show in a nav bar: display name, then email, then uid.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.uid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum SessionStatus {
    /// The identity provider has not reported yet.
    Loading,
    Authenticated,
    Unauthenticated,
}

/// Snapshot of the authenticated session published to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Session {
    pub principal: Option<Principal>,
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub credential: Option<BearerCredential>,
    pub status: SessionStatus,
}

impl Default for Session {
    fn default() -> Self {
        Self::loading()
    }
}

impl Session {
    pub fn loading() -> Self {
        Self {
            principal: None,
            credential: None,
            status: SessionStatus::Loading,
        }
    }

    pub fn unauthenticated() -> Self {
        Self {
            principal: None,
            credential: None,
            status: SessionStatus::Unauthenticated,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == SessionStatus::Loading
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }

    /// Get the bearer token if the session is authenticated
    pub fn token(&self) -> Option<&str> {
        if self.is_authenticated() {
            self.credential.as_ref().map(|c| c.as_str())
        } else {
            None
        }
    }

    /// Check the session against a point in time, not just the last status.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.is_authenticated()
            && self.principal.is_some()
            && self
                .credential
                .as_ref()
                .map(|c| c.is_valid_at(now))
                .unwrap_or(false)
    }
}

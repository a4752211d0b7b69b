//! Pure session lifecycle state machine.
//!
//! The machine never touches timers, storage or the identity provider
//! directly. Callers feed it inputs together with the current wall time and
//! then drain the side effects it requests. Pending deadlines are plain
//! `Option`s, so there is never more than one settle window or one
//! auto-expiry action armed at a time.

use std::mem;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::credential::{BearerCredential, CredentialError};
use super::session::{Principal, Session, SessionStatus};

/// Wait after sign-in before trusting the persisted slot.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 500;

/// Interval between periodic credential checks.
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 5;

/// Auto-expiry fires this long before the token's real deadline.
pub const DEFAULT_EXPIRY_SKEW_SECS: u64 = 5;

/// Upper bounds applied to configured timings.
const MAX_SETTLE_DELAY_MS: u64 = 60_000;
const MAX_CHECK_INTERVAL_SECS: u64 = 86_400;
const MAX_EXPIRY_SKEW_SECS: u64 = 86_400;

/// Timing knobs for the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub settle_delay_ms: u64,
    pub check_interval_secs: u64,
    pub expiry_skew_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            check_interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
            expiry_skew_secs: DEFAULT_EXPIRY_SKEW_SECS,
        }
    }
}

impl LifecycleConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::milliseconds(self.settle_delay_ms.min(MAX_SETTLE_DELAY_MS) as i64)
    }

    /// Never zero: tokio intervals panic on a zero period.
    pub fn check_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.check_interval_secs.clamp(1, MAX_CHECK_INTERVAL_SECS))
    }

    pub fn expiry_skew(&self) -> Duration {
        Duration::seconds(self.expiry_skew_secs.min(MAX_EXPIRY_SKEW_SECS) as i64)
    }
}

/// What caused a credential check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckTrigger {
    /// The settle window after sign-in ran out.
    SettleElapsed,
    Periodic,
    /// Another context changed the persisted slot.
    SlotChanged,
    /// The exchange step said it stored a credential.
    Acknowledged,
    Manual,
}

/// Why a session was torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownReason {
    SignedOut,
    MissingCredential,
    InvalidCredential(CredentialError),
    Expired,
    ExpiryImminent,
    AutoExpiry,
    UserRequest,
}

/// Result of a single credential check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Authenticated; auto-expiry armed for the given instant.
    Authenticated { logout_at: DateTime<Utc> },
    /// Nothing to decide yet (no principal, or settle window still open).
    Deferred,
    TornDown(TeardownReason),
}

/// Side effects the driver must carry out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Best-effort revoke of the identity-provider session.
    RevokeIdentity,
    ClearSlot,
}

#[derive(Debug)]
pub struct SessionMachine {
    config: LifecycleConfig,
    session: Session,
    settle_until: Option<DateTime<Utc>>,
    logout_at: Option<DateTime<Utc>>,
    effects: Vec<Effect>,
}

impl SessionMachine {
    pub fn new(config: LifecycleConfig) -> Self {
        Self {
            config,
            session: Session::loading(),
            settle_until: None,
            logout_at: None,
            effects: Vec::new(),
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status
    }

    pub fn settle_deadline(&self) -> Option<DateTime<Utc>> {
        self.settle_until
    }

    /// The single pending auto-expiry instant, if any.
    pub fn logout_deadline(&self) -> Option<DateTime<Utc>> {
        self.logout_at
    }

    /// Periodic checks only matter once a principal is known and the
    /// settle window is not pending.
    pub fn wants_periodic_check(&self) -> bool {
        self.session.principal.is_some() && self.settle_until.is_none()
    }

    pub fn drain_effects(&mut self) -> Vec<Effect> {
        mem::take(&mut self.effects)
    }

    /// Identity provider reported a signed-in principal (or refreshed it).
    ///
    /// Status is left as is: Authenticated is only reachable via a check.
    pub fn on_signed_in(&mut self, principal: Principal, now: DateTime<Utc>) {
        let settle_until = now + self.config.settle_delay();
        debug!(uid = %principal.uid, %settle_until, "Sign-in reported, waiting for credential");
        self.session.principal = Some(principal);
        self.settle_until = Some(settle_until);
    }

    /// A sign-out that only echoes a teardown we already did is dropped, so
    /// it cannot clear a credential another context stored in the meantime.
    pub fn on_signed_out(&mut self) {
        let settled_out = self.session == Session::unauthenticated()
            && self.settle_until.is_none()
            && self.logout_at.is_none();
        if settled_out {
            debug!("Sign-out reported for an already ended session");
            return;
        }
        self.teardown(TeardownReason::SignedOut);
    }

    pub fn on_sign_out_requested(&mut self) {
        self.teardown(TeardownReason::UserRequest);
    }

    /// The auto-expiry deadline was reached.
    pub fn on_logout_due(&mut self) {
        if self.logout_at.take().is_some() {
            self.teardown(TeardownReason::AutoExpiry);
        }
    }

    /// Validate the stored credential and transition accordingly.
    ///
    /// Running this twice against the same stored value and clock yields the
    /// same status and the same auto-expiry instant.
    pub fn check(
        &mut self,
        stored: Option<&str>,
        trigger: CheckTrigger,
        now: DateTime<Utc>,
    ) -> CheckOutcome {
        if self.session.principal.is_none() {
            return CheckOutcome::Deferred;
        }

        let settling = self.settle_until.is_some();
        if trigger == CheckTrigger::SettleElapsed {
            self.settle_until = None;
        } else if settling && trigger == CheckTrigger::Periodic {
            return CheckOutcome::Deferred;
        }

        let verdict = match stored {
            None => Err(TeardownReason::MissingCredential),
            Some(raw) => match BearerCredential::decode(raw) {
                Err(e) => Err(TeardownReason::InvalidCredential(e)),
                Ok(cred) if !cred.is_valid_at(now) => Err(TeardownReason::Expired),
                Ok(cred) => {
                    let logout_at = cred.expires_at() - self.config.expiry_skew();
                    if logout_at <= now {
                        Err(TeardownReason::ExpiryImminent)
                    } else {
                        Ok((cred, logout_at))
                    }
                }
            },
        };

        match verdict {
            Ok((cred, logout_at)) => {
                if self.session.status != SessionStatus::Authenticated {
                    info!(expires_at = %cred.expires_at(), ?trigger, "Session authenticated");
                }
                self.settle_until = None;
                self.logout_at = Some(logout_at);
                self.session.credential = Some(cred);
                self.session.status = SessionStatus::Authenticated;
                CheckOutcome::Authenticated { logout_at }
            }
            // Before the first sign-in completes, an early signal during the
            // settle window that finds nothing usable is ignored; the window's
            // own expiry decides. A live session is never kept on a bad slot.
            Err(reason)
                if self.settle_until.is_some()
                    && self.session.status != SessionStatus::Authenticated =>
            {
                debug!(?reason, ?trigger, "Credential not ready during settle window");
                CheckOutcome::Deferred
            }
            Err(reason) => {
                self.teardown(reason.clone());
                CheckOutcome::TornDown(reason)
            }
        }
    }

    fn teardown(&mut self, reason: TeardownReason) {
        if self.session.status == SessionStatus::Authenticated {
            info!(?reason, "Session ended");
        } else {
            debug!(?reason, "Session teardown");
        }

        self.session = Session::unauthenticated();
        self.settle_until = None;
        self.logout_at = None;
        self.effects.push(Effect::RevokeIdentity);
        self.effects.push(Effect::ClearSlot);
    }
}

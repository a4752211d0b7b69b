use std::sync::Mutex;

use futures::future::{self, BoxFuture, FutureExt};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::session::Principal;

/// Capacity of the identity event channel. Only state changes are sent,
/// so a handful is plenty.
const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Identity provider sign-out failed: {0}")]
    RevokeFailed(String),

    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),
}

/// What the identity provider currently knows about the human at the keyboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityState {
    /// No report yet (provider still initialising).
    Unknown,
    SignedOut,
    SignedIn(Principal),
}

/// Notification emitted on every identity state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEvent {
    SignedIn(Principal),
    SignedOut,
}

/// External identity provider (the opaque signer in front of the backend).
///
/// Implementations must only emit events when the state actually changes;
/// the session manager calls `sign_out` during teardown and relies on a
/// signed-out provider staying quiet.
pub trait IdentityProvider: Send + Sync + 'static {
    fn state(&self) -> IdentityState;

    fn subscribe(&self) -> broadcast::Receiver<IdentityEvent>;

    /// Revoke the provider-side session.
    fn sign_out(&self) -> BoxFuture<'_, Result<(), IdentityError>>;
}

/// In-process identity provider driven by explicit calls.
///
/// Used by the CLI (principal remembered from the last login) and in tests.
pub struct LocalIdentityProvider {
    state: Mutex<IdentityState>,
    events: broadcast::Sender<IdentityEvent>,
}

impl Default for LocalIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalIdentityProvider {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(IdentityState::Unknown),
            events,
        }
    }

    pub fn signed_in(principal: Principal) -> Self {
        let provider = Self::new();
        provider.set_state(IdentityState::SignedIn(principal));
        provider
    }

    pub fn signed_out() -> Self {
        let provider = Self::new();
        provider.set_state(IdentityState::SignedOut);
        provider
    }

    pub fn sign_in(&self, principal: Principal) {
        info!(uid = %principal.uid, "Identity signed in");
        self.set_state(IdentityState::SignedIn(principal));
    }

    /// Sign out locally, emitting an event only if we were signed in.
    pub fn sign_out_now(&self) {
        self.set_state(IdentityState::SignedOut);
    }

    fn set_state(&self, next: IdentityState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == next {
            return;
        }

        let event = match &next {
            IdentityState::SignedIn(principal) => Some(IdentityEvent::SignedIn(principal.clone())),
            IdentityState::SignedOut => Some(IdentityEvent::SignedOut),
            IdentityState::Unknown => None,
        };
        *state = next;
        drop(state);

        if let Some(event) = event {
            // No receivers is fine: nobody is watching yet.
            let receivers = self.events.send(event).unwrap_or(0);
            debug!(receivers, "Identity event sent");
        }
    }
}

impl IdentityProvider for LocalIdentityProvider {
    fn state(&self) -> IdentityState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<IdentityEvent> {
        self.events.subscribe()
    }

    fn sign_out(&self) -> BoxFuture<'_, Result<(), IdentityError>> {
        self.sign_out_now();
        future::ready(Ok(())).boxed()
    }
}

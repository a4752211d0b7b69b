//! Authentication module for the bookshelf session lifecycle.
//!
//! This module provides:
//! - `BearerCredential`: decoding of the backend-issued token and its expiry
//! - `SessionMachine`: the pure lifecycle state machine
//! - `SessionManager` / `SessionHandle`: the async driver and its observers
//! - `IdentityProvider`: the seam to the external identity provider
//!
//! A session is authenticated only while a signed-in principal and a valid
//! credential are both present. Tokens are dropped 5 seconds before expiry.

pub mod clock;
pub mod credential;
pub mod identity;
pub mod machine;
pub mod manager;
pub mod session;

pub use clock::{Clock, SystemClock};
pub use credential::{BearerCredential, CredentialError};
pub use identity::{
    IdentityError, IdentityEvent, IdentityProvider, IdentityState, LocalIdentityProvider,
};
pub use machine::{CheckOutcome, CheckTrigger, Effect, LifecycleConfig, SessionMachine, TeardownReason};
pub use manager::{SessionHandle, SessionManager, SessionObserver, Subscription};
pub use session::{Principal, Session, SessionStatus};

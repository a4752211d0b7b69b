//! Core library for bookshelf.
//!
//! The book catalog web client is gated behind an authenticated session.
//! This crate owns that session: it decodes the backend's bearer credential,
//! watches the persisted credential slot shared by every open context,
//! reacts to identity-provider sign-in/sign-out, and drops the session
//! shortly before the credential expires.

pub mod api;
pub mod auth;
pub mod config;
pub mod slot;

pub use api::{AccessPolicy, CredentialExchange, ExchangeError};
pub use auth::{
    BearerCredential, IdentityProvider, LifecycleConfig, LocalIdentityProvider, Principal,
    Session, SessionHandle, SessionManager, SessionObserver, SessionStatus, Subscription,
};
pub use config::{Config, SlotBackend};
pub use slot::{CredentialSlot, FileSlot, KeyringSlot, MemoryStore};

//! Backend credential exchange.
//!
//! This module provides the `CredentialExchange` client that trades an
//! identity-provider token for the backend's bearer credential and stores
//! it in the persisted slot, plus the `AccessPolicy` allow-list.

pub mod client;
pub mod error;

pub use client::{AccessPolicy, CredentialExchange, DEFAULT_BACKEND_URL};
pub use error::ExchangeError;

//! Persisted credential slot.
//!
//! One entry holding at most one serialized bearer credential, shared by
//! every context (process, window, tab) that runs against the same backend:
//! - `MemoryStore` / `MemorySlot`: in-process store with per-context handles
//! - `FileSlot`: a file shared across processes, watched for changes
//! - `KeyringSlot`: the OS keychain, no change feed
//!
//! The slot is the single source of truth. Writers are the credential
//! exchange; the session manager only reads and clears it.

pub mod file;
pub mod keychain;
pub mod memory;

use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::sync::broadcast;

pub use file::FileSlot;
pub use keychain::KeyringSlot;
pub use memory::{MemorySlot, MemoryStore};

/// Capacity of a slot's change feed. A lagging watcher still sees "changed".
const CHANGE_CHANNEL_CAPACITY: usize = 32;

#[derive(Error, Debug)]
pub enum SlotError {
    #[error("Credential slot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Keychain access failed: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Slot watcher failed: {0}")]
    Watch(#[from] notify::Error),
}

/// Identifies the context that made a change, so a context can ignore its own writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Changes observed from outside the process have no known origin.
    pub const EXTERNAL: ContextId = ContextId(0);
}

/// A mutation of the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotChange {
    pub origin: ContextId,
    /// `false` when the slot was cleared.
    pub present: bool,
}

/// Change feed filtered to mutations made by other contexts.
pub struct SlotWatcher {
    rx: Option<broadcast::Receiver<SlotChange>>,
    own: Option<ContextId>,
}

impl SlotWatcher {
    pub fn new(rx: broadcast::Receiver<SlotChange>, own: ContextId) -> Self {
        Self {
            rx: Some(rx),
            own: Some(own),
        }
    }

    /// Watcher for a backend with no change feed. Never fires.
    pub fn silent() -> Self {
        Self { rx: None, own: None }
    }

    /// Wait for the next external change. `None` once the feed is gone.
    pub async fn changed(&mut self) -> Option<SlotChange> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(change) if Some(change.origin) == self.own => continue,
                Ok(change) => return Some(change),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Slot watcher lagged");
                    return Some(SlotChange {
                        origin: ContextId::EXTERNAL,
                        present: true,
                    });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.rx.is_none()
    }
}

/// Storage for the one persisted bearer credential.
pub trait CredentialSlot: Send + Sync + 'static {
    fn get(&self) -> Result<Option<String>, SlotError>;

    fn set(&self, token: &str) -> Result<(), SlotError>;

    fn clear(&self) -> Result<(), SlotError>;

    /// Subscribe to changes made by other contexts.
    fn watch(&self) -> SlotWatcher;
}

pub(crate) fn change_channel() -> broadcast::Sender<SlotChange> {
    broadcast::channel(CHANGE_CHANNEL_CAPACITY).0
}

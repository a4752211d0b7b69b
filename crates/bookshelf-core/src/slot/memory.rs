use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use super::{change_channel, ContextId, CredentialSlot, SlotChange, SlotError, SlotWatcher};

#[derive(Debug)]
struct Shared {
    value: Mutex<Option<String>>,
    changes: broadcast::Sender<SlotChange>,
}

/// In-process slot storage shared by any number of contexts.
///
/// Like browser storage events, a change is only announced when the stored
/// value actually differs, and never to the context that made it.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                value: Mutex::new(None),
                changes: change_channel(),
            }),
        }
    }

    /// A new handle with its own context identity.
    pub fn context(&self) -> MemorySlot {
        MemorySlot {
            shared: Arc::clone(&self.shared),
            id: ContextId::next(),
        }
    }
}

/// One context's handle onto a `MemoryStore`.
#[derive(Debug)]
pub struct MemorySlot {
    shared: Arc<Shared>,
    id: ContextId,
}

impl MemorySlot {
    pub fn context_id(&self) -> ContextId {
        self.id
    }

    fn replace(&self, next: Option<String>) {
        let mut value = self.shared.value.lock().unwrap_or_else(|e| e.into_inner());
        if *value == next {
            return;
        }
        let present = next.is_some();
        *value = next;
        drop(value);

        let _ = self.shared.changes.send(SlotChange {
            origin: self.id,
            present,
        });
    }
}

impl CredentialSlot for MemorySlot {
    fn get(&self) -> Result<Option<String>, SlotError> {
        Ok(self
            .shared
            .value
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    fn set(&self, token: &str) -> Result<(), SlotError> {
        self.replace(Some(token.to_string()));
        Ok(())
    }

    fn clear(&self) -> Result<(), SlotError> {
        self.replace(None);
        Ok(())
    }

    fn watch(&self) -> SlotWatcher {
        SlotWatcher::new(self.shared.changes.subscribe(), self.id)
    }
}

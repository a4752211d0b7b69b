use keyring::Entry;
use tracing::debug;

use super::{CredentialSlot, SlotError, SlotWatcher};

const SERVICE_NAME: &str = "bookshelf";

/// Account name used when none is configured.
pub const DEFAULT_ACCOUNT: &str = "jwtToken";

/// Credential slot stored in the OS keychain.
///
/// The keychain has no change feed, so other processes' writes are only
/// picked up by the periodic check.
pub struct KeyringSlot {
    account: String,
}

impl KeyringSlot {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<Entry, SlotError> {
        Ok(Entry::new(SERVICE_NAME, &self.account)?)
    }
}

impl Default for KeyringSlot {
    fn default() -> Self {
        Self::new(DEFAULT_ACCOUNT)
    }
}

impl CredentialSlot for KeyringSlot {
    fn get(&self) -> Result<Option<String>, SlotError> {
        match self.entry()?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, token: &str) -> Result<(), SlotError> {
        self.entry()?.set_password(token)?;
        debug!(account = %self.account, "Stored credential in keychain");
        Ok(())
    }

    /// Clearing an empty slot is not an error.
    fn clear(&self) -> Result<(), SlotError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn watch(&self) -> SlotWatcher {
        SlotWatcher::silent()
    }
}

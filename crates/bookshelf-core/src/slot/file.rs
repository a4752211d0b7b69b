use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{change_channel, ContextId, CredentialSlot, SlotChange, SlotError, SlotWatcher};

/// Default file name inside the cache directory.
pub const SLOT_FILE: &str = "jwt-token";

/// Credential slot backed by a single file shared between processes.
///
/// The parent directory is watched so that writes and deletions made by other
/// processes are announced. Writes go through a temp file and a rename, so a
/// reader never sees a half-written token.
pub struct FileSlot {
    path: PathBuf,
    /// Last value this process read or wrote; used to drop our own echoes.
    known: Arc<Mutex<Option<String>>>,
    changes: broadcast::Sender<SlotChange>,
    id: ContextId,
    _watcher: Mutex<RecommendedWatcher>,
}

impl FileSlot {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SlotError> {
        let path = path.into();
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&dir)?;

        let known = Arc::new(Mutex::new(read_token(&path)?));
        let changes = change_channel();

        let mut watcher = {
            let path = path.clone();
            let known = Arc::clone(&known);
            let changes = changes.clone();
            notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "Credential file watcher error");
                        return;
                    }
                };
                if !matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) {
                    return;
                }
                if !event.paths.iter().any(|p| p.file_name() == path.file_name()) {
                    return;
                }
                announce_if_changed(&path, &known, &changes);
            })?
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        debug!(path = %path.display(), "Watching credential file");

        Ok(Self {
            path,
            known,
            changes,
            id: ContextId::next(),
            _watcher: Mutex::new(watcher),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record the value this process last saw, returning the one it replaces.
    fn remember(&self, value: Option<String>) -> Option<String> {
        std::mem::replace(&mut *self.known.lock().unwrap_or_else(|e| e.into_inner()), value)
    }

    #[cfg(test)]
    fn known(&self) -> Option<String> {
        self.known.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

fn read_token(path: &Path) -> Result<Option<String>, SlotError> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let token = contents.trim();
            Ok((!token.is_empty()).then(|| token.to_string()))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Re-read the file and announce it if it differs from what we last saw.
fn announce_if_changed(
    path: &Path,
    known: &Mutex<Option<String>>,
    changes: &broadcast::Sender<SlotChange>,
) {
    let current = match read_token(path) {
        Ok(current) => current,
        Err(e) => {
            warn!(error = %e, "Failed to re-read credential file");
            return;
        }
    };

    let mut known = known.lock().unwrap_or_else(|e| e.into_inner());
    if *known == current {
        return;
    }
    let present = current.is_some();
    *known = current;
    drop(known);

    debug!(present, "Credential file changed by another process");
    let _ = changes.send(SlotChange {
        origin: ContextId::EXTERNAL,
        present,
    });
}

impl CredentialSlot for FileSlot {
    fn get(&self) -> Result<Option<String>, SlotError> {
        let token = read_token(&self.path)?;
        self.remember(token.clone());
        Ok(token)
    }

    fn set(&self, token: &str) -> Result<(), SlotError> {
        let token = token.trim();
        let tmp = self.path.with_extension("tmp");
        {
            let mut options = fs::OpenOptions::new();
            options.write(true).create(true).truncate(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }
            let mut file = options.open(&tmp)?;
            file.write_all(token.as_bytes())?;
            file.sync_all()?;
        }

        // The rename is the only event the watcher reacts to, so the new value
        // must be known before it lands. Roll back if it never does.
        let previous = self.remember(Some(token.to_string()));
        if let Err(e) = fs::rename(&tmp, &self.path) {
            self.remember(previous);
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), SlotError> {
        let previous = self.remember(None);
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                self.remember(previous);
                Err(e.into())
            }
        }
    }

    fn watch(&self) -> SlotWatcher {
        SlotWatcher::new(self.changes.subscribe(), self.id)
    }
}

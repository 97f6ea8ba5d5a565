//! Single-slot handoff between the fast poller and the consensus loop
//!
//! The slot holds the most recently polled, normalized snapshot. Writes
//! replace the whole value under the channel lock, so a reader never sees a
//! half-written snapshot, and the channel version only moves forward, so a
//! reader never goes back to a value older than one it already saw.
//!
//! An optional JSON mirror on disk keeps the last staged snapshot across
//! restarts. It is written to a sibling temp file and renamed into place.

use std::path::{Path, PathBuf};

use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::Result;
use crate::model::Snapshot;

pub struct HandoffStore<S> {
    tx: watch::Sender<Option<S>>,
    mirror: Option<PathBuf>,
}

impl<S: Snapshot> Default for HandoffStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Snapshot> HandoffStore<S> {
    /// In-memory store, empty until the first write
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx, mirror: None }
    }

    /// Store mirrored to `path`, seeded from it when the file exists
    pub async fn with_mirror(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let seed = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: S = serde_json::from_slice(&bytes)?;
                info!("Seeded {} handoff from {}", S::KIND, path.display());
                Some(snapshot)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let (tx, _rx) = watch::channel(seed);
        Ok(Self {
            tx,
            mirror: Some(path),
        })
    }

    pub fn reader(&self) -> HandoffReader<S> {
        HandoffReader {
            rx: self.tx.subscribe(),
        }
    }

    /// Current value of the slot
    pub fn latest(&self) -> Option<S> {
        self.tx.borrow().clone()
    }

    /// Replace the slot if `snapshot` differs from its content.
    ///
    /// Returns whether a write happened.
    pub async fn stage(&self, snapshot: S) -> Result<bool> {
        let mirrored = self.mirror.as_ref().map(|_| snapshot.clone());

        let replaced = self.tx.send_if_modified(|slot| {
            if slot.as_ref() == Some(&snapshot) {
                false
            } else {
                *slot = Some(snapshot);
                true
            }
        });

        if replaced {
            if let (Some(path), Some(snapshot)) = (&self.mirror, mirrored) {
                write_atomically(path, &snapshot).await?;
            }
            debug!("Staged new {} snapshot", S::KIND);
        }
        Ok(replaced)
    }
}

async fn write_atomically<S: Snapshot>(path: &Path, snapshot: &S) -> Result<()> {
    let bytes = serde_json::to_vec(snapshot)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Consumer side of the handoff slot
pub struct HandoffReader<S> {
    rx: watch::Receiver<Option<S>>,
}

impl<S: Snapshot> HandoffReader<S> {
    /// The latest value if it was written since the last call, else `None`
    pub fn take_if_changed(&mut self) -> Option<S> {
        // A closed channel still holds its last value
        if !self.rx.has_changed().unwrap_or(false) {
            return None;
        }
        self.rx.borrow_and_update().clone()
    }

    pub fn latest(&self) -> Option<S> {
        self.rx.borrow().clone()
    }
}

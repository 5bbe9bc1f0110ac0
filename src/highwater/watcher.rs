//! High-water mark watcher: gates work on a store when its free space runs low.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use super::free_space::FreeSpaceProvider;
use crate::errors::StoreError;

/// Free-space threshold in bytes. A disabled mark never reports "below" and never probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighwaterMark(Option<u64>);

impl HighwaterMark {
    pub fn from_bytes(bytes: u64) -> Self {
        Self(Some(bytes))
    }

    pub fn from_kb(kb: u64) -> Self {
        Self(Some(kb.saturating_mul(1024)))
    }

    pub fn disabled() -> Self {
        Self(None)
    }

    pub fn bytes(&self) -> Option<u64> {
        self.0
    }

    pub fn is_enabled(&self) -> bool {
        self.0.is_some()
    }
}

/// One observation of free space against the mark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighwaterMarkState {
    pub path: PathBuf,
    pub free_space_bytes: u64,
    pub mark_bytes: u64,
}

impl HighwaterMarkState {
    /// At or below the mark counts as over threshold.
    pub fn is_below(&self) -> bool {
        self.free_space_bytes <= self.mark_bytes
    }
}

impl fmt::Display for HighwaterMarkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} KB free, high-water mark {} KB{}",
            self.path.display(),
            self.free_space_bytes / 1024,
            self.mark_bytes / 1024,
            if self.is_below() { " (BELOW)" } else { "" }
        )
    }
}

/// Transition observed by `HighwaterMarkWatcher::poll`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HighwaterMarkEvent {
    DroppedBelow(HighwaterMarkState),
    Recovered(HighwaterMarkState),
}

type Listener = Box<dyn Fn(&HighwaterMarkEvent) + Send + Sync>;

/// Watches one path. Every query re-probes; nothing is cached between calls.
pub struct HighwaterMarkWatcher {
    mark: HighwaterMark,
    path: PathBuf,
    provider: Arc<dyn FreeSpaceProvider>,
    listeners: Mutex<Vec<Listener>>,
    last_below: Mutex<Option<bool>>,
}

impl HighwaterMarkWatcher {
    pub fn new(mark: HighwaterMark, path: impl Into<PathBuf>, provider: Arc<dyn FreeSpaceProvider>) -> Self {
        Self {
            mark,
            path: path.into(),
            provider,
            listeners: Mutex::new(Vec::new()),
            last_below: Mutex::new(None),
        }
    }

    pub fn mark(&self) -> HighwaterMark {
        self.mark
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw free space at the watched path, whether or not a mark is set.
    pub fn free_space_kb(&self) -> Result<u64, StoreError> {
        self.provider.free_space_kb(&self.path)
    }

    /// Probe now. `Ok(None)` when the mark is disabled.
    pub fn state(&self) -> Result<Option<HighwaterMarkState>, StoreError> {
        let Some(mark_bytes) = self.mark.bytes() else {
            return Ok(None);
        };
        let free_kb = self.provider.free_space_kb(&self.path)?;
        Ok(Some(HighwaterMarkState {
            path: self.path.clone(),
            free_space_bytes: free_kb.saturating_mul(1024),
            mark_bytes,
        }))
    }

    /// Probe now; a failed probe is logged and reported as "not below".
    pub fn is_below(&self) -> bool {
        match self.state() {
            Ok(state) => state.is_some_and(|s| s.is_below()),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cannot check free space");
                false
            }
        }
    }

    pub fn add_listener(&self, listener: impl Fn(&HighwaterMarkEvent) + Send + Sync + 'static) {
        if let Ok(mut l) = self.listeners.lock() {
            l.push(Box::new(listener));
        }
    }

    /// Probe and notify listeners when the state crossed the mark since the last poll.
    pub fn poll(&self) -> Result<Option<HighwaterMarkState>, StoreError> {
        let state = self.state()?;
        if let Some(s) = &state {
            let below = s.is_below();
            let previous = self.last_below.lock().ok().and_then(|mut g| g.replace(below));
            let event = match (previous, below) {
                (Some(false) | None, true) => Some(HighwaterMarkEvent::DroppedBelow(s.clone())),
                (Some(true), false) => Some(HighwaterMarkEvent::Recovered(s.clone())),
                _ => None,
            };
            if let Some(ev) = event {
                match &ev {
                    HighwaterMarkEvent::DroppedBelow(s) => warn!(state = %s, "Free space dropped below high-water mark"),
                    HighwaterMarkEvent::Recovered(s) => info!(state = %s, "Free space back above high-water mark"),
                }
                if let Ok(listeners) = self.listeners.lock() {
                    for l in listeners.iter() {
                        l(&ev);
                    }
                }
            }
        }
        Ok(state)
    }
}

impl fmt::Debug for HighwaterMarkWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HighwaterMarkWatcher")
            .field("mark", &self.mark)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

//! The file-store contract and its three implementations.
//!
//! - `LocalFileStore` talks to the filesystem directly.
//! - `RemoteFileStore` turns each operation into one shell command run over ssh.
//! - `MountedRemoteFileStore` delegates to a local store on the mount point but
//!   bounds the metadata scans that hang when the share misbehaves.
//!
//! Operations report expected failures through `Status` values. `last_changed`
//! has a second, raised channel (`Err(StoreError)`) for environment failures.

mod copier;
mod factory;
mod local;
mod mounted;
mod path_ops;
mod remote;
mod rsync;
mod timeout;

pub use copier::{run_overwrite_probe, CopyStrategy, StoreCopier, OVERWRITE_MARKER_PREFIX};
pub use factory::{RemoteSettings, StoreFactory};
pub use local::LocalFileStore;
pub use mounted::MountedRemoteFileStore;
pub use path_ops::{FsPathCopier, FsPathMover, FsPathRemover, PathCopier, PathMover, PathRemover};
pub use remote::{FindDiscovery, RemoteFileStore, RemoteTimeouts, FIND_CANDIDATES};
pub use rsync::RsyncCopier;
pub use timeout::{TimedCall, TimeoutPool};

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::errors::StoreError;
use crate::highwater::HighwaterMarkWatcher;
use crate::item::{HostAwarePath, StoreItem};
use crate::status::{BooleanStatus, DateStatus, Status};

/// Identity of a store. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStoreDescriptor {
    root: HostAwarePath,
    description: String,
}

impl FileStoreDescriptor {
    pub fn new(root: HostAwarePath, description: impl Into<String>) -> Self {
        Self { root, description: description.into() }
    }

    pub fn root(&self) -> &HostAwarePath {
        &self.root
    }

    pub fn host(&self) -> Option<&str> {
        self.root.host()
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Display for FileStoreDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.description, self.root)
    }
}

/// Operations every store supports.
pub trait FileStore: Send + Sync {
    fn descriptor(&self) -> &FileStoreDescriptor;

    /// True when data lives on another machine (ssh or mounted share).
    fn is_remote(&self) -> bool;

    fn exists(&self, item: &StoreItem) -> BooleanStatus;

    fn delete(&self, item: &StoreItem) -> Status;

    /// Most recent modification time under `item`. May stop early once
    /// something younger than `stop_when_younger_than` was seen.
    fn last_changed(&self, item: &StoreItem, stop_when_younger_than: SystemTime)
    -> Result<DateStatus, StoreError>;

    /// `last_changed` with the threshold given relative to now.
    fn last_changed_relative(&self, item: &StoreItem, younger_than: Duration) -> Result<DateStatus, StoreError> {
        let threshold = SystemTime::now().checked_sub(younger_than).unwrap_or(SystemTime::UNIX_EPOCH);
        self.last_changed(item, threshold)
    }

    /// `None` when the root is a readable, writable, searchable directory; otherwise
    /// a message saying what is wrong.
    fn try_check_directory_fully_accessible(&self, timeout: Duration) -> Option<String>;

    /// Immediate children, oldest first. `None` (not an error) when the listing
    /// failed; the caller tries again on its next cycle.
    fn try_list_sort_by_last_modified(&self) -> Option<Vec<StoreItem>>;

    fn highwater_mark_watcher(&self) -> &HighwaterMarkWatcher;

    /// Extended capabilities, if this store has them.
    fn try_as_extended(&self) -> Option<&dyn ExtendedFileStore> {
        None
    }

    /// Location of `item` for copiers.
    fn location(&self, item: &StoreItem) -> HostAwarePath {
        self.descriptor().root().join(item)
    }
}

/// Capabilities of stores whose root is reachable as a local path.
pub trait ExtendedFileStore: FileStore {
    fn root_path(&self) -> &Path;

    /// Idempotent: Ok when the file exists afterwards, freshly created or not.
    fn create_new_file(&self, item: &StoreItem) -> Status;

    /// Move `item` into `destination_dir` as `<new_name_prefix><name>`.
    /// `None` if the target already exists or the move failed.
    fn try_move_local(&self, item: &StoreItem, destination_dir: &Path, new_name_prefix: &str) -> Option<PathBuf>;

    /// Overwrite probe: must copies into `destination` delete an existing item first?
    fn requires_deletion_before_creation(&self, destination: &dyn FileStore, copier: &dyn PathCopier) -> bool;
}

impl fmt::Debug for dyn FileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileStore({})", self.descriptor())
    }
}

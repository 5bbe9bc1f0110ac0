//! Store on a local directory, implemented with direct filesystem calls.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::copier::run_overwrite_probe;
use super::path_ops::{FsPathMover, FsPathRemover, PathCopier, PathMover, PathRemover};
use super::{ExtendedFileStore, FileStore, FileStoreDescriptor};
use crate::errors::StoreError;
use crate::helpers::describe_io_error;
use crate::highwater::HighwaterMarkWatcher;
use crate::item::{HostAwarePath, StoreItem};
use crate::status::{BooleanStatus, DateStatus, Status};

pub struct LocalFileStore {
    descriptor: FileStoreDescriptor,
    root: PathBuf,
    remover: Arc<dyn PathRemover>,
    mover: Arc<dyn PathMover>,
    watcher: HighwaterMarkWatcher,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>, description: impl Into<String>, watcher: HighwaterMarkWatcher) -> Self {
        let root = root.into();
        Self {
            descriptor: FileStoreDescriptor::new(HostAwarePath::local(&root), description),
            root,
            remover: Arc::new(FsPathRemover),
            mover: Arc::new(FsPathMover),
            watcher,
        }
    }

    pub fn with_remover(mut self, remover: Arc<dyn PathRemover>) -> Self {
        self.remover = remover;
        self
    }

    pub fn with_mover(mut self, mover: Arc<dyn PathMover>) -> Self {
        self.mover = mover;
        self
    }

    pub fn path(&self, item: &StoreItem) -> PathBuf {
        self.root.join(item.name())
    }
}

/// Youngest modification time at or under `path`. Stops as soon as something
/// younger than `stop_when_younger_than` turns up.
pub(crate) fn youngest_modification(path: &Path, stop_when_younger_than: SystemTime) -> io::Result<SystemTime> {
    let meta = fs::symlink_metadata(path)?;
    let mut youngest = meta.modified()?;
    if !meta.is_dir() || youngest > stop_when_younger_than {
        return Ok(youngest);
    }
    for entry in WalkDir::new(path).min_depth(1) {
        let entry = match entry {
            Ok(e) => e,
            // Entries vanish while producers are still working; skip them.
            Err(e) if e.io_error().is_some_and(|io| io.kind() == io::ErrorKind::NotFound) => continue,
            Err(e) => return Err(e.into()),
        };
        let modified = match entry.metadata() {
            Ok(m) => m.modified()?,
            Err(e) if e.io_error().is_some_and(|io| io.kind() == io::ErrorKind::NotFound) => continue,
            Err(e) => return Err(e.into()),
        };
        if modified > youngest {
            youngest = modified;
            if youngest > stop_when_younger_than {
                break;
            }
        }
    }
    Ok(youngest)
}

/// Quick writable probe: create and remove a small file in `dir`.
fn writable_probe(dir: &Path) -> io::Result<()> {
    let probe = dir.join(format!(".datamover_store_probe_{}.tmp", std::process::id()));
    fs::OpenOptions::new().create_new(true).write(true).open(&probe)?;
    let _ = fs::remove_file(&probe);
    Ok(())
}

impl FileStore for LocalFileStore {
    fn descriptor(&self) -> &FileStoreDescriptor {
        &self.descriptor
    }

    fn is_remote(&self) -> bool {
        false
    }

    fn exists(&self, item: &StoreItem) -> BooleanStatus {
        BooleanStatus::from_bool(fs::symlink_metadata(self.path(item)).is_ok())
    }

    fn delete(&self, item: &StoreItem) -> Status {
        let path = self.path(item);
        match self.remover.remove(&path) {
            Ok(()) => Status::Ok,
            Err(e) => {
                warn!(store = %self.descriptor, item = %item, error = %e, "Delete failed");
                Status::retriable(describe_io_error("delete", &path, &e))
            }
        }
    }

    fn last_changed(&self, item: &StoreItem, stop_when_younger_than: SystemTime) -> Result<DateStatus, StoreError> {
        let path = self.path(item);
        Ok(match youngest_modification(&path, stop_when_younger_than) {
            Ok(t) => DateStatus::Ok(t),
            Err(e) => DateStatus::retriable(describe_io_error("determine last change of", &path, &e)),
        })
    }

    fn try_check_directory_fully_accessible(&self, _timeout: Duration) -> Option<String> {
        let root = &self.root;
        match fs::metadata(root) {
            Err(e) => return Some(describe_io_error("access", root, &e)),
            Ok(m) if !m.is_dir() => return Some(format!("Path '{}' is not a directory", root.display())),
            Ok(_) => {}
        }
        if let Err(e) = fs::read_dir(root) {
            return Some(describe_io_error("read directory", root, &e));
        }
        if let Err(e) = writable_probe(root) {
            return Some(describe_io_error("write to directory", root, &e));
        }
        None
    }

    fn try_list_sort_by_last_modified(&self) -> Option<Vec<StoreItem>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(rd) => rd,
            Err(e) => {
                warn!(store = %self.descriptor, error = %e, "Cannot list directory; will retry later");
                return None;
            }
        };
        let mut dated: Vec<(SystemTime, StoreItem)> = entries
            .filter_map(Result::ok)
            .filter_map(|e| {
                let modified = e.metadata().ok()?.modified().ok()?;
                let item = StoreItem::try_new(e.file_name().to_string_lossy().into_owned()).ok()?;
                Some((modified, item))
            })
            .collect();
        dated.sort();
        Some(dated.into_iter().map(|(_, item)| item).collect())
    }

    fn highwater_mark_watcher(&self) -> &HighwaterMarkWatcher {
        &self.watcher
    }

    fn try_as_extended(&self) -> Option<&dyn ExtendedFileStore> {
        Some(self)
    }
}

impl ExtendedFileStore for LocalFileStore {
    fn root_path(&self) -> &Path {
        &self.root
    }

    fn create_new_file(&self, item: &StoreItem) -> Status {
        let path = self.path(item);
        match fs::OpenOptions::new().create_new(true).write(true).open(&path) {
            Ok(_) => Status::Ok,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_file() => Status::Ok,
            Err(e) => Status::retriable(describe_io_error("create file", &path, &e)),
        }
    }

    fn try_move_local(&self, item: &StoreItem, destination_dir: &Path, new_name_prefix: &str) -> Option<PathBuf> {
        let src = self.path(item);
        let name = Path::new(item.name()).file_name()?.to_string_lossy().into_owned();
        let target = destination_dir.join(format!("{new_name_prefix}{name}"));
        if fs::symlink_metadata(&target).is_ok() {
            warn!(src = %src.display(), dest = %target.display(), "Move target already exists");
            return None;
        }
        match self.mover.move_path(&src, &target) {
            Ok(()) => {
                debug!(src = %src.display(), dest = %target.display(), "Moved item");
                Some(target)
            }
            Err(e) => {
                warn!(error = %describe_io_error("move", &src, &e), "Move failed");
                None
            }
        }
    }

    fn requires_deletion_before_creation(&self, destination: &dyn FileStore, copier: &dyn PathCopier) -> bool {
        run_overwrite_probe(self, destination, copier)
    }
}

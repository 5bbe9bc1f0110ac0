//! Copier between two stores, and the overwrite probe that picks its strategy.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use super::path_ops::PathCopier;
use super::{ExtendedFileStore, FileStore};
use crate::item::StoreItem;
use crate::status::Status;

/// Name prefix of the marker item the overwrite probe creates.
pub const OVERWRITE_MARKER_PREFIX: &str = ".requiresDeletionBeforeCreation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStrategy {
    /// Copy straight over whatever is already at the destination.
    OverwriteInPlace,
    /// Delete the destination item first, then copy.
    DeleteThenCreate,
}

/// Copies items from one store into another with a strategy fixed at construction.
pub struct StoreCopier {
    source: Arc<dyn FileStore>,
    destination: Arc<dyn FileStore>,
    copier: Arc<dyn PathCopier>,
    strategy: CopyStrategy,
}

impl StoreCopier {
    /// Build a copier, running the overwrite probe when the source can host a marker.
    pub fn probe(source: Arc<dyn FileStore>, destination: Arc<dyn FileStore>, copier: Arc<dyn PathCopier>) -> Self {
        let strategy = match source.try_as_extended() {
            Some(ext) if ext.requires_deletion_before_creation(&*destination, &*copier) => {
                CopyStrategy::DeleteThenCreate
            }
            Some(_) => CopyStrategy::OverwriteInPlace,
            None => {
                debug!(
                    source = %source.descriptor(),
                    "Source cannot host a probe marker; assuming overwrite in place"
                );
                CopyStrategy::OverwriteInPlace
            }
        };
        info!(
            source = %source.descriptor(),
            destination = %destination.descriptor(),
            ?strategy,
            "Copy strategy selected"
        );
        Self { source, destination, copier, strategy }
    }

    /// Build a copier whose strategy is already known.
    pub fn with_strategy(
        source: Arc<dyn FileStore>,
        destination: Arc<dyn FileStore>,
        copier: Arc<dyn PathCopier>,
        strategy: CopyStrategy,
    ) -> Self {
        Self { source, destination, copier, strategy }
    }

    pub fn strategy(&self) -> CopyStrategy {
        self.strategy
    }

    pub fn source(&self) -> &Arc<dyn FileStore> {
        &self.source
    }

    pub fn destination(&self) -> &Arc<dyn FileStore> {
        &self.destination
    }

    /// Copy `item` from the source root to the same relative place under the destination root.
    pub fn copy(&self, item: &StoreItem) -> Status {
        if self.strategy == CopyStrategy::DeleteThenCreate {
            let deleted = self.destination.delete(item);
            if deleted.is_error() {
                warn!(destination = %self.destination.descriptor(), item = %item, status = %deleted,
                    "Could not delete before copy");
                return deleted;
            }
        }
        let from = self.source.location(item);
        let into = self.destination.descriptor().root().parent_dir_for(item);
        debug!(src = %from, dest = %into, strategy = ?self.strategy, "Copying item");
        self.copier.copy(&from, &into)
    }
}

fn probe_lock(key: &str) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<Mutex<HashMap<String, Arc<Mutex<()>>>>> = OnceLock::new();
    let mut map = LOCKS.get_or_init(Default::default).lock().unwrap_or_else(|p| p.into_inner());
    map.entry(key.to_string()).or_default().clone()
}

fn unique_marker() -> StoreItem {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or(0);
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    StoreItem::new(format!("{OVERWRITE_MARKER_PREFIX}.{}.{nanos}.{seq}", std::process::id()))
}

/// Copy a fresh marker from `source` into `destination` twice. Returns true when the
/// destination rejects the second copy, i.e. items must be deleted before they are
/// recreated. Inconclusive runs also return true. The marker is removed from both
/// sides afterwards; cleanup failures are only logged.
pub fn run_overwrite_probe(
    source: &dyn ExtendedFileStore,
    destination: &dyn FileStore,
    copier: &dyn PathCopier,
) -> bool {
    let key = destination.descriptor().root().to_string();
    let lock = probe_lock(&key);
    let _guard = lock.lock().unwrap_or_else(|p| p.into_inner());

    let marker = unique_marker();
    let created = source.create_new_file(&marker);
    let verdict = if let Some(f) = created.failure() {
        warn!(source = %source.descriptor(), error = %f, "Cannot create probe marker; assuming delete before create");
        true
    } else {
        let from = source.location(&marker);
        let into = destination.descriptor().root().parent_dir_for(&marker);
        let first = copier.copy(&from, &into);
        if let Some(f) = first.failure() {
            warn!(destination = %destination.descriptor(), error = %f,
                "First probe copy failed; assuming delete before create");
            true
        } else {
            let second = copier.copy(&from, &into);
            match second.failure() {
                Some(f) => {
                    info!(destination = %destination.descriptor(), error = %f,
                        "Destination rejects overwrite by creation");
                    true
                }
                None => false,
            }
        }
    };

    for (side, st) in [("source", source.delete(&marker)), ("destination", destination.delete(&marker))] {
        if let Some(f) = st.failure() {
            warn!(side, marker = %marker, error = %f, "Probe marker cleanup failed");
        }
    }
    debug!(destination = %key, requires_deletion = verdict, "Overwrite probe finished");
    verdict
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::HostAwarePath;
    use crate::errors::StoreError;
    use crate::highwater::{FreeSpaceProvider, HighwaterMark, HighwaterMarkWatcher};
    use crate::store::{FsPathCopier, LocalFileStore};
    use std::sync::atomic::AtomicUsize;

    struct CountingCopier {
        calls: AtomicUsize,
        fail_from: usize,
    }

    impl PathCopier for CountingCopier {
        fn copy(&self, _source: &HostAwarePath, _destination_dir: &HostAwarePath) -> Status {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n >= self.fail_from { Status::retriable("rejected") } else { Status::Ok }
        }
    }

    #[test]
    fn markers_are_unique() {
        let a = unique_marker();
        let b = unique_marker();
        assert_ne!(a, b);
        assert!(a.name().starts_with(OVERWRITE_MARKER_PREFIX));
    }

    #[test]
    fn same_destination_shares_a_lock() {
        assert!(Arc::ptr_eq(&probe_lock("h:/x"), &probe_lock("h:/x")));
        assert!(!Arc::ptr_eq(&probe_lock("h:/x"), &probe_lock("h:/y")));
    }

    fn local(root: &std::path::Path) -> LocalFileStore {
        let watcher = HighwaterMarkWatcher::new(HighwaterMark::disabled(), root, Arc::new(Unlimited));
        LocalFileStore::new(root, "probe test", watcher)
    }

    struct Unlimited;

    impl FreeSpaceProvider for Unlimited {
        fn free_space_kb(&self, _path: &std::path::Path) -> Result<u64, StoreError> {
            Ok(u64::MAX / 2048)
        }
    }

    fn leftover_markers(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(OVERWRITE_MARKER_PREFIX))
            .count()
    }

    #[test]
    fn posix_destination_allows_overwrite() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let source = local(src.path());
        let destination = local(dst.path());
        assert!(!run_overwrite_probe(&source, &destination, &FsPathCopier));
        assert_eq!(leftover_markers(src.path()), 0);
        assert_eq!(leftover_markers(dst.path()), 0);
    }

    #[test]
    fn rejected_second_copy_requires_deletion() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let copier = CountingCopier { calls: AtomicUsize::new(0), fail_from: 1 };
        assert!(run_overwrite_probe(&local(src.path()), &local(dst.path()), &copier));
        assert_eq!(copier.calls.load(Ordering::SeqCst), 2);
        assert_eq!(leftover_markers(src.path()), 0);
    }

    #[test]
    fn failing_first_copy_is_inconclusive() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let copier = CountingCopier { calls: AtomicUsize::new(0), fail_from: 0 };
        assert!(run_overwrite_probe(&local(src.path()), &local(dst.path()), &copier));
        assert_eq!(copier.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delete_then_create_deletes_existing_item_first() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("a.txt"), b"new").unwrap();
        std::fs::write(dst.path().join("a.txt"), b"old content").unwrap();
        let copier = StoreCopier::with_strategy(
            Arc::new(local(src.path())),
            Arc::new(local(dst.path())),
            Arc::new(FsPathCopier),
            CopyStrategy::DeleteThenCreate,
        );
        assert!(copier.copy(&StoreItem::new("a.txt")).is_ok());
        assert_eq!(std::fs::read(dst.path().join("a.txt")).unwrap(), b"new");
    }
}

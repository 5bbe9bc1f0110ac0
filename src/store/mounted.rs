//! Remote share mounted locally.
//!
//! Everything goes to a `LocalFileStore` on the mount point. Only the
//! modification-time scans are bounded: they run on the store's own
//! `TimeoutPool` and the caller gets `TimedOut` if the mount does not answer in
//! time. The scan itself is abandoned, not stopped. While abandoned scans still
//! hold every worker, further scans are refused at once, also as `TimedOut`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::warn;

use super::path_ops::PathCopier;
use super::timeout::{TimedCall, TimeoutPool};
use super::{ExtendedFileStore, FileStore, FileStoreDescriptor};
use crate::errors::StoreError;
use crate::highwater::HighwaterMarkWatcher;
use crate::item::StoreItem;
use crate::status::{BooleanStatus, DateStatus, Status};

pub struct MountedRemoteFileStore {
    inner: Arc<dyn ExtendedFileStore>,
    pool: Arc<TimeoutPool>,
    timeout: Duration,
}

impl MountedRemoteFileStore {
    /// `inner` is usually a `LocalFileStore` on the mount point. `pool` should
    /// not be shared with other stores, or one stuck mount starves the rest.
    pub fn new(inner: impl ExtendedFileStore + 'static, pool: Arc<TimeoutPool>, timeout: Duration) -> Self {
        Self { inner: Arc::new(inner), pool, timeout }
    }

    pub(crate) fn pool(&self) -> &Arc<TimeoutPool> {
        &self.pool
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn bounded_last_changed(&self, item: &StoreItem, threshold: SystemTime) -> Result<DateStatus, StoreError> {
        let inner = Arc::clone(&self.inner);
        let owned = item.clone();
        match self.pool.call(self.timeout, move || inner.last_changed(&owned, threshold)) {
            TimedCall::Completed(result) => result,
            TimedCall::Abandoned { after } => {
                warn!(store = %self.inner.descriptor(), item = %item, timeout_ms = after.as_millis() as u64,
                    "Mount did not answer; scan abandoned");
                Ok(DateStatus::timed_out(format!(
                    "last change of '{}' in {} not determined within {:?}",
                    item,
                    self.inner.descriptor(),
                    after
                )))
            }
            TimedCall::WorkerLost => Ok(DateStatus::retriable(format!(
                "worker scanning '{}' in {} died",
                item,
                self.inner.descriptor()
            ))),
            TimedCall::Saturated { in_flight } => {
                warn!(store = %self.inner.descriptor(), item = %item, in_flight,
                    "Earlier scans still hang on the mount; scan not started");
                Ok(DateStatus::timed_out(format!(
                    "last change of '{}' in {} not determined: {} earlier scans still hang on the mount",
                    item,
                    self.inner.descriptor(),
                    in_flight
                )))
            }
        }
    }
}

impl FileStore for MountedRemoteFileStore {
    fn descriptor(&self) -> &FileStoreDescriptor {
        self.inner.descriptor()
    }

    fn is_remote(&self) -> bool {
        true
    }

    fn exists(&self, item: &StoreItem) -> BooleanStatus {
        self.inner.exists(item)
    }

    fn delete(&self, item: &StoreItem) -> Status {
        self.inner.delete(item)
    }

    fn last_changed(&self, item: &StoreItem, stop_when_younger_than: SystemTime) -> Result<DateStatus, StoreError> {
        self.bounded_last_changed(item, stop_when_younger_than)
    }

    fn last_changed_relative(&self, item: &StoreItem, younger_than: Duration) -> Result<DateStatus, StoreError> {
        let threshold = SystemTime::now().checked_sub(younger_than).unwrap_or(SystemTime::UNIX_EPOCH);
        self.bounded_last_changed(item, threshold)
    }

    fn try_check_directory_fully_accessible(&self, timeout: Duration) -> Option<String> {
        self.inner.try_check_directory_fully_accessible(timeout)
    }

    fn try_list_sort_by_last_modified(&self) -> Option<Vec<StoreItem>> {
        self.inner.try_list_sort_by_last_modified()
    }

    fn highwater_mark_watcher(&self) -> &HighwaterMarkWatcher {
        self.inner.highwater_mark_watcher()
    }

    fn try_as_extended(&self) -> Option<&dyn ExtendedFileStore> {
        Some(self)
    }
}

impl ExtendedFileStore for MountedRemoteFileStore {
    fn root_path(&self) -> &Path {
        self.inner.root_path()
    }

    fn create_new_file(&self, item: &StoreItem) -> Status {
        self.inner.create_new_file(item)
    }

    fn try_move_local(&self, item: &StoreItem, destination_dir: &Path, new_name_prefix: &str) -> Option<PathBuf> {
        self.inner.try_move_local(item, destination_dir, new_name_prefix)
    }

    fn requires_deletion_before_creation(&self, destination: &dyn FileStore, copier: &dyn PathCopier) -> bool {
        super::copier::run_overwrite_probe(self, destination, copier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highwater::{FreeSpaceProvider, HighwaterMark};
    use crate::store::LocalFileStore;
    use std::time::Instant;

    struct Plenty;

    impl FreeSpaceProvider for Plenty {
        fn free_space_kb(&self, _path: &Path) -> Result<u64, StoreError> {
            Ok(1 << 30)
        }
    }

    fn mounted(root: &Path, timeout: Duration) -> MountedRemoteFileStore {
        let watcher = HighwaterMarkWatcher::new(HighwaterMark::disabled(), root, Arc::new(Plenty));
        let pool = Arc::new(TimeoutPool::new("mount-test", 2).unwrap());
        MountedRemoteFileStore::new(LocalFileStore::new(root, "mounted", watcher), pool, timeout)
    }

    #[test]
    fn delegates_to_local_store() {
        let td = tempfile::tempdir().unwrap();
        std::fs::write(td.path().join("a.txt"), b"a").unwrap();
        let s = mounted(td.path(), Duration::from_secs(5));
        assert!(s.is_remote());
        assert!(s.exists(&StoreItem::new("a.txt")).is_true());
        let st = s.last_changed_relative(&StoreItem::new("a.txt"), Duration::from_secs(60)).unwrap();
        assert!(st.result().is_some());
    }

    #[test]
    fn saturated_pool_times_out_within_bound() {
        let td = tempfile::tempdir().unwrap();
        std::fs::write(td.path().join("a.txt"), b"a").unwrap();
        let s = mounted(td.path(), Duration::from_millis(200));
        // Occupy both workers so the scan cannot start.
        for _ in 0..2 {
            let _ = s.pool.call(Duration::from_millis(1), || std::thread::sleep(Duration::from_secs(2)));
        }
        let start = Instant::now();
        let st = s.last_changed(&StoreItem::new("a.txt"), SystemTime::now()).unwrap();
        assert_eq!(st.failure().unwrap().flag(), crate::status::StatusFlag::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}

//! Builds stores and copiers from configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::copier::StoreCopier;
use super::local::LocalFileStore;
use super::mounted::MountedRemoteFileStore;
use super::path_ops::{FsPathCopier, PathCopier};
use super::remote::{RemoteFileStore, RemoteTimeouts};
use super::rsync::RsyncCopier;
use super::timeout::TimeoutPool;
use super::FileStore;
use crate::config::{Config, StoreConfig};
use crate::errors::StoreError;
use crate::highwater::{DfFreeSpaceProvider, HighwaterMark, HighwaterMarkWatcher};
use crate::process::{CommandExecutor, LocalShellExecutor, SshExecutor};

/// Scan workers per mounted store. A store whose mount hangs uses up only its own.
const MOUNT_POOL_THREADS: usize = 2;

/// Executables and time budgets shared by all stores of a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSettings {
    pub ssh_executable: PathBuf,
    pub rsync_executable: PathBuf,
    pub timeouts: RemoteTimeouts,
    pub mount_timeout: Duration,
}

impl RemoteSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            ssh_executable: cfg.ssh_executable.clone(),
            rsync_executable: cfg.rsync_executable.clone(),
            timeouts: RemoteTimeouts { quick: cfg.quick_timeout, long: cfg.long_timeout },
            mount_timeout: cfg.mount_timeout,
        }
    }
}

pub struct StoreFactory {
    settings: RemoteSettings,
}

impl StoreFactory {
    pub fn new(settings: RemoteSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RemoteSettings {
        &self.settings
    }

    pub fn create(&self, cfg: &StoreConfig) -> Result<Arc<dyn FileStore>, StoreError> {
        let mark = cfg.highwater_mark_kb.map(HighwaterMark::from_kb).unwrap_or_else(HighwaterMark::disabled);
        let root = cfg.target.path().to_path_buf();

        if let Some(host) = cfg.target.host() {
            if cfg.mounted {
                return Err(StoreError::Configuration(format!(
                    "store '{}': a remote target cannot be mounted",
                    cfg.name
                )));
            }
            let executor: Arc<dyn CommandExecutor> =
                Arc::new(SshExecutor::new(&self.settings.ssh_executable, host));
            let provider = DfFreeSpaceProvider::new(Arc::clone(&executor), self.settings.timeouts.quick);
            let watcher = HighwaterMarkWatcher::new(mark, &root, Arc::new(provider));
            debug!(store = %cfg.name, target = %cfg.target, "Creating remote store");
            let store = RemoteFileStore::new(root, &cfg.description, executor, self.settings.timeouts, watcher)
                .with_find_executable(cfg.find_executable.clone());
            return Ok(Arc::new(store));
        }

        let provider = DfFreeSpaceProvider::new(Arc::new(LocalShellExecutor::new()), self.settings.timeouts.quick);
        let watcher = HighwaterMarkWatcher::new(mark, &root, Arc::new(provider));
        let local = LocalFileStore::new(root, &cfg.description, watcher);
        if cfg.mounted {
            Ok(Arc::new(self.mounted(cfg, local)?))
        } else {
            debug!(store = %cfg.name, target = %cfg.target, "Creating local store");
            Ok(Arc::new(local))
        }
    }

    fn mounted(&self, cfg: &StoreConfig, local: LocalFileStore) -> Result<MountedRemoteFileStore, StoreError> {
        debug!(store = %cfg.name, target = %cfg.target, "Creating mounted remote store");
        let pool = TimeoutPool::new(&format!("mount-{}", cfg.name), MOUNT_POOL_THREADS)?;
        Ok(MountedRemoteFileStore::new(local, Arc::new(pool), self.settings.mount_timeout))
    }

    /// rsync when either root lives on another host, a plain local copy otherwise.
    pub fn copier_between(&self, source: &dyn FileStore, destination: &dyn FileStore) -> Arc<dyn PathCopier> {
        if source.descriptor().root().is_remote() || destination.descriptor().root().is_remote() {
            Arc::new(RsyncCopier::new(
                &self.settings.rsync_executable,
                &self.settings.ssh_executable,
                self.settings.timeouts.long,
            ))
        } else {
            Arc::new(FsPathCopier)
        }
    }

    /// Copier for the pair, with its strategy chosen by the overwrite probe.
    pub fn store_copier(&self, source: Arc<dyn FileStore>, destination: Arc<dyn FileStore>) -> StoreCopier {
        let copier = self.copier_between(&*source, &*destination);
        StoreCopier::probe(source, destination, copier)
    }
}

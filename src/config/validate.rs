//! Config validation logic.
//! Verifies store names, local roots and timeouts before any store is built.

use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, error, info};

use super::types::{Config, StoreConfig};
use crate::errors::StoreError;

impl Config {
    /// Fail loudly on misconfiguration.
    pub fn validate(&self) -> Result<(), StoreError> {
        ensure_positive(self.quick_timeout, "quick_timeout_seconds")?;
        ensure_positive(self.long_timeout, "long_timeout_seconds")?;
        ensure_positive(self.mount_timeout, "mount_timeout_seconds")?;
        if self.ssh_executable.as_os_str().is_empty() {
            return Err(fail("ssh_executable must not be empty".to_string()));
        }

        let mut seen = HashSet::new();
        for store in &self.stores {
            if store.name.trim().is_empty() {
                return Err(fail(format!("store with target '{}' has no name", store.target)));
            }
            if !seen.insert(store.name.as_str()) {
                return Err(fail(format!("store name '{}' is used more than once", store.name)));
            }
            validate_store(store)?;
        }

        info!(stores = self.stores.len(), log_level = %self.log_level, "Config validated");
        Ok(())
    }
}

fn fail(msg: String) -> StoreError {
    error!("{msg}");
    StoreError::Configuration(msg)
}

fn ensure_positive(value: Duration, name: &str) -> Result<(), StoreError> {
    if value.is_zero() {
        return Err(fail(format!("{name} must be positive")));
    }
    Ok(())
}

fn validate_store(store: &StoreConfig) -> Result<(), StoreError> {
    let name = &store.name;
    if store.target.is_remote() {
        if store.mounted {
            return Err(fail(format!(
                "store '{name}': a remote target cannot be mounted; give the local mount point instead"
            )));
        }
        debug!(store = %name, target = %store.target, "Remote store; not checked locally");
        return Ok(());
    }
    let root = store.target.path();
    if !root.exists() {
        return Err(fail(format!("store '{name}': root does not exist: {}", root.display())));
    }
    if !root.is_dir() {
        return Err(fail(format!("store '{name}': root is not a directory: {}", root.display())));
    }
    debug!(store = %name, root = %root.display(), "Local root present");
    Ok(())
}

//! Core library for `datamover_store`.
//!
//! One contract (`FileStore`) over three kinds of storage: a local disk, a host
//! reachable only through ssh, and a remote share mounted locally. Expected
//! failures come back as `Status` values that say whether a retry makes sense;
//! broken environments are raised as `StoreError`.

pub mod cli;
pub mod config;
pub mod errors;
pub mod helpers;
pub mod highwater;
pub mod item;
pub mod output;
pub mod platform;
pub mod process;
pub mod shutdown;
pub mod status;
pub mod store;

pub use config::{
    default_config_path, default_log_path, path_has_symlink_ancestor, resolve_config_path, Config, LogLevel,
    StoreConfig,
};
pub use errors::StoreError;
pub use highwater::{HighwaterMark, HighwaterMarkWatcher};
pub use item::{HostAwarePath, StoreItem};
pub use status::{BooleanStatus, DateStatus, Failure, Status, StatusFlag};
pub use store::{
    CopyStrategy, ExtendedFileStore, FileStore, FileStoreDescriptor, RemoteSettings, StoreCopier, StoreFactory,
};

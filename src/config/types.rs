//! Core configuration types.
//! - Config holds runtime settings with sensible defaults.
//! - StoreConfig describes one logical endpoint.
//! - LogLevel represents verbosity with simple parsing helpers.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::{
    LONG_TIMEOUT_SECS_DEFAULT, MOUNT_TIMEOUT_SECS_DEFAULT, QUICK_TIMEOUT_SECS_DEFAULT, RSYNC_EXECUTABLE_DEFAULT,
    SSH_EXECUTABLE_DEFAULT,
};
use crate::errors::StoreError;
use crate::item::HostAwarePath;

/// Program-defined verbosity levels exposed to users/config.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Only errors
    Quiet,
    /// Informational output (default)
    #[default]
    Normal,
    /// More info (like verbose)
    Info,
    /// Debug/trace
    Debug,
}

impl LogLevel {
    /// Parse common string names into our LogLevel (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "quiet" | "error" | "none" => Some(LogLevel::Quiet),
            "normal" => Some(LogLevel::Normal),
            "info" | "verbose" => Some(LogLevel::Info),
            "debug" | "trace" => Some(LogLevel::Debug),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Quiet => "quiet",
            LogLevel::Normal => "normal",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        f.write_str(s)
    }
}

impl FromStr for LogLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid log level: '{s}'"))
    }
}

/// One configured store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Name used on the command line
    pub name: String,
    /// Root directory, possibly on a remote host
    pub target: HostAwarePath,
    /// Free-space threshold in kilobytes
    pub highwater_mark_kb: Option<u64>,
    /// Remote share mounted at `target`
    pub mounted: bool,
    /// Remote `find` to use instead of discovering one
    pub find_executable: Option<String>,
    pub description: String,
}

impl StoreConfig {
    /// Build from the `[HOST:]DIR[>KB]` target syntax.
    pub fn parse(name: impl Into<String>, target: &str) -> Result<Self, StoreError> {
        let name = name.into();
        let (target, highwater_mark_kb) = HostAwarePath::parse_with_highwater_mark(target)?;
        Ok(Self {
            description: name.clone(),
            name,
            target,
            highwater_mark_kb,
            mounted: false,
            find_executable: None,
        })
    }
}

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Console verbosity
    pub log_level: LogLevel,
    /// Optional path to a log file
    pub log_file: Option<PathBuf>,
    pub ssh_executable: PathBuf,
    pub rsync_executable: PathBuf,
    /// Budget for existence, delete and accessibility checks
    pub quick_timeout: Duration,
    /// Budget for listings, scans and copies
    pub long_timeout: Duration,
    /// Budget for modification-time scans on mounted shares
    pub mount_timeout: Duration,
    pub stores: Vec<StoreConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Normal,
            log_file: None,
            ssh_executable: PathBuf::from(SSH_EXECUTABLE_DEFAULT),
            rsync_executable: PathBuf::from(RSYNC_EXECUTABLE_DEFAULT),
            quick_timeout: Duration::from_secs(QUICK_TIMEOUT_SECS_DEFAULT),
            long_timeout: Duration::from_secs(LONG_TIMEOUT_SECS_DEFAULT),
            mount_timeout: Duration::from_secs(MOUNT_TIMEOUT_SECS_DEFAULT),
            stores: Vec::new(),
        }
    }
}

impl Config {
    pub fn store(&self, name: &str) -> Result<&StoreConfig, StoreError> {
        self.stores
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| StoreError::UnknownStore(name.to_string()))
    }
}

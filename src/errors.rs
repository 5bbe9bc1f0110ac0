//! Typed error definitions for datamover_store.
//! These cover the raised failure channel only; expected operational failures
//! travel inside `Status` values (see `status`).

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store's environment is unusable (no working `find`, shell client missing, ...).
    /// Retry loops must stop on this.
    #[error("Environment failure: {0}")]
    Environment(String),

    #[error("Failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Cannot determine free space of '{path}' from `{command}`: {reason}")]
    FreeSpaceParse {
        path: PathBuf,
        command: String,
        reason: String,
    },

    /// A probe command ran but did not succeed; a later retry may work.
    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid store item '{item}': {reason}")]
    InvalidItem { item: String, reason: &'static str },

    #[error("Unknown store '{0}'")]
    UnknownStore(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StoreError {
    /// True for failures that indicate the environment itself is broken.
    pub fn is_environment_failure(&self) -> bool {
        matches!(
            self,
            StoreError::Environment(_) | StoreError::Launch { .. } | StoreError::FreeSpaceParse { .. }
        )
    }

    /// Stable numeric code for structured logs and process exit codes.
    pub fn code(&self) -> i32 {
        match self {
            StoreError::Environment(_) => 10,
            StoreError::Launch { .. } => 11,
            StoreError::FreeSpaceParse { .. } => 12,
            StoreError::CommandFailed(_) => 13,
            StoreError::Configuration(_) => 20,
            StoreError::InvalidItem { .. } => 21,
            StoreError::UnknownStore(_) => 22,
            StoreError::Io(_) => 30,
        }
    }
}

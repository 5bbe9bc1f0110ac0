//! CLI definition and parsing.
//!
//! Notes:
//! - --debug is a shorthand for --log-level debug.
//! - CLI flags override values from the XML config.

use clap::{Parser, Subcommand, ValueHint};
use std::path::PathBuf;

use crate::config::types::{Config, LogLevel};

/// Inspect and exercise the configured file stores.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Uniform operations on local, ssh-reachable and mounted file stores")]
pub struct Args {
    /// Config file (default: $DATAMOVER_STORE_CONFIG, then the per-user config dir).
    #[arg(long, global = true, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Enable debug logging (equivalent to `--log-level debug`).
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Set log level. One of: quiet, normal, info, debug.
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Also write logs to this file.
    #[arg(long, global = true, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub log_file: Option<PathBuf>,

    /// Emit logs in structured JSON.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the config file location and the configured stores.
    PrintConfig,
    /// Check that every configured store is fully accessible.
    Check,
    /// List a store's items, oldest first.
    List { store: String },
    /// Tell whether an item exists in a store.
    Exists { store: String, item: String },
    /// Most recent modification time of an item.
    LastChanged {
        store: String,
        item: String,
        /// Stop scanning once something younger than this many seconds is found.
        #[arg(long, value_name = "SECS")]
        younger_than: Option<u64>,
    },
    /// Free space of a store against its high-water mark.
    FreeSpace { store: String },
    /// Run the overwrite probe between two stores.
    ProbeOverwrite { source: String, destination: String },
    /// Copy items from one store into another.
    Copy {
        source: String,
        destination: String,
        #[arg(required = true)]
        items: Vec<String>,
    },
    /// Poll a store's high-water mark until interrupted.
    Watch {
        store: String,
        #[arg(long, value_name = "SECS", default_value_t = 10)]
        interval: u64,
    },
}

impl Args {
    /// Precedence: --debug > --log-level value > None (use config default).
    pub fn effective_log_level(&self) -> Option<LogLevel> {
        if self.debug {
            return Some(LogLevel::Debug);
        }
        self.log_level.as_deref().and_then(LogLevel::parse)
    }

    /// Apply CLI overrides to a loaded Config (in-place). No-ops for unset flags.
    pub fn apply_overrides(&self, cfg: &mut Config) {
        if let Some(level) = self.effective_log_level() {
            cfg.log_level = level;
        }
        if let Some(lf) = &self.log_file {
            cfg.log_file = Some(lf.clone());
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}

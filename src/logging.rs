//! Tracing initialization.
//! Builds a subscriber with EnvFilter, compact or JSON formatting, and optional file logging.
//!
//! Behavior:
//! - Log level is driven by LogLevel (no RUST_LOG override here).
//! - If `log_file` is provided and passes safety checks, a non-blocking file layer is added.
//! - File logging is refused when any ancestor of the file path is a symlink.

use anyhow::{anyhow, Result};
use chrono::Local;
use datamover_store::output as out;
use datamover_store::platform::open_log_file_secure_append;
use datamover_store::{default_log_path, path_has_symlink_ancestor, LogLevel};
use std::fmt as stdfmt;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt as tsfmt;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{registry, Registry};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Human-friendly timestamp formatter (DD/MM/YY HH:MM:SS)
struct LocalHumanTime;
impl FormatTime for LocalHumanTime {
    fn format_time(&self, w: &mut tsfmt::format::Writer<'_>) -> stdfmt::Result {
        write!(w, "{}", Local::now().format("%d/%m/%y %H:%M:%S"))
    }
}

#[inline]
fn to_level_filter(lvl: &LogLevel) -> LevelFilter {
    match lvl {
        LogLevel::Quiet => LevelFilter::ERROR,
        LogLevel::Normal => LevelFilter::INFO,
        LogLevel::Info => LevelFilter::DEBUG,
        LogLevel::Debug => LevelFilter::TRACE,
    }
}

/// stdout-format layer, or the same format into `writer`.
fn format_layer(json: bool, writer: Option<NonBlocking>) -> BoxedLayer {
    let base = tsfmt::layer()
        .with_timer(LocalHumanTime)
        .with_level(true)
        .with_target(true)
        .with_thread_ids(true);
    match (json, writer) {
        (true, Some(w)) => base.json().with_writer(w).with_ansi(false).boxed(),
        (true, None) => base.json().boxed(),
        (false, Some(w)) => base.compact().with_writer(w).with_ansi(false).boxed(),
        (false, None) => base.compact().boxed(),
    }
}

fn maybe_open_non_blocking_writer(path: &Path) -> Option<(NonBlocking, WorkerGuard)> {
    match path_has_symlink_ancestor(path) {
        Ok(true) => {
            out::print_warn(&format!(
                "Refusing to enable file logging: ancestor of {} is a symlink",
                path.display()
            ));
            return None;
        }
        Err(e) => {
            out::print_warn(&format!("Cannot check log path {} for symlinks: {e}", path.display()));
            return None;
        }
        Ok(false) => {}
    }
    match open_log_file_secure_append(path) {
        Ok(file) => Some(tracing_appender::non_blocking(file)),
        Err(e) => {
            out::print_warn(&format!("Failed to open log file {}: {e}", path.display()));
            None
        }
    }
}

/// Initialize tracing. Returns the file appender's guard, which must be held
/// until shutdown so buffered lines are flushed.
pub fn init_tracing(lvl: &LogLevel, log_file: Option<&Path>, json: bool) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::default().add_directive(to_level_filter(lvl).into());
    let mut layers: Vec<BoxedLayer> = vec![format_layer(json, None)];
    let mut guard = None;

    if let Some(path) = log_file {
        match maybe_open_non_blocking_writer(path) {
            Some((writer, g)) => {
                layers.push(format_layer(json, Some(writer)));
                guard = Some(g);
            }
            None => {
                if let Some(def) = default_log_path() {
                    out::print_info(&format!("Logs continue on stdout; the default log path is {}", def.display()));
                }
            }
        }
    }

    registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))?;
    Ok(guard)
}

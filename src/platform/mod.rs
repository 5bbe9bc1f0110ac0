//! Platform-specific file helpers for config and log files.
//! Unix gets owner-only modes and durable atomic writes; other targets get best-effort equivalents.

mod temp;
#[cfg(unix)]
mod unix;
#[cfg(not(unix))]
mod fallback;

pub use temp::tmp_config_sibling_name;

#[cfg(unix)]
pub use unix::{open_log_file_secure_append, set_dir_mode_0700, set_file_mode_0600, write_config_secure_new_0600};

#[cfg(not(unix))]
pub use fallback::{open_log_file_secure_append, set_dir_mode_0700, set_file_mode_0600, write_config_secure_new_0600};

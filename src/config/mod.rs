//! Configuration: types, default paths, XML loading and validation.

pub mod paths;
pub mod types;
mod validate;
pub mod xml;

pub use paths::{default_config_path, default_log_path, path_has_symlink_ancestor, resolve_config_path};
pub use types::{Config, LogLevel, StoreConfig};
pub use xml::{create_template_config, ensure_default_config_exists, load_config_from_xml_path, parse_config_str};

/// Environment variable naming the config file to use instead of the default.
pub const CONFIG_ENV_VAR: &str = "DATAMOVER_STORE_CONFIG";

pub const SSH_EXECUTABLE_DEFAULT: &str = "ssh";
pub const RSYNC_EXECUTABLE_DEFAULT: &str = "rsync";
pub const QUICK_TIMEOUT_SECS_DEFAULT: u64 = 5;
pub const LONG_TIMEOUT_SECS_DEFAULT: u64 = 60;
pub const MOUNT_TIMEOUT_SECS_DEFAULT: u64 = 30;

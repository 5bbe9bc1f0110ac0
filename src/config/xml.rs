//! XML configuration support.
//! - Loads settings from config.xml (quick_xml).
//! - Creates a secure template if missing (unless DATAMOVER_STORE_CONFIG is set).
//!
//! Notes:
//! - Unknown XML elements are rejected to surface misconfigurations early.
//! - Directory checks happen in validation, not here.

use anyhow::Result;
use quick_xml::de::from_str as from_xml_str;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use super::paths::{default_config_path, default_log_path, path_has_symlink_ancestor};
use super::types::{Config, LogLevel, StoreConfig};
use super::{
    CONFIG_ENV_VAR, LONG_TIMEOUT_SECS_DEFAULT, MOUNT_TIMEOUT_SECS_DEFAULT, QUICK_TIMEOUT_SECS_DEFAULT,
    RSYNC_EXECUTABLE_DEFAULT, SSH_EXECUTABLE_DEFAULT,
};
use crate::errors::StoreError;
use crate::helpers::{describe_io_error, io_error_with_help};
use crate::platform::{set_dir_mode_0700, set_file_mode_0600, write_config_secure_new_0600};

/// Struct mirroring the XML config for deserialization.
#[derive(Debug, Deserialize)]
#[serde(rename = "config")]
#[serde(deny_unknown_fields)]
struct XmlConfig {
    log_level: Option<String>,
    log_file: Option<String>,
    ssh_executable: Option<String>,
    rsync_executable: Option<String>,
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    quick_timeout_seconds: Option<u64>,
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    long_timeout_seconds: Option<u64>,
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    mount_timeout_seconds: Option<u64>,
    #[serde(rename = "store", default)]
    stores: Vec<XmlStore>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct XmlStore {
    name: String,
    target: String,
    #[serde(default, deserialize_with = "de_bool_trimmed_opt")]
    mounted: Option<bool>,
    find_executable: Option<String>,
    description: Option<String>,
}

// Trim surrounding whitespace; an empty element counts as absent.
fn de_u64_trimmed_opt<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    match opt.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse::<u64>().map(Some).map_err(serde::de::Error::custom),
    }
}

fn de_bool_trimmed_opt<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    match opt.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse::<bool>().map(Some).map_err(serde::de::Error::custom),
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn xml_to_config(parsed: XmlConfig) -> Result<Config, StoreError> {
    let mut cfg = Config::default();

    if let Some(s) = non_empty(parsed.log_level) {
        cfg.log_level = s.parse::<LogLevel>().map_err(StoreError::Configuration)?;
    }
    cfg.log_file = non_empty(parsed.log_file).map(PathBuf::from);
    if let Some(s) = non_empty(parsed.ssh_executable) {
        cfg.ssh_executable = PathBuf::from(s);
    }
    if let Some(s) = non_empty(parsed.rsync_executable) {
        cfg.rsync_executable = PathBuf::from(s);
    }
    cfg.quick_timeout = Duration::from_secs(parsed.quick_timeout_seconds.unwrap_or(QUICK_TIMEOUT_SECS_DEFAULT));
    cfg.long_timeout = Duration::from_secs(parsed.long_timeout_seconds.unwrap_or(LONG_TIMEOUT_SECS_DEFAULT));
    cfg.mount_timeout = Duration::from_secs(parsed.mount_timeout_seconds.unwrap_or(MOUNT_TIMEOUT_SECS_DEFAULT));

    for store in parsed.stores {
        let mut sc = StoreConfig::parse(store.name.trim(), &store.target)?;
        sc.mounted = store.mounted.unwrap_or(false);
        sc.find_executable = non_empty(store.find_executable);
        if let Some(d) = non_empty(store.description) {
            sc.description = d;
        }
        cfg.stores.push(sc);
    }
    Ok(cfg)
}

/// Parse config XML text. Does not validate directories.
pub fn parse_config_str(contents: &str) -> Result<Config, StoreError> {
    let parsed: XmlConfig =
        from_xml_str(contents).map_err(|e| StoreError::Configuration(format!("invalid config xml: {e}")))?;
    xml_to_config(parsed)
}

/// Load a Config from a specific XML file path.
pub fn load_config_from_xml_path(path: &Path) -> Result<Config, StoreError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| StoreError::Configuration(describe_io_error("read config", path, &e)))?;
    parse_config_str(&contents).map_err(|e| match e {
        StoreError::Configuration(msg) => StoreError::Configuration(format!("{}: {msg}", path.display())),
        other => other,
    })
}

/// Create default template config file and parent directory (best-effort permissions).
pub fn create_template_config(path: &Path) -> Result<()> {
    if path_has_symlink_ancestor(path)? {
        return Err(anyhow::anyhow!(
            "Refusing to create config: ancestor of {} is a symlink",
            path.display()
        ));
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error_with_help("create config dir", parent))?;
        let _ = set_dir_mode_0700(parent);
    }

    let suggested_log = default_log_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "/path/to/datamover_store.log".into());

    let content = format!(
        "<!--\n  datamover_store configuration (XML)\n\n  Settings:\n    log_level              -> quiet | normal | info | debug\n    log_file               -> path to log file (optional)\n    ssh_executable         -> ssh client used for remote stores\n    rsync_executable       -> rsync used for copies involving remote stores\n    quick_timeout_seconds  -> existence, delete and accessibility checks\n    long_timeout_seconds   -> listings, modification-time scans and copies\n    mount_timeout_seconds  -> modification-time scans on mounted shares\n\n  Each <store> has a name and a target in [HOST:]DIR[>KB] syntax, where KB is\n  the free-space high-water mark. Optional: mounted, find_executable, description.\n-->\n<config>\n  <log_level>normal</log_level>\n  <log_file>{}</log_file>\n  <ssh_executable>{}</ssh_executable>\n  <rsync_executable>{}</rsync_executable>\n  <quick_timeout_seconds>{}</quick_timeout_seconds>\n  <long_timeout_seconds>{}</long_timeout_seconds>\n  <mount_timeout_seconds>{}</mount_timeout_seconds>\n  <store>\n    <name>incoming</name>\n    <target>/data/incoming</target>\n    <description>incoming data sets</description>\n  </store>\n</config>\n",
        suggested_log,
        SSH_EXECUTABLE_DEFAULT,
        RSYNC_EXECUTABLE_DEFAULT,
        QUICK_TIMEOUT_SECS_DEFAULT,
        LONG_TIMEOUT_SECS_DEFAULT,
        MOUNT_TIMEOUT_SECS_DEFAULT
    );

    write_config_secure_new_0600(path, content.as_bytes())?;
    let _ = set_file_mode_0600(path);

    info!("Created template config at {}", path.display());
    Ok(())
}

/// Create default config if DATAMOVER_STORE_CONFIG is not set; return created path so the CLI can inform the user.
pub fn ensure_default_config_exists() -> Option<PathBuf> {
    if env::var_os(CONFIG_ENV_VAR).is_some() {
        return None;
    }
    let cfg_path = default_config_path()?;
    if cfg_path.exists() {
        return None;
    }
    match create_template_config(&cfg_path) {
        Ok(()) => Some(cfg_path),
        Err(e) => {
            tracing::warn!(path = %cfg_path.display(), error = %e, "Failed to create template config");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
<config>
  <log_level>debug</log_level>
  <quick_timeout_seconds> 3 </quick_timeout_seconds>
  <store>
    <name>incoming</name>
    <target>/data/in</target>
  </store>
  <store>
    <name>outgoing</name>
    <target>sprint:/data/out>4096</target>
    <find_executable>/usr/local/bin/gfind</find_executable>
    <description>sprint outbox</description>
  </store>
</config>
"#;

    #[test]
    fn parses_settings_and_stores() {
        let cfg = parse_config_str(SAMPLE).unwrap();
        assert_eq!(cfg.log_level, LogLevel::Debug);
        assert_eq!(cfg.quick_timeout, Duration::from_secs(3));
        assert_eq!(cfg.long_timeout, Duration::from_secs(LONG_TIMEOUT_SECS_DEFAULT));
        assert_eq!(cfg.stores.len(), 2);
        let out = cfg.store("outgoing").unwrap();
        assert_eq!(out.target.host(), Some("sprint"));
        assert_eq!(out.highwater_mark_kb, Some(4096));
        assert_eq!(out.find_executable.as_deref(), Some("/usr/local/bin/gfind"));
        assert_eq!(out.description, "sprint outbox");
        assert_eq!(cfg.store("incoming").unwrap().description, "incoming");
    }

    #[test]
    fn rejects_unknown_elements() {
        let err = parse_config_str("<config><source_dir>/x</source_dir></config>").unwrap_err();
        assert!(matches!(err, StoreError::Configuration(_)));
    }

    #[test]
    fn rejects_bad_numbers() {
        assert!(parse_config_str("<config><long_timeout_seconds>soon</long_timeout_seconds></config>").is_err());
    }

    #[test]
    fn template_parses_back() {
        let td = tempfile::tempdir().unwrap();
        let p = td.path().join("cfg/config.xml");
        create_template_config(&p).unwrap();
        let cfg = load_config_from_xml_path(&p).unwrap();
        assert_eq!(cfg.stores[0].name, "incoming");
    }
}

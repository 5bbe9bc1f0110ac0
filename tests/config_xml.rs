use serial_test::serial;
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

use datamover_store::config::{load_config_from_xml_path, CONFIG_ENV_VAR};
use datamover_store::{resolve_config_path, LogLevel, StoreError};

fn write(path: &std::path::Path, body: &str) {
    fs::write(path, format!("<config>\n{body}\n</config>\n")).unwrap();
}

#[test]
#[serial]
fn env_var_selects_config_unless_flag_given() {
    let td = tempdir().unwrap();
    let from_env = td.path().join("env.xml");
    let from_flag = td.path().join("flag.xml");

    unsafe {
        std::env::set_var(CONFIG_ENV_VAR, &from_env);
    }
    assert_eq!(resolve_config_path(None), Some(from_env.clone()));
    assert_eq!(resolve_config_path(Some(from_flag.as_path())), Some(from_flag.clone()));

    unsafe {
        std::env::set_var(CONFIG_ENV_VAR, "");
    }
    assert_ne!(resolve_config_path(None), Some(from_env));
    unsafe {
        std::env::remove_var(CONFIG_ENV_VAR);
    }
}

#[test]
fn reads_stores_and_timeouts() {
    let td = tempdir().unwrap();
    let cfg_path = td.path().join("config.xml");
    let incoming = td.path().join("incoming");
    fs::create_dir_all(&incoming).unwrap();
    write(
        &cfg_path,
        &format!(
            r#"  <log_level>quiet</log_level>
  <long_timeout_seconds>120</long_timeout_seconds>
  <store>
    <name>in</name>
    <target>{}>2048</target>
  </store>
  <store>
    <name>share</name>
    <target>{}</target>
    <mounted> true </mounted>
  </store>"#,
            incoming.display(),
            incoming.display()
        ),
    );

    let cfg = load_config_from_xml_path(&cfg_path).unwrap();
    assert_eq!(cfg.log_level, LogLevel::Quiet);
    assert_eq!(cfg.long_timeout, Duration::from_secs(120));
    assert_eq!(cfg.quick_timeout, Duration::from_secs(5));
    assert_eq!(cfg.stores.len(), 2);

    let inbox = cfg.store("in").unwrap();
    assert_eq!(inbox.highwater_mark_kb, Some(2048));
    assert_eq!(inbox.target.path(), incoming.as_path());
    assert!(!inbox.mounted);
    assert_eq!(inbox.description, "in");
    assert!(cfg.store("share").unwrap().mounted);
    cfg.validate().unwrap();
}

#[test]
fn empty_elements_fall_back_to_defaults() {
    let td = tempdir().unwrap();
    let cfg_path = td.path().join("config.xml");
    write(&cfg_path, "  <log_file>  </log_file>\n  <quick_timeout_seconds></quick_timeout_seconds>");
    let cfg = load_config_from_xml_path(&cfg_path).unwrap();
    assert!(cfg.log_file.is_none());
    assert_eq!(cfg.quick_timeout, Duration::from_secs(5));
    assert!(cfg.stores.is_empty());
}

#[test]
fn malformed_files_are_configuration_errors() {
    let td = tempdir().unwrap();
    let cfg_path = td.path().join("config.xml");

    write(&cfg_path, "  <quick_timeout_seconds>soon</quick_timeout_seconds>");
    let err = load_config_from_xml_path(&cfg_path).unwrap_err();
    assert!(matches!(err, StoreError::Configuration(_)), "{err}");

    write(&cfg_path, "  <source_dir>/tmp</source_dir>");
    let err = load_config_from_xml_path(&cfg_path).unwrap_err();
    assert!(err.to_string().contains("config.xml"), "{err}");

    let missing = load_config_from_xml_path(&td.path().join("absent.xml")).unwrap_err();
    assert_eq!(missing.code(), 20);
}

#[test]
fn validation_rejects_missing_local_root() {
    let td = tempdir().unwrap();
    let cfg_path = td.path().join("config.xml");
    write(
        &cfg_path,
        &format!("  <store>\n    <name>gone</name>\n    <target>{}</target>\n  </store>", td.path().join("nope").display()),
    );
    let cfg = load_config_from_xml_path(&cfg_path).unwrap();
    assert!(cfg.validate().is_err());
}

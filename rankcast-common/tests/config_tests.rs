//! Configuration loading and data directory resolution
//!
//! Tests that touch RANKCAST_DATA_DIR are marked #[serial] so they do not
//! race on the process environment.

use rankcast_common::config::{
    default_data_dir, resolve_data_dir, StoreBackend, TomlConfig, DATA_DIR_ENV,
};
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
fn test_missing_config_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let config = TomlConfig::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.port, 5780);
    assert_eq!(config.store, StoreBackend::File);
    assert!(config.data_dir.is_none());
}

#[test]
fn test_config_file_is_read() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rankcast.toml");
    std::fs::write(
        &path,
        r#"
        port = 5999
        bind_address = "0.0.0.0"
        data_dir = "/srv/rankcast"
        store = "sqlite"
        max_upload_bytes = 1024
        warm_on_startup = false
        watch_data_dir = false
        "#,
    )
    .unwrap();

    let config = TomlConfig::load(&path).unwrap();
    assert_eq!(config.port, 5999);
    assert_eq!(config.bind_address, "0.0.0.0");
    assert_eq!(config.data_dir, Some(PathBuf::from("/srv/rankcast")));
    assert_eq!(config.store, StoreBackend::Sqlite);
    assert_eq!(config.max_upload_bytes, 1024);
    assert!(!config.warm_on_startup);
    assert!(!config.watch_data_dir);
}

#[test]
fn test_malformed_config_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rankcast.toml");
    std::fs::write(&path, "port = \"not a number\"").unwrap();
    assert!(TomlConfig::load(&path).is_err());
}

#[test]
#[serial]
fn test_cli_argument_wins() {
    env::set_var(DATA_DIR_ENV, "/from/env");
    let config = TomlConfig {
        data_dir: Some(PathBuf::from("/from/toml")),
        ..TomlConfig::default()
    };

    let resolved = resolve_data_dir(Some(Path::new("/from/cli")), DATA_DIR_ENV, &config);
    assert_eq!(resolved, PathBuf::from("/from/cli"));

    env::remove_var(DATA_DIR_ENV);
}

#[test]
#[serial]
fn test_env_beats_toml() {
    env::set_var(DATA_DIR_ENV, "/from/env");
    let config = TomlConfig {
        data_dir: Some(PathBuf::from("/from/toml")),
        ..TomlConfig::default()
    };

    assert_eq!(
        resolve_data_dir(None, DATA_DIR_ENV, &config),
        PathBuf::from("/from/env")
    );

    env::remove_var(DATA_DIR_ENV);
}

#[test]
#[serial]
fn test_toml_beats_default() {
    env::remove_var(DATA_DIR_ENV);
    let config = TomlConfig {
        data_dir: Some(PathBuf::from("/from/toml")),
        ..TomlConfig::default()
    };
    assert_eq!(
        resolve_data_dir(None, DATA_DIR_ENV, &config),
        PathBuf::from("/from/toml")
    );
}

#[test]
#[serial]
fn test_falls_back_to_platform_default() {
    env::remove_var(DATA_DIR_ENV);
    assert_eq!(
        resolve_data_dir(None, DATA_DIR_ENV, &TomlConfig::default()),
        default_data_dir()
    );
}

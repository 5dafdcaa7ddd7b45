//! Tests for configuration loading and data folder resolution

use atm_common::config::{
    load_toml_config, resolve_data_dir, resolve_server_url, TomlConfig, DEFAULT_SERVER_URL,
};
use std::path::{Path, PathBuf};

#[test]
fn test_cli_argument_wins() {
    let config = TomlConfig {
        data_dir: Some(PathBuf::from("/from/config")),
        server_url: None,
    };
    let resolved = resolve_data_dir(Some(Path::new("/from/cli")), &config);
    assert_eq!(resolved, PathBuf::from("/from/cli"));
}

#[test]
fn test_config_file_used_without_cli_argument() {
    let config = TomlConfig {
        data_dir: Some(PathBuf::from("/from/config")),
        server_url: None,
    };
    assert_eq!(resolve_data_dir(None, &config), PathBuf::from("/from/config"));
}

#[test]
fn test_default_when_nothing_configured() {
    let resolved = resolve_data_dir(None, &TomlConfig::default());
    assert!(!resolved.as_os_str().is_empty());
    assert!(resolved.ends_with("atm") || resolved.ends_with("atm_data"));
}

#[test]
fn test_load_toml_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "data_dir = \"/srv/survey\"\nserver_url = \"http://survey.local:8000\"\n",
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.data_dir, Some(PathBuf::from("/srv/survey")));
    assert_eq!(config.server_url.as_deref(), Some("http://survey.local:8000"));
}

#[test]
fn test_load_toml_config_missing_keys_default_to_none() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "# empty\n").unwrap();

    assert_eq!(load_toml_config(&path).unwrap(), TomlConfig::default());
}

#[test]
fn test_load_toml_config_reports_syntax_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "data_dir = [unclosed").unwrap();

    let err = load_toml_config(&path).unwrap_err();
    assert!(err.to_string().contains("Configuration error"));
}

#[test]
fn test_server_url_priority() {
    let config = TomlConfig {
        data_dir: None,
        server_url: Some("http://survey.example:9000/".to_string()),
    };
    assert_eq!(
        resolve_server_url(Some("http://localhost:8123"), &config),
        "http://localhost:8123"
    );
    assert_eq!(resolve_server_url(None, &config), "http://survey.example:9000");
    assert_eq!(
        resolve_server_url(None, &TomlConfig::default()),
        DEFAULT_SERVER_URL
    );
}

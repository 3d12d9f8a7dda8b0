use std::fs;

use democonfig::{AppConfig, ConfigError, InputModeSetting, CONFIG_FILE_NAME};
use tempfile::TempDir;

#[test]
fn missing_file_is_not_an_error_for_optional_loads() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    assert!(AppConfig::load_optional(&path).unwrap().is_none());

    let err = AppConfig::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains(CONFIG_FILE_NAME));
}

#[test]
fn loads_config_from_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    fs::write(
        &path,
        "version = 1\ndefault_demo = \"canyon\"\n\n[input]\nmode = \"pointer\"\n",
    )
    .unwrap();

    let config = AppConfig::load_optional(&path).unwrap().unwrap();
    assert_eq!(config.default_demo.as_deref(), Some("canyon"));
    assert_eq!(config.input.mode, InputModeSetting::Pointer);
}

#[test]
fn malformed_file_reports_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    fs::write(&path, "version = [").unwrap();

    let err = AppConfig::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

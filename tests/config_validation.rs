//! Integration tests for configuration validation and port resolution

#![allow(clippy::expect_used, clippy::unwrap_used)]

use backup_protocol::config::{
    read_port_file, BackupConfig, LoggingConfig, DEFAULT_PORT, MAX_PAYLOAD_SIZE,
};
use std::io::Write;
use tracing::Level;

fn port_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write port file");
    file
}

#[test]
fn test_default_config_validates() {
    let config = BackupConfig::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
    assert_eq!(config.server.max_payload_size, MAX_PAYLOAD_SIZE);
}

#[test]
fn test_invalid_server_host() {
    let mut config = BackupConfig::default();
    config.server.host = "not an address".to_string();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Invalid server host")));
}

#[test]
fn test_empty_server_host() {
    let mut config = BackupConfig::default();
    config.server.host = String::new();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("cannot be empty")));
}

#[test]
fn test_tiny_payload_limit() {
    let mut config = BackupConfig::default();
    config.server.max_payload_size = 100;

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Max payload size too small")));
}

#[test]
fn test_empty_storage_paths() {
    let mut config = BackupConfig::default();
    config.storage.database_path = Default::default();
    config.storage.backup_dir = Default::default();

    let errors = config.validate();
    assert_eq!(errors.len(), 2);
    assert!(config.validate_strict().is_err());
}

#[test]
fn test_toml_sections_override_defaults() {
    let config = BackupConfig::from_toml(
        r#"
        [server]
        host = "127.0.0.1"
        port_file = "/etc/backup/port.info"

        [storage]
        backup_dir = "/srv/backups"

        [logging]
        log_level = "debug"
        json_format = true
        "#,
    )
    .expect("valid TOML");

    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port_file.to_str(), Some("/etc/backup/port.info"));
    assert_eq!(config.server.max_payload_size, MAX_PAYLOAD_SIZE);
    assert_eq!(config.storage.backup_dir.to_str(), Some("/srv/backups"));
    assert_eq!(config.storage.database_path.to_str(), Some("server.db"));
    assert_eq!(config.logging.log_level, Level::DEBUG);
    assert!(config.logging.json_format);
}

#[test]
fn test_bad_log_level_is_rejected() {
    let result = BackupConfig::from_toml("[logging]\nlog_level = \"loud\"\n");
    assert!(result.is_err());
}

#[test]
fn test_example_config_parses_back() {
    let example = BackupConfig::example_config();
    let parsed = BackupConfig::from_toml(&example).expect("example config parses");
    assert!(parsed.validate().is_empty());
    assert_eq!(LoggingConfig::default().log_level, parsed.logging.log_level);
}

// ============================================================================
// PORT FILE
// ============================================================================

#[test]
fn test_port_file_value_is_used() {
    let file = port_file("8080\n");
    assert_eq!(read_port_file(file.path()), 8080);
}

#[test]
fn test_port_file_surrounding_whitespace() {
    let file = port_file("  40000  \nignored second line\n");
    assert_eq!(read_port_file(file.path()), 40000);
}

#[test]
fn test_missing_port_file_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(read_port_file(dir.path().join("port.info")), DEFAULT_PORT);
}

#[test]
fn test_unusable_ports_fall_back() {
    for contents in ["", "abc", "0", "80", "1024", "65536", "-5", "99999999999"] {
        let file = port_file(contents);
        assert_eq!(read_port_file(file.path()), DEFAULT_PORT, "contents {contents:?}");
    }
}

#[test]
fn test_port_range_edges_are_accepted() {
    assert_eq!(read_port_file(port_file("1025").path()), 1025);
    assert_eq!(read_port_file(port_file("65535").path()), 65535);
}

#[test]
fn test_listen_address_uses_port_file() {
    let file = port_file("5555");
    let mut config = BackupConfig::default();
    config.server.host = "127.0.0.1".into();
    config.server.port_file = file.path().to_path_buf();
    assert_eq!(config.listen_address(), "127.0.0.1:5555");
}

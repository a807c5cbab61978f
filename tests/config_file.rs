//! Configuration file tests
//!
//! Loads configuration from disk and checks that every failure phase keeps
//! its context.

use routemetrics::cli::generate_config_template;
use routemetrics::config::Config;
use routemetrics::error::AppError;
use std::error::Error;
use std::fs;
use std::str::FromStr;
use tempfile::TempDir;

/// Helper to create temporary directory for file operations
fn create_temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

#[test]
fn test_generated_template_loads_from_file() {
    let temp_dir = create_temp_dir();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, generate_config_template()).expect("Failed to write template");

    let config = Config::from_file(&config_path).expect("template should load");
    assert_eq!(config.context.name, "routemetrics");
    assert_eq!(config.management.port, 9464);
    assert_eq!(config.routes.len(), 2);
    assert_eq!(config.routes[0].id(), "orders");

    let policy = config.policy_config().unwrap();
    assert!(policy.expose_via_management);
    assert_eq!(policy.management_namespace, "routemetrics.metrics");
}

#[test]
fn test_file_read_error_preserves_io_error() {
    let result = Config::from_file("/nonexistent/path/to/config.toml");

    let err = result.unwrap_err();
    assert!(matches!(err, AppError::ConfigFileRead { .. }));
    assert!(err.to_string().contains("/nonexistent/path/to/config.toml"));
    let source = err.source().expect("Should have source error");
    assert!(source.is::<std::io::Error>());
}

#[test]
fn test_parse_error_preserves_toml_error() {
    let temp_dir = create_temp_dir();
    let config_path = temp_dir.path().join("broken.toml");
    fs::write(&config_path, "this is [[[[ not valid toml").unwrap();

    let err = Config::from_file(&config_path).unwrap_err();
    assert!(matches!(err, AppError::ConfigParseFailed { .. }));
    let source = err.source().expect("Should have source error");
    assert!(source.is::<toml::de::Error>());
}

#[test]
fn test_validation_error_names_file_and_reason() {
    let temp_dir = create_temp_dir();
    let config_path = temp_dir.path().join("invalid.toml");
    fs::write(
        &config_path,
        "[context]\nname = \"shop\"\n\n[[routes]]\nid = \"orders\"\nworkers = 0\n",
    )
    .unwrap();

    let err = Config::from_file(&config_path).unwrap_err();
    match err {
        AppError::ConfigValidationFailed { path, reason } => {
            assert!(path.ends_with("invalid.toml"));
            assert!(reason.contains("workers"), "reason: {}", reason);
        }
        other => panic!("expected ConfigValidationFailed, got {:?}", other),
    }
}

#[test]
fn test_from_str_uses_placeholder_path() {
    let err = Config::from_str("not = [valid").unwrap_err();
    assert!(matches!(err, AppError::ConfigParseFailed { ref path, .. } if path == "<string>"));
}

#[test]
fn test_disabled_management_maps_to_policy() {
    let config = Config::from_str(
        "[context]\nname = \"shop\"\n\n[management]\nenabled = false\nport = 0\n",
    )
    .unwrap();

    let policy = config.policy_config().unwrap();
    assert!(!policy.expose_via_management);
    assert_eq!(policy.management_address.port(), 0);
}

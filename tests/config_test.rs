// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cli-guard project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::Result;
use cli_guard::config::{self, Config, StoreBackend};
use std::fs;
use std::sync::Once;
use tempfile::tempdir;

static INIT: Once = Once::new();

// Setup logger for tests
fn setup() {
    INIT.call_once(|| {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

#[test]
fn test_missing_file_is_created_with_defaults() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    let config = Config::from_file(&config_path)?;
    assert!(config_path.exists(), "Default config file was not written");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.guard.session_ttl_seconds, 300);
    assert_eq!(config.store.backend, StoreBackend::Memory);

    // Loading it again yields the same generated secret
    let reloaded = Config::from_file(&config_path)?;
    assert_eq!(reloaded.guard.state_secret, config.guard.state_secret);
    Ok(())
}

#[test]
fn test_save_and_load_round_trip() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("guard.yaml");

    let mut config = Config::default();
    config.server.port = 9443;
    config.guard.max_session_ttl_seconds = 1800;
    config.store.backend = StoreBackend::Redis;
    config.store.key_prefix = "ci".to_string();
    config.save_to_file(&config_path)?;

    let loaded = Config::from_file(&config_path)?;
    assert_eq!(loaded.server.port, 9443);
    assert_eq!(loaded.guard.max_session_ttl_seconds, 1800);
    assert_eq!(loaded.store.backend, StoreBackend::Redis);
    assert_eq!(loaded.store.key_prefix, "ci");
    Ok(())
}

#[test]
fn test_deserialization_error_creates_sample_file() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    let invalid_yaml = r#"
server:
  port: "not-an-integer"
  address: 12345
"#;
    fs::write(&config_path, invalid_yaml)?;

    let result = Config::from_file(&config_path);
    assert!(result.is_err(), "Config loading should have failed");

    let sample_path = config_path.with_extension("sample.yaml");
    assert!(sample_path.exists(), "Sample config file was not created");

    let sample = Config::from_file(&sample_path)?;
    assert_eq!(sample.server.port, 8080);
    Ok(())
}

#[test]
fn test_rule_violation_creates_sample_file() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    // Schema-valid, but the default lifetime exceeds the cap
    let invalid_config = r#"
guard:
  session_ttl_seconds: 900
  max_session_ttl_seconds: 600
"#;
    fs::write(&config_path, invalid_config)?;

    let err = Config::from_file(&config_path).unwrap_err();
    assert!(format!("{:#}", err).contains("session_ttl_seconds"));
    assert!(config_path.with_extension("sample.yaml").exists());
    Ok(())
}

#[test]
fn test_unknown_field_is_rejected() -> Result<()> {
    let yaml = "server:\n  port: 8080\n  tls: true\n";
    assert!(Config::from_yaml_str(yaml).is_err());
    Ok(())
}

#[test]
fn test_apply_args() -> Result<()> {
    let mut config = Config::default();
    config.apply_args(
        Some(8443),
        Some("0.0.0.0".to_string()),
        Some(StoreBackend::Redis),
        Some("redis://cache:6379".to_string()),
    );
    assert_eq!(config.server.port, 8443);
    assert_eq!(config.server.address, "0.0.0.0");
    assert_eq!(config.store.backend, StoreBackend::Redis);
    assert_eq!(config.store.redis_url, "redis://cache:6379");

    config.apply_args(None, None, None, None);
    assert_eq!(config.server.port, 8443);
    Ok(())
}

#[test]
fn test_config_schema_output() -> Result<()> {
    // Output goes to stdout; only check that the embedded schema is usable
    config::output_config_schema()?;
    Ok(())
}

#[test]
fn test_oversized_retention_is_rejected_by_schema() -> Result<()> {
    let yaml = "guard:\n  retention_seconds: 9223372036854775807\n";
    assert!(Config::from_yaml_str(yaml).is_err());

    let yaml = "guard:\n  max_session_ttl_seconds: 10000000000000\n";
    assert!(Config::from_yaml_str(yaml).is_err());
    Ok(())
}

// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eurotherm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::Result;
use rust_eurotherm::config::{
    Config, ModbusConfig, ParityConfig, PollingConfig, RetryPolicy, TransportKind,
};
use std::fs;
use tempfile::tempdir;

#[test]
fn test_config_load_and_save() -> Result<()> {
    // Create a temporary directory
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("eurotherm.yaml");

    // Create a custom config
    let config = Config {
        modbus: ModbusConfig {
            port: "COM9".to_string(),
            slave: 3,
            baud_rate: 19200,
            parity: ParityConfig::Even,
            ..ModbusConfig::default()
        },
        polling: PollingConfig {
            poll_interval_ms: 500,
            retry: RetryPolicy::unbounded(),
            ..PollingConfig::default()
        },
        ..Config::default()
    };

    // Save config to file
    config.save_to_file(&config_path)?;

    // Load config from file
    let loaded_config = Config::from_file(&config_path)?;

    // Verify loaded config matches original
    assert_eq!(loaded_config, config);
    assert_eq!(loaded_config.polling.retry.max_consecutive_failures, None);

    // Test loading default config for non-existent file
    let non_existent_path = temp_dir.path().join("non_existent.yaml");
    let default_config = Config::from_file(&non_existent_path)?;

    // Verify default config was created
    assert!(non_existent_path.exists());
    assert_eq!(default_config, Config::default());
    assert_eq!(default_config.modbus.baud_rate, 9600);
    assert_eq!(default_config.polling.retry.max_consecutive_failures, Some(100));

    Ok(())
}

#[test]
fn test_partial_file_uses_defaults() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("partial.yaml");
    fs::write(
        &config_path,
        "modbus:\n  port: /dev/ttyS1\npolling:\n  retry:\n    max_failure_window_ms: 30000\n",
    )?;

    let config = Config::from_file(&config_path)?;

    assert_eq!(config.modbus.port, "/dev/ttyS1");
    assert_eq!(config.modbus.slave, 1);
    assert_eq!(config.polling.poll_interval_ms, 1000);
    assert_eq!(config.polling.retry.max_failure_window_ms, Some(30_000));
    assert_eq!(config.polling.retry.max_consecutive_failures, Some(100));
    assert_eq!(config.triggers.sequence_delay_ms, 10_000);
    Ok(())
}

#[test]
fn test_schema_violation_creates_sample() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("broken.yaml");
    fs::write(&config_path, "modbus:\n  slave: 0\n")?;

    let result = Config::from_file(&config_path);

    assert!(result.is_err());
    let sample_path = temp_dir.path().join("broken.sample.yaml");
    assert!(sample_path.exists());
    // the sample is itself a valid configuration
    assert_eq!(Config::from_file(&sample_path)?, Config::default());
    Ok(())
}

#[test]
fn test_unknown_key_is_rejected() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("typo.yaml");
    fs::write(&config_path, "modbus:\n  baudrate: 9600\n")?;

    let err = Config::from_file(&config_path).unwrap_err();
    assert!(err.to_string().contains("validation failed"));
    Ok(())
}

#[test]
fn test_tcp_address_checked_by_specific_rules() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("tcp.yaml");
    fs::write(
        &config_path,
        "modbus:\n  transport: tcp\n  tcp_address: gateway-without-port\n",
    )?;

    assert!(Config::from_file(&config_path).is_err());

    fs::write(
        &config_path,
        "modbus:\n  transport: tcp\n  tcp_address: 192.168.1.20:502\n",
    )?;
    let config = Config::from_file(&config_path)?;
    assert_eq!(config.modbus.transport, TransportKind::Tcp);
    Ok(())
}

#[test]
fn test_apply_args_then_validate() {
    let mut config = Config::default();
    config.apply_args(Some("COM4".to_string()), Some(12));
    assert_eq!(config.modbus.port, "COM4");
    assert_eq!(config.modbus.slave, 12);
    assert!(config.validate().is_ok());

    config.apply_args(None, Some(248));
    assert!(config.validate().is_err());
}

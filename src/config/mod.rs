// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eurotherm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the Eurotherm driver
//!
//! This module provides functionality for loading, validating, and applying
//! configuration settings. The configuration is backed by a YAML file and
//! validated against a JSON schema embedded in the binary.
//!
//! ## Configuration Structure
//!
//! - `modbus`: how to reach the controller (RTU serial line or TCP gateway)
//! - `polling`: poll and status intervals plus the retry policy used by the
//!   ramp and status loops
//! - `triggers`: delays bracketing the remote trigger writes
//!
//! ## Usage
//!
//! ```no_run
//! use rust_eurotherm::config::Config;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file("eurotherm.yaml").unwrap();
//!
//! // Override the serial port and subordinate address from the command line
//! config.apply_args(Some("/dev/ttyUSB1".to_string()), Some(2));
//!
//! println!("Serial port: {}", config.modbus.port);
//! ```

pub mod modbus;
pub mod polling;
pub mod utils;

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

pub use modbus::{ModbusConfig, ParityConfig, TransportKind, SUBORDINATE_ADDRESSES};
pub use polling::{PollingConfig, RetryPolicy, TriggerConfig};
pub use utils::output_config_schema;

/// Embedded JSON schema used to validate configuration files.
pub(crate) const CONFIG_SCHEMA: &str = include_str!("../../resources/config.schema.json");

/// Root configuration structure.
///
/// Each section falls back to its defaults when missing from the file, so a
/// file containing only `modbus: { port: COM9 }` is complete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Link to the controller.
    #[serde(default)]
    pub modbus: ModbusConfig,

    /// Polling cadence and retry policy for the ramp and status loops.
    #[serde(default)]
    pub polling: PollingConfig,

    /// Delays used by the remote trigger helpers.
    #[serde(default)]
    pub triggers: TriggerConfig,
}

impl Config {
    /// Helper method to create a sample config file when validation fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");
        debug!("Creating sample configuration file at {:?}", sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load configuration from a file
    ///
    /// A missing file is created with default values. A file that fails
    /// schema validation, deserialization, or the specific rules produces a
    /// `<name>.sample.yaml` next to it and an error.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        // First step: convert YAML to a generic Value
        let yaml_value: serde_yml::Value = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML configuration from {:?}", path))?;

        let json_value = serde_json::to_value(&yaml_value).with_context(|| {
            format!("Failed to convert YAML to JSON for validation: {:?}", path)
        })?;

        let schema: serde_json::Value =
            serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;

        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)?;

        debug!("Validating {} configuration against schema", path.display());
        if let Err(error) = validator.validate(&json_value) {
            error!("Configuration validation error before deserialization");
            Self::create_sample_config(path)?;
            anyhow::bail!("Configuration validation failed: {}", error);
        }

        let config: Config = match serde_yml::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration deserialization error: {}", err);
                if let Err(e) = Self::create_sample_config(path) {
                    error!("Failed to create sample config: {}", e);
                }
                return Err(anyhow::anyhow!(
                    "Failed to deserialize configuration from {}: {}",
                    path.display(),
                    err
                ));
            }
        };

        if let Err(err) = utils::validate_specific_rules(&config) {
            error!("Configuration specific validation error: {}", err);
            Self::create_sample_config(path)?;
            return Err(err);
        }

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Validate an in-memory configuration with the same rules as a file.
    pub fn validate(&self) -> Result<()> {
        utils::validate_specific_rules(self)
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only arguments that were actually provided override the loaded values.
    ///
    /// # Parameters
    ///
    /// * `port` - Serial port name (e.g. `/dev/ttyUSB0`, `COM9`)
    /// * `slave` - Modbus subordinate address of the controller
    pub fn apply_args(&mut self, port: Option<String>, slave: Option<u8>) {
        if let Some(port) = port {
            debug!("Overriding serial port from command line: {}", port);
            self.modbus.port = port;
        }
        if let Some(slave) = slave {
            debug!("Overriding subordinate address from command line: {}", slave);
            self.modbus.slave = slave;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_valid_json() {
        let schema: serde_json::Value = serde_json::from_str(CONFIG_SCHEMA).unwrap();
        assert_eq!(schema["type"], "object");
        assert!(schema["properties"]["modbus"].is_object());
    }

    #[test]
    fn test_default_config_passes_schema() {
        let schema: serde_json::Value = serde_json::from_str(CONFIG_SCHEMA).unwrap();
        let validator = jsonschema::draft202012::options().build(&schema).unwrap();
        let value = serde_json::to_value(Config::default()).unwrap();
        assert!(validator.validate(&value).is_ok());
    }

    #[test]
    fn test_apply_args_only_overrides_given_values() {
        let mut config = Config::default();
        config.apply_args(None, Some(7));
        assert_eq!(config.modbus.slave, 7);
        assert_eq!(config.modbus.port, ModbusConfig::default().port);
    }
}

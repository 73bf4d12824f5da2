// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eurotherm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation and schema management.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use log::debug;

use super::{Config, TransportKind, CONFIG_SCHEMA, SUBORDINATE_ADDRESSES};

/// Output the embedded JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line.
///
/// # Example
///
/// ```bash
/// ./eurotherm --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema: serde_json::Value =
        serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Validates the configuration against rules the JSON schema does not express.
///
/// # Validation Rules
///
/// - **Subordinate address**: 1-247, the Modbus unicast range
/// - **Serial line**: non-zero baud rate, 7 or 8 data bits, 1 or 2 stop bits
/// - **TCP endpoint**: `tcp_address` must parse as a socket address when the
///   TCP transport is selected
/// - **Timing**: timeout and polling intervals must be non-zero
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");
    let modbus = &config.modbus;

    if !SUBORDINATE_ADDRESSES.contains(&modbus.slave) {
        anyhow::bail!("Invalid subordinate address: {}", modbus.slave);
    }

    if modbus.baud_rate == 0 {
        anyhow::bail!("Baud rate must be greater than zero");
    }

    if !matches!(modbus.data_bits, 7 | 8) {
        anyhow::bail!("Unsupported data bits: {}", modbus.data_bits);
    }

    if !matches!(modbus.stop_bits, 1 | 2) {
        anyhow::bail!("Unsupported stop bits: {}", modbus.stop_bits);
    }

    match modbus.transport {
        TransportKind::Tcp => {
            modbus
                .tcp_address
                .parse::<SocketAddr>()
                .with_context(|| format!("Invalid TCP address: {}", modbus.tcp_address))?;
        }
        TransportKind::Rtu => {
            if modbus.port.trim().is_empty() {
                anyhow::bail!("Serial port name is empty");
            }
        }
    }

    if modbus.timeout_ms == 0 {
        anyhow::bail!("Modbus timeout must be greater than zero");
    }

    if config.polling.poll_interval_ms == 0 || config.polling.status_interval_ms == 0 {
        anyhow::bail!("Polling intervals must be greater than zero");
    }

    Ok(())
}

// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eurotherm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus link configuration
//!
//! The controller is normally wired over RS232/RS485 and spoken to in Modbus
//! RTU. Many labs put a Modbus TCP gateway in front of the serial line, so the
//! TCP transport is accepted as well; the register protocol is the same.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::time::Duration;

/// Unicast subordinate addresses; 0 is the RTU broadcast address.
pub const SUBORDINATE_ADDRESSES: RangeInclusive<u8> = 1..=247;

/// Which Modbus transport to open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Modbus RTU over a local serial port
    #[default]
    Rtu,
    /// Modbus TCP through a gateway or the simulated controller
    Tcp,
}

/// Serial parity setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParityConfig {
    #[default]
    None,
    Even,
    Odd,
}

/// Configuration of the link to the controller.
///
/// # Example
///
/// ```
/// use rust_eurotherm::config::ModbusConfig;
///
/// let modbus_config = ModbusConfig {
///     port: "COM9".to_string(),
///     slave: 1,
///     ..ModbusConfig::default()
/// };
/// assert_eq!(modbus_config.baud_rate, 9600);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModbusConfig {
    /// Transport used to reach the controller.
    pub transport: TransportKind,

    /// Serial port name (e.g. `/dev/ttyUSB0`, `COM9`). Used by the RTU transport.
    pub port: String,

    /// Subordinate address of the controller on the bus (1-247).
    pub slave: u8,

    /// Serial line speed.
    pub baud_rate: u32,

    /// Serial data bits (7 or 8).
    pub data_bits: u8,

    /// Serial parity.
    pub parity: ParityConfig,

    /// Serial stop bits (1 or 2).
    pub stop_bits: u8,

    /// `host:port` of the Modbus TCP endpoint. Used by the TCP transport.
    pub tcp_address: String,

    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Rtu,
            port: "/dev/ttyUSB0".to_string(),
            slave: 1,
            baud_rate: 9600, // Eurotherm 3500 factory setting
            data_bits: 8,
            parity: ParityConfig::None,
            stop_bits: 1,
            tcp_address: "127.0.0.1:502".to_string(),
            timeout_ms: 500,
        }
    }
}

impl ModbusConfig {
    /// Request timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

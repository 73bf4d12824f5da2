// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eurotherm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus communication module
//!
//! The driver talks to the controller through the [`RegisterTransport`]
//! trait, one holding register at a time. Framing, CRC and addressing are
//! handled by `tokio-modbus`.
//!
//! ## Key Components
//!
//! - [`ModbusTransport`]: tokio-modbus client context over a serial line
//!   (RTU) or a TCP gateway
//! - [`SimulatedTransport`]: in-memory register bank with scripted reads and
//!   fault injection, for tests and dry runs
//! - [`SimulatedControllerServer`]: Modbus TCP server exposing the controller
//!   register map, for integration tests and bench work without hardware

pub mod client;
pub mod modbus_server;
pub mod simulated;

pub use client::ModbusTransport;
pub use modbus_server::SimulatedControllerServer;
pub use simulated::{ScriptedRead, SimulatedFault, SimulatedTransport};

use crate::error::Result;

/// Holding register access for hardware abstraction
///
/// Implementations perform exactly one bus transaction per call and never
/// retry; retry decisions belong to the caller.
#[async_trait::async_trait]
pub trait RegisterTransport: Send {
    /// Read one holding register (function code 3)
    async fn read_holding_register(&mut self, address: u16) -> Result<u16>;

    /// Write one holding register (function code 16 with a single word)
    async fn write_holding_register(&mut self, address: u16, value: u16) -> Result<()>;
}


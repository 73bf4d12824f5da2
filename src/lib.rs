// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eurotherm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rust Eurotherm library
//!
//! Driver for Eurotherm 3500-series process controllers over Modbus (RTU on a
//! serial line or through a TCP gateway). It reads and writes the loop 1
//! registers, runs heating and cooling ramps to a setpoint, holds timed
//! dwells and fires the remote triggers used to sequence an experiment.

pub mod config;
pub mod error;
pub mod instrument;
pub mod modbus;

pub use error::{EurothermError, Result};
pub use instrument::Eurotherm3500;

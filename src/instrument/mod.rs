// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eurotherm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Eurotherm 3500 process controller driver
//!
//! This module provides:
//! - A register access facade applying fixed-point scaling on top of any
//!   [`RegisterTransport`]
//! - State queries and setpoint/rate mutators for loop 1
//! - Ramp controllers (heating, cooling, dispatch, timed dwell)
//! - Remote trigger helpers for the auxiliary relays and logic outputs
//!
//! Every operation runs to completion on the caller's task; the handle is
//! borrowed mutably for the whole operation so only one flow can drive the
//! instrument at a time.
//!
//! ```no_run
//! use rust_eurotherm::instrument::{Eurotherm3500, RampGoal};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut controller = Eurotherm3500::open("/dev/ttyUSB0", 1).await?;
//!     println!("PV: {} C", controller.process_value().await?);
//!
//!     controller.ramp_to(&RampGoal::new(Some(10.0), Some(150.0))).await?;
//!     controller.dwell(600, "Dwell").await;
//!     Ok(())
//! }
//! ```

pub mod observer;
pub mod queries;
pub mod ramp;
pub mod registers;
pub mod triggers;

pub use observer::{
    ConsoleObserver, InstrumentEvent, InstrumentObserver, RecordingObserver, SilentObserver,
};
pub use queries::InstrumentSnapshot;
pub use ramp::{
    GoalInput, ParamStatus, RampConfiguration, RampDirection, RampGoal, RampOutcome,
    RampParameter,
};
pub use registers::RegisterDescriptor;
pub use triggers::{PidParameters, PidPreset, TriggerSignal};

use log::debug;

use crate::config::{Config, ModbusConfig, PollingConfig, TriggerConfig};
use crate::error::Result;
use crate::modbus::{ModbusTransport, RegisterTransport};

/// Handle on one Eurotherm 3500 controller.
pub struct Eurotherm3500<T: RegisterTransport> {
    transport: T,
    polling: PollingConfig,
    triggers: TriggerConfig,
    observer: Box<dyn InstrumentObserver>,
}

impl Eurotherm3500<ModbusTransport> {
    /// Open a controller on a serial port with the factory serial settings.
    pub async fn open(port: &str, subordinate_address: u8) -> Result<Self> {
        let config = ModbusConfig {
            port: port.to_string(),
            slave: subordinate_address,
            ..ModbusConfig::default()
        };
        Ok(Self::new(ModbusTransport::connect(&config).await?))
    }

    /// Open the link described by the configuration and apply its timing.
    pub async fn connect(config: &Config) -> Result<Self> {
        let transport = ModbusTransport::connect(&config.modbus).await?;
        Ok(Self::new(transport).with_timing(config.polling, config.triggers))
    }
}

impl<T: RegisterTransport> Eurotherm3500<T> {
    /// Wrap a transport with default timing and a console observer.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            polling: PollingConfig::default(),
            triggers: TriggerConfig::default(),
            observer: Box::new(ConsoleObserver::default()),
        }
    }

    pub fn with_timing(mut self, polling: PollingConfig, triggers: TriggerConfig) -> Self {
        self.polling = polling;
        self.triggers = triggers;
        self
    }

    pub fn with_observer(mut self, observer: impl InstrumentObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Read one register and scale it.
    pub async fn read_register(&mut self, register: RegisterDescriptor) -> Result<f64> {
        let raw = self.transport.read_holding_register(register.address).await?;
        let value = register.decode(raw);
        debug!(
            "Register {} = {} (raw {})",
            register.address, value, raw
        );
        Ok(value)
    }

    /// Read one register word without scaling.
    pub async fn read_word(&mut self, register: RegisterDescriptor) -> Result<u16> {
        let raw = self.transport.read_holding_register(register.address).await?;
        debug!("Register {} = raw {}", register.address, raw);
        Ok(raw)
    }

    /// Read one register and compare it against zero.
    pub async fn read_flag(&mut self, register: RegisterDescriptor) -> Result<bool> {
        Ok(self.read_register(register).await? > 0.0)
    }

    /// Scale and write one register. Nothing is sent when the value does not fit.
    pub async fn write_register(&mut self, register: RegisterDescriptor, value: f64) -> Result<()> {
        let raw = register.encode(value)?;
        self.transport
            .write_holding_register(register.address, raw)
            .await?;
        debug!(
            "Register {} <- {} (raw {})",
            register.address, value, raw
        );
        Ok(())
    }

    fn notify(&mut self, event: InstrumentEvent) {
        self.observer.notify(&event);
    }
}

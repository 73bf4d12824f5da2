// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eurotherm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Loop 1 state queries and setpoint/rate mutators

use log::info;
use serde::Serialize;

use super::registers::{
    ALARM1_THRESHOLD, ALARM_SUMMARY, INHIBITED, IR_STATUS, MANUAL_MODE, OUTPUT_PERCENT,
    PROCESS_VALUE, SETPOINT_1, SETPOINT_RATE, SETPOINT_RATE_DISABLED, SETPOINT_TARGET,
    WORKING_SETPOINT,
};
use super::Eurotherm3500;
use crate::error::Result;
use crate::modbus::RegisterTransport;

/// Every loop 1 quantity read in one pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentSnapshot {
    pub working_setpoint: f64,
    pub setpoint_target: f64,
    pub setpoint_rate_disabled: bool,
    pub setpoint_rate: f64,
    pub output_percent: f64,
    pub alarm1_threshold: f64,
    pub alarm_active: bool,
    pub manual: bool,
    pub inhibited: bool,
    pub process_value: f64,
}

impl std::fmt::Display for InstrumentSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SP1:                    {}", self.working_setpoint)?;
        writeln!(f, "SP1 target:             {}", self.setpoint_target)?;
        writeln!(f, "SP-rate Loop1 disabled: {}", self.setpoint_rate_disabled)?;
        writeln!(f, "SP1 rate:               {}", self.setpoint_rate)?;
        writeln!(f, "OP1:                    {}%", self.output_percent)?;
        writeln!(f, "Alarm1 threshold:       {}", self.alarm1_threshold)?;
        writeln!(f, "Alarm summary:          {}", self.alarm_active)?;
        writeln!(f, "Manual mode Loop1:      {}", self.manual)?;
        writeln!(f, "Inhibit Loop1:          {}", self.inhibited)?;
        write!(f, "PV1:                    {}", self.process_value)
    }
}

impl<T: RegisterTransport> Eurotherm3500<T> {
    /// Process value of loop 1, in degrees C.
    pub async fn process_value(&mut self) -> Result<f64> {
        self.read_register(PROCESS_VALUE).await
    }

    /// Setpoint target of loop 1.
    pub async fn setpoint_target(&mut self) -> Result<f64> {
        self.read_register(SETPOINT_TARGET).await
    }

    /// Working setpoint of loop 1, moving toward the target at the ramp rate.
    pub async fn working_setpoint(&mut self) -> Result<f64> {
        self.read_register(WORKING_SETPOINT).await
    }

    /// Setpoint ramp rate, in degrees C per minute.
    pub async fn setpoint_rate(&mut self) -> Result<f64> {
        self.read_register(SETPOINT_RATE).await
    }

    pub async fn is_setpoint_rate_disabled(&mut self) -> Result<bool> {
        self.read_flag(SETPOINT_RATE_DISABLED).await
    }

    /// Output of loop 1, in percent.
    pub async fn output_percent(&mut self) -> Result<f64> {
        self.read_register(OUTPUT_PERCENT).await
    }

    pub async fn is_inhibited(&mut self) -> Result<bool> {
        self.read_flag(INHIBITED).await
    }

    pub async fn is_manual(&mut self) -> Result<bool> {
        self.read_flag(MANUAL_MODE).await
    }

    pub async fn alarm1_threshold(&mut self) -> Result<f64> {
        self.read_register(ALARM1_THRESHOLD).await
    }

    /// True when any alarm is triggered.
    pub async fn is_alarm_active(&mut self) -> Result<bool> {
        self.read_flag(ALARM_SUMMARY).await
    }

    /// Raw IR status word; 1 means the IR acquisition is ready.
    pub async fn ir_status(&mut self) -> Result<u16> {
        self.read_word(IR_STATUS).await
    }

    /// Read every loop 1 quantity. Fails on the first unreadable register.
    pub async fn snapshot(&mut self) -> Result<InstrumentSnapshot> {
        Ok(InstrumentSnapshot {
            working_setpoint: self.working_setpoint().await?,
            setpoint_target: self.setpoint_target().await?,
            setpoint_rate_disabled: self.is_setpoint_rate_disabled().await?,
            setpoint_rate: self.setpoint_rate().await?,
            output_percent: self.output_percent().await?,
            alarm1_threshold: self.alarm1_threshold().await?,
            alarm_active: self.is_alarm_active().await?,
            manual: self.is_manual().await?,
            inhibited: self.is_inhibited().await?,
            process_value: self.process_value().await?,
        })
    }

    /// Set SP1 of loop 1.
    ///
    /// This is not necessarily the working setpoint: the controller ramps the
    /// working setpoint toward SP1 at the configured rate.
    pub async fn set_setpoint(&mut self, value: f64) -> Result<()> {
        self.write_register(SETPOINT_1, value).await?;
        info!("Setpoint set to {} C", value);
        Ok(())
    }

    /// Set the setpoint ramp rate, in degrees C per minute.
    pub async fn set_setpoint_rate(&mut self, value: f64) -> Result<()> {
        self.write_register(SETPOINT_RATE, value).await?;
        info!("Setpoint rate set to {} C/min", value);
        Ok(())
    }

    pub async fn disable_setpoint_rate(&mut self) -> Result<()> {
        self.write_register(SETPOINT_RATE_DISABLED, 1.0).await
    }

    /// Clear the rate disable flag. The rate value itself must also be set for
    /// the ramp to take effect.
    pub async fn enable_setpoint_rate(&mut self) -> Result<()> {
        self.write_register(SETPOINT_RATE_DISABLED, 0.0).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EurothermError;
    use crate::instrument::observer::SilentObserver;
    use crate::modbus::{SimulatedFault, SimulatedTransport};
    use approx::assert_relative_eq;

    fn controller() -> (Eurotherm3500<SimulatedTransport>, SimulatedTransport) {
        let sim = SimulatedTransport::with_controller_defaults();
        (
            Eurotherm3500::new(sim.clone()).with_observer(SilentObserver),
            sim,
        )
    }

    #[tokio::test]
    async fn test_flags_compare_against_zero() {
        let (mut controller, sim) = controller();
        assert!(!controller.is_manual().await.unwrap());
        sim.set_register(273, 2);
        assert!(controller.is_manual().await.unwrap());
        sim.set_register(10213, 1);
        assert!(controller.is_alarm_active().await.unwrap());
    }

    #[tokio::test]
    async fn test_ir_status_is_the_raw_word() {
        let (mut controller, sim) = controller();
        assert_eq!(controller.ir_status().await.unwrap(), 0);
        sim.set_register(361, 0x8001);
        assert_eq!(controller.ir_status().await.unwrap(), 0x8001);
    }

    #[tokio::test]
    async fn test_negative_output_percent() {
        let (mut controller, sim) = controller();
        sim.set_register(85, (-255i16) as u16);
        assert_relative_eq!(controller.output_percent().await.unwrap(), -25.5);
    }

    #[tokio::test]
    async fn test_mutators_write_fixed_registers() {
        let (mut controller, sim) = controller();
        controller.set_setpoint(150.0).await.unwrap();
        controller.set_setpoint_rate(12.5).await.unwrap();
        controller.disable_setpoint_rate().await.unwrap();
        controller.enable_setpoint_rate().await.unwrap();

        assert_eq!(sim.writes(), vec![(24, 1500), (35, 125), (78, 1), (78, 0)]);
    }

    #[tokio::test]
    async fn test_negative_rate_is_rejected_before_sending() {
        let (mut controller, sim) = controller();
        let result = controller.set_setpoint_rate(-5.0).await;
        assert!(matches!(
            result,
            Err(EurothermError::InvalidValue { address: 35, .. })
        ));
        assert!(sim.writes().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_reads_every_quantity() {
        let (mut controller, sim) = controller();
        sim.set_register(289, 1234);
        let snapshot = controller.snapshot().await.unwrap();
        assert_relative_eq!(snapshot.process_value, 123.4);
        assert_relative_eq!(snapshot.setpoint_rate, 10.0);
        assert_relative_eq!(snapshot.alarm1_threshold, 500.0);
        assert!(!snapshot.inhibited);
        assert!(snapshot.to_string().contains("PV1:                    123.4"));
    }

    #[tokio::test]
    async fn test_snapshot_propagates_failure() {
        let (mut controller, sim) = controller();
        sim.script_faults(5, SimulatedFault::NoResponse, 1);
        assert!(matches!(
            controller.snapshot().await,
            Err(EurothermError::Communication(_))
        ));
    }
}

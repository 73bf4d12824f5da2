// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eurotherm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Remote triggering of the auxiliary relay and logic outputs, IR status
//! handshake and PID preset loading

use chrono::{DateTime, Local};
use log::info;
use serde::Serialize;
use tokio::time::sleep;

use super::ramp::RetryBudget;
use super::registers::{
    derivative_time, integral_time, proportional_band, IR_TRIGGER, MS_TRIGGER,
};
use super::{Eurotherm3500, InstrumentEvent};
use crate::error::Result;
use crate::modbus::RegisterTransport;

/// Relay level starting the mass spectrometer sequence (relay AA is active low).
const MS_START: f64 = 0.0;
const MS_STOP: f64 = 1.0;
/// Logic output A level firing the IR acquisition.
const IR_FIRE: f64 = 5.0;
const PULSE_HIGH: f64 = 3.0;
const LOGIC_LOW: f64 = 0.0;
const IR_READY: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSignal {
    MsOn,
    MsOff,
    IrOn,
    PulseOn,
    PulseOff,
}

impl TriggerSignal {
    /// Operator message for the trigger.
    pub fn announcement(self) -> &'static str {
        match self {
            TriggerSignal::MsOn => "MS sequence started",
            TriggerSignal::MsOff => "MS sequence stopped",
            TriggerSignal::IrOn => "IR data acquisition started",
            TriggerSignal::PulseOn => "Pulse ON",
            TriggerSignal::PulseOff => "Pulse OFF",
        }
    }

    /// The logic output triggers are time-stamped for the acquisition log.
    pub fn reports_timestamp(self) -> bool {
        !matches!(self, TriggerSignal::MsOn | TriggerSignal::MsOff)
    }
}

/// Proportional band, integral time and derivative time of loop 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PidParameters {
    pub proportional_band: f64,
    pub integral_time: f64,
    pub derivative_time: f64,
}

/// PID tuning of a known reactor cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidPreset {
    pub name: &'static str,
    pub parameters: PidParameters,
    /// Resolution the three terms are written and read at
    pub decimals: u8,
    /// Output the operator must select once the preset is loaded
    pub output_hint: &'static str,
}

impl PidPreset {
    pub const DRIFTS: PidPreset = PidPreset {
        name: "DRIFTS cell",
        parameters: PidParameters {
            proportional_band: 86.92,
            integral_time: 95.52,
            derivative_time: 15.92,
        },
        decimals: 2,
        output_hint: "LOCAL",
    };

    pub const CLAUSEN_CELL: PidPreset = PidPreset {
        name: "Clausen cell",
        parameters: PidParameters {
            proportional_band: 600.0,
            integral_time: 20.0,
            derivative_time: 4.0,
        },
        decimals: 0,
        output_hint: "AUX",
    };

    pub fn by_name(name: &str) -> Option<PidPreset> {
        match name.trim().to_ascii_lowercase().as_str() {
            "drifts" => Some(Self::DRIFTS),
            "clausen" | "clausen_cell" | "clausen-cell" => Some(Self::CLAUSEN_CELL),
            _ => None,
        }
    }
}

impl<T: RegisterTransport> Eurotherm3500<T> {
    /// Close relay AA to start the MS sequence, then give it time to start.
    pub async fn ms_on(&mut self) -> Result<DateTime<Local>> {
        self.write_register(MS_TRIGGER, MS_START).await?;
        sleep(self.triggers.sequence_delay()).await;
        Ok(self.triggered(TriggerSignal::MsOn))
    }

    /// Open relay AA to stop the MS sequence, then give it time to stop.
    pub async fn ms_off(&mut self) -> Result<DateTime<Local>> {
        self.write_register(MS_TRIGGER, MS_STOP).await?;
        sleep(self.triggers.sequence_delay()).await;
        Ok(self.triggered(TriggerSignal::MsOff))
    }

    /// Pulse logic output A to start an IR acquisition.
    ///
    /// When the pulse delay elapses the output is driven low again. If that
    /// second write fails the output is left high and the error is returned.
    pub async fn ir_on(&mut self) -> Result<DateTime<Local>> {
        self.write_register(IR_TRIGGER, IR_FIRE).await?;
        sleep(self.triggers.pulse_delay()).await;
        self.write_register(IR_TRIGGER, LOGIC_LOW).await?;
        Ok(self.triggered(TriggerSignal::IrOn))
    }

    pub async fn pulse_on(&mut self) -> Result<DateTime<Local>> {
        self.write_register(IR_TRIGGER, PULSE_HIGH).await?;
        Ok(self.triggered(TriggerSignal::PulseOn))
    }

    pub async fn pulse_off(&mut self) -> Result<DateTime<Local>> {
        self.write_register(IR_TRIGGER, LOGIC_LOW).await?;
        Ok(self.triggered(TriggerSignal::PulseOff))
    }

    fn triggered(&mut self, signal: TriggerSignal) -> DateTime<Local> {
        let at = Local::now();
        info!("{}", signal.announcement());
        self.notify(InstrumentEvent::Triggered { signal, at });
        at
    }

    /// Poll the IR status flag until it reads exactly 1.
    ///
    /// Any other value means the acquisition is not ready yet. Returns the
    /// number of successful status reads.
    pub async fn wait_for_ir_ready(&mut self) -> Result<u32> {
        let mut budget = RetryBudget::new(self.polling.retry);
        let mut polls = 0u32;
        loop {
            match self.ir_status().await {
                Ok(status) => {
                    budget.reset();
                    polls += 1;
                    if status == IR_READY {
                        info!("IR acquisition ready after {} status reads", polls);
                        self.notify(InstrumentEvent::IrReady { polls });
                        return Ok(polls);
                    }
                    sleep(self.polling.status_interval()).await;
                }
                Err(e) if e.is_retryable() => self.note_failure(&mut budget, e)?,
                Err(e) => return Err(e),
            }
        }
    }

    /// Read the PID terms of loop 1 at the given resolution.
    pub async fn pid_parameters(&mut self, decimals: u8) -> Result<PidParameters> {
        Ok(PidParameters {
            proportional_band: self.read_register(proportional_band(decimals)).await?,
            integral_time: self.read_register(integral_time(decimals)).await?,
            derivative_time: self.read_register(derivative_time(decimals)).await?,
        })
    }

    /// Load a PID preset and return the terms read back from the controller.
    pub async fn apply_pid_preset(&mut self, preset: &PidPreset) -> Result<PidParameters> {
        let decimals = preset.decimals;
        self.write_register(proportional_band(decimals), preset.parameters.proportional_band)
            .await?;
        self.write_register(integral_time(decimals), preset.parameters.integral_time)
            .await?;
        self.write_register(derivative_time(decimals), preset.parameters.derivative_time)
            .await?;

        let parameters = self.pid_parameters(decimals).await?;
        info!(
            "PID for {} imported: {:?}, output must be switched to {}",
            preset.name, parameters, preset.output_hint
        );
        self.notify(InstrumentEvent::PidApplied {
            preset: preset.name.to_string(),
            parameters,
            output_hint: preset.output_hint.to_string(),
        });
        Ok(parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_lookup() {
        assert_eq!(PidPreset::by_name("DRIFTS"), Some(PidPreset::DRIFTS));
        assert_eq!(PidPreset::by_name("clausen"), Some(PidPreset::CLAUSEN_CELL));
        assert_eq!(PidPreset::by_name("unknown"), None);
    }

    #[test]
    fn test_drifts_terms_fit_their_registers() {
        let preset = PidPreset::DRIFTS;
        assert_eq!(
            proportional_band(preset.decimals)
                .encode(preset.parameters.proportional_band)
                .unwrap(),
            8692
        );
        assert_eq!(
            derivative_time(preset.decimals)
                .encode(preset.parameters.derivative_time)
                .unwrap(),
            1592
        );
    }

    #[test]
    fn test_only_logic_outputs_report_timestamp() {
        assert!(!TriggerSignal::MsOn.reports_timestamp());
        assert!(TriggerSignal::IrOn.reports_timestamp());
        assert!(TriggerSignal::PulseOff.reports_timestamp());
    }
}

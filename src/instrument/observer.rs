// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eurotherm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Progress events published by the ramp, dwell and trigger operations
//!
//! The driver never prints by itself. Every milestone is handed to an
//! [`InstrumentObserver`]; the [`ConsoleObserver`] renders them as the operator
//! status lines shown on the bench terminal, [`RecordingObserver`] keeps them
//! for inspection.

use std::io::Write;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};

use super::ramp::{ParamStatus, RampDirection, RampParameter};
use super::triggers::{PidParameters, TriggerSignal};

/// Timestamp layout printed after a trigger.
pub const TRIGGER_TIMESTAMP_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

#[derive(Debug, Clone, PartialEq)]
pub enum InstrumentEvent {
    /// A heating or cooling controller entered its configuring state
    RampStarted { direction: RampDirection },
    /// The end-of-experiment routine is parking the setpoint
    Parking { rate: f64, target: f64 },
    /// Outcome of writing one ramp parameter
    ParameterConfigured {
        parameter: RampParameter,
        status: ParamStatus,
    },
    /// One successful poll with the goal not yet met
    Poll {
        direction: RampDirection,
        process_value: f64,
        working_setpoint: f64,
        target: f64,
    },
    GoalReached {
        direction: RampDirection,
        process_value: f64,
        target: f64,
    },
    /// A poll failed and is being re-attempted
    TransientFailure { consecutive: u32, message: String },
    DwellStarted { label: String, seconds: u64 },
    DwellTick { elapsed: u64, total: u64 },
    DwellFinished { seconds: u64 },
    Triggered {
        signal: TriggerSignal,
        at: DateTime<Local>,
    },
    PidApplied {
        preset: String,
        parameters: PidParameters,
        output_hint: String,
    },
    IrReady { polls: u32 },
}

/// Receiver of [`InstrumentEvent`]s.
pub trait InstrumentObserver: Send {
    fn notify(&mut self, event: &InstrumentEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObserver;

impl InstrumentObserver for SilentObserver {
    fn notify(&mut self, _event: &InstrumentEvent) {}
}

/// Prints operator status lines on stdout.
///
/// Poll and dwell progress lines are redrawn in place with a carriage return.
#[derive(Debug, Default)]
pub struct ConsoleObserver {
    rate_label: &'static str,
    line_open: bool,
}

impl ConsoleObserver {
    fn overwrite(&mut self, line: String) {
        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "{}\r", line);
        let _ = stdout.flush();
        self.line_open = true;
    }

    fn line(&mut self, line: String) {
        if self.line_open {
            println!();
            self.line_open = false;
        }
        println!("{}", line);
    }
}

impl InstrumentObserver for ConsoleObserver {
    fn notify(&mut self, event: &InstrumentEvent) {
        match event {
            InstrumentEvent::RampStarted { direction } => {
                self.rate_label = match direction {
                    RampDirection::Heating => "Heating rate",
                    RampDirection::Cooling => "Cooling rate",
                };
                self.line(format!("Starting {} event:", direction));
            }
            InstrumentEvent::Parking { target, .. } => {
                self.rate_label = "Cooling rate";
                self.line(format!("Adjusting temperature setpoint to {} C:", target));
            }
            InstrumentEvent::ParameterConfigured { parameter, status } => {
                let shown = match status {
                    ParamStatus::Sent(value) => value.to_string(),
                    ParamStatus::Omitted => "not set".to_string(),
                    ParamStatus::Rejected(reason) => format!("rejected ({})", reason),
                    ParamStatus::WriteFailed(reason) => format!("write failed ({})", reason),
                };
                let line = match parameter {
                    RampParameter::Rate => format!("{}: {} C/min", self.rate_label, shown),
                    RampParameter::Target => format!("Setpoint: {} C", shown),
                };
                self.line(line);
            }
            InstrumentEvent::Poll {
                direction: RampDirection::Heating,
                process_value,
                working_setpoint,
                ..
            } => self.overwrite(format!(
                "WSP Temperature: {} C / PV Temperature: {} C",
                working_setpoint, process_value
            )),
            InstrumentEvent::Poll {
                direction: RampDirection::Cooling,
                process_value,
                target,
                ..
            } => self.overwrite(format!(
                "Setpoint Temperature: {} C / Process Temperature: {} C",
                target, process_value
            )),
            InstrumentEvent::GoalReached { target, .. } => {
                self.line(format!("{} C setpoint reached!", target))
            }
            InstrumentEvent::TransientFailure { .. } | InstrumentEvent::IrReady { .. } => {}
            InstrumentEvent::DwellStarted { label, seconds } => {
                self.line(format!("{} time: {} seconds", label, seconds));
                self.line("=".repeat(60));
            }
            InstrumentEvent::DwellTick { elapsed, .. } => {
                self.overwrite(format!("Time elapsed: {} s", elapsed))
            }
            InstrumentEvent::DwellFinished { seconds } => {
                self.line(format!("End of {} seconds waiting time", seconds))
            }
            InstrumentEvent::Triggered { signal, at } => {
                self.line(signal.announcement().to_string());
                if signal.reports_timestamp() {
                    self.line(format!(
                        "\ndate and time = {}",
                        at.format(TRIGGER_TIMESTAMP_FORMAT)
                    ));
                }
            }
            InstrumentEvent::PidApplied {
                preset,
                parameters,
                output_hint,
            } => self.line(format!(
                "PID for {} is imported, proportional band={}, integral time={}, derivative time={}, please switch output to {}",
                preset,
                parameters.proportional_band,
                parameters.integral_time,
                parameters.derivative_time,
                output_hint
            )),
        }
    }
}

/// Keeps a copy of every event. Clones share the same log.
#[derive(Debug, Default, Clone)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<InstrumentEvent>>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<InstrumentEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl InstrumentObserver for RecordingObserver {
    fn notify(&mut self, event: &InstrumentEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

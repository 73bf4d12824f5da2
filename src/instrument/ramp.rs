// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eurotherm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Ramp controllers
//!
//! A heating or cooling ramp runs in three steps:
//!
//! 1. **Configuring**: the rate (register 35) then the target (register 24)
//!    are written. A parameter that is missing, invalid or fails to write is
//!    recorded in [`RampConfiguration`] and left unset; the ramp goes on.
//! 2. **Polling**: read the process value, read the working setpoint, then
//!    compare against the target. While the goal is not met a [`Poll`] event
//!    is published and the loop sleeps for the poll interval.
//! 3. **Done**: the first reading meeting the goal ends the ramp.
//!
//! Transient read failures and an unset target are re-attempted at once,
//! without sleeping, until the [`RetryPolicy`] gives up. A successful poll
//! restores the full retry budget.
//!
//! [`Poll`]: super::InstrumentEvent::Poll

use std::fmt;
use std::time::Duration;

use log::{info, warn};
use serde::Serialize;
use tokio::time::{sleep, Instant};

use super::registers::{RegisterDescriptor, SETPOINT_1, SETPOINT_RATE};
use super::{Eurotherm3500, InstrumentEvent};
use crate::config::RetryPolicy;
use crate::error::{EurothermError, Result};
use crate::modbus::RegisterTransport;

/// Rate written by [`Eurotherm3500::finish_experiment`], in C/min.
pub const FINISH_RATE: f64 = 10.0;
/// Setpoint the reactor is parked at after an experiment, in C.
pub const FINISH_TARGET: f64 = 18.0;

const DWELL_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RampDirection {
    Heating,
    Cooling,
}

impl RampDirection {
    /// Cooling when the process value is above the target, heating otherwise.
    pub fn classify(process_value: f64, target: f64) -> Self {
        if process_value > target {
            RampDirection::Cooling
        } else {
            RampDirection::Heating
        }
    }

    /// Whether a ramp in this direction still has to wait for the process value.
    pub fn should_continue(self, process_value: f64, target: f64) -> bool {
        match self {
            RampDirection::Heating => process_value < target,
            RampDirection::Cooling => process_value > target,
        }
    }
}

impl fmt::Display for RampDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RampDirection::Heating => write!(f, "heating"),
            RampDirection::Cooling => write!(f, "cooling"),
        }
    }
}

/// One side of a ramp goal as provided by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum GoalInput {
    Omitted,
    Value(f64),
    /// Input that is not a usable number; the ramp proceeds with it unset.
    Invalid { input: String, reason: String },
}

impl GoalInput {
    pub fn from_option(value: Option<f64>) -> Self {
        match value {
            None => GoalInput::Omitted,
            Some(value) if value.is_finite() => GoalInput::Value(value),
            Some(value) => GoalInput::Invalid {
                input: value.to_string(),
                reason: "not a finite number".to_string(),
            },
        }
    }

    /// Parse operator text. Blank text counts as omitted.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return GoalInput::Omitted;
        }
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() => GoalInput::Value(value),
            Ok(_) => GoalInput::Invalid {
                input: trimmed.to_string(),
                reason: "not a finite number".to_string(),
            },
            Err(e) => GoalInput::Invalid {
                input: trimmed.to_string(),
                reason: e.to_string(),
            },
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            GoalInput::Value(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<f64> for GoalInput {
    fn from(value: f64) -> Self {
        GoalInput::from_option(Some(value))
    }
}

/// Rate and target requested for a ramp.
#[derive(Debug, Clone, PartialEq)]
pub struct RampGoal {
    pub rate: GoalInput,
    pub target: GoalInput,
}

impl RampGoal {
    pub fn new(rate: Option<f64>, target: Option<f64>) -> Self {
        Self {
            rate: GoalInput::from_option(rate),
            target: GoalInput::from_option(target),
        }
    }

    pub fn parse(rate: Option<&str>, target: Option<&str>) -> Self {
        Self {
            rate: rate.map_or(GoalInput::Omitted, GoalInput::parse),
            target: target.map_or(GoalInput::Omitted, GoalInput::parse),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RampParameter {
    Rate,
    Target,
}

impl RampParameter {
    fn register(self) -> RegisterDescriptor {
        match self {
            RampParameter::Rate => SETPOINT_RATE,
            RampParameter::Target => SETPOINT_1,
        }
    }
}

/// What happened to one ramp parameter during configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamStatus {
    Sent(f64),
    Omitted,
    /// Refused before anything was sent (unparsable or out of register range)
    Rejected(String),
    /// Valid value whose write did not succeed
    WriteFailed(String),
}

impl ParamStatus {
    /// The value now active on the instrument, if it was sent.
    pub fn value(&self) -> Option<f64> {
        match self {
            ParamStatus::Sent(value) => Some(*value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RampConfiguration {
    pub rate: ParamStatus,
    pub target: ParamStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RampOutcome {
    pub direction: RampDirection,
    pub configuration: RampConfiguration,
    /// Process value of the poll that met the goal
    pub final_pv: f64,
    /// Number of successful polls, the final one included
    pub polls: u32,
}

/// Consecutive failure accounting for one polling loop.
#[derive(Debug)]
pub(crate) struct RetryBudget {
    policy: RetryPolicy,
    failures: u32,
    since: Option<Instant>,
}

impl RetryBudget {
    pub(crate) fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failures: 0,
            since: None,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.failures = 0;
        self.since = None;
    }

    /// Count one failure. Returns the consecutive count, or `RetriesExhausted`
    /// carrying `error` once the policy gives up.
    pub(crate) fn record(&mut self, error: EurothermError) -> Result<u32> {
        self.failures = self.failures.saturating_add(1);
        let elapsed = self.since.get_or_insert_with(Instant::now).elapsed();
        if self.policy.is_exhausted(self.failures, elapsed) {
            return Err(EurothermError::RetriesExhausted {
                attempts: self.failures,
                elapsed,
                last_error: Box::new(error),
            });
        }
        Ok(self.failures)
    }
}

struct PollReading {
    process_value: f64,
    working_setpoint: f64,
    target: f64,
}

impl<T: RegisterTransport> Eurotherm3500<T> {
    /// Heat at `goal.rate` until the process value reaches `goal.target`.
    pub async fn heat(&mut self, goal: &RampGoal) -> Result<RampOutcome> {
        self.run_ramp(RampDirection::Heating, goal).await
    }

    /// Cool at `goal.rate` until the process value falls to `goal.target`.
    pub async fn cool(&mut self, goal: &RampGoal) -> Result<RampOutcome> {
        self.run_ramp(RampDirection::Cooling, goal).await
    }

    /// Read the process value once and run the cooling controller when it is
    /// above the target, the heating controller otherwise.
    pub async fn ramp_to(&mut self, goal: &RampGoal) -> Result<RampOutcome> {
        let direction = self.classify_ramp(goal.target.value()).await?;
        info!("Dispatching to {} controller", direction);
        self.run_ramp(direction, goal).await
    }

    /// Hold for `seconds` whole seconds, publishing one tick per second.
    pub async fn dwell(&mut self, seconds: u64, label: &str) {
        info!("{} for {} s", label, seconds);
        self.notify(InstrumentEvent::DwellStarted {
            label: label.to_string(),
            seconds,
        });
        for elapsed in 1..=seconds {
            sleep(DWELL_TICK).await;
            self.notify(InstrumentEvent::DwellTick {
                elapsed,
                total: seconds,
            });
        }
        self.notify(InstrumentEvent::DwellFinished { seconds });
    }

    /// Park the setpoint at the end of an experiment. Does not wait for it.
    pub async fn finish_experiment(&mut self) -> RampConfiguration {
        info!(
            "Parking setpoint at {} C, {} C/min",
            FINISH_TARGET, FINISH_RATE
        );
        self.notify(InstrumentEvent::Parking {
            rate: FINISH_RATE,
            target: FINISH_TARGET,
        });
        self.configure_ramp(&RampGoal::new(Some(FINISH_RATE), Some(FINISH_TARGET)))
            .await
    }

    /// Write rate then target, recording what happened to each.
    pub async fn configure_ramp(&mut self, goal: &RampGoal) -> RampConfiguration {
        let rate = self.configure_parameter(RampParameter::Rate, &goal.rate).await;
        let target = self
            .configure_parameter(RampParameter::Target, &goal.target)
            .await;
        RampConfiguration { rate, target }
    }

    async fn configure_parameter(
        &mut self,
        parameter: RampParameter,
        input: &GoalInput,
    ) -> ParamStatus {
        let status = match input {
            GoalInput::Omitted => ParamStatus::Omitted,
            GoalInput::Invalid { input, reason } => {
                ParamStatus::Rejected(format!("'{}': {}", input, reason))
            }
            GoalInput::Value(value) => {
                match self.write_register(parameter.register(), *value).await {
                    Ok(()) => ParamStatus::Sent(*value),
                    Err(EurothermError::InvalidValue { reason, .. }) => {
                        ParamStatus::Rejected(format!("{}: {}", value, reason))
                    }
                    Err(e) => ParamStatus::WriteFailed(e.to_string()),
                }
            }
        };

        match &status {
            ParamStatus::Rejected(reason) => warn!("Ramp {:?} rejected {}", parameter, reason),
            ParamStatus::WriteFailed(reason) => {
                warn!("Ramp {:?} could not be written: {}", parameter, reason)
            }
            _ => {}
        }
        self.notify(InstrumentEvent::ParameterConfigured {
            parameter,
            status: status.clone(),
        });
        status
    }

    async fn run_ramp(&mut self, direction: RampDirection, goal: &RampGoal) -> Result<RampOutcome> {
        info!("Starting {} ramp", direction);
        self.notify(InstrumentEvent::RampStarted { direction });
        let configuration = self.configure_ramp(goal).await;
        self.poll_until_reached(direction, configuration).await
    }

    async fn poll_until_reached(
        &mut self,
        direction: RampDirection,
        configuration: RampConfiguration,
    ) -> Result<RampOutcome> {
        let target = configuration.target.value();
        let mut budget = RetryBudget::new(self.polling.retry);
        let mut polls = 0u32;

        loop {
            let reading = match self.poll_once(target).await {
                Ok(reading) => reading,
                Err(e) if e.is_retryable() => {
                    self.note_failure(&mut budget, e)?;
                    continue;
                }
                Err(e) => return Err(e),
            };
            budget.reset();
            polls += 1;

            if !direction.should_continue(reading.process_value, reading.target) {
                info!(
                    "{} C setpoint reached (PV {} C) after {} polls",
                    reading.target, reading.process_value, polls
                );
                self.notify(InstrumentEvent::GoalReached {
                    direction,
                    process_value: reading.process_value,
                    target: reading.target,
                });
                return Ok(RampOutcome {
                    direction,
                    configuration,
                    final_pv: reading.process_value,
                    polls,
                });
            }

            self.notify(InstrumentEvent::Poll {
                direction,
                process_value: reading.process_value,
                working_setpoint: reading.working_setpoint,
                target: reading.target,
            });
            sleep(self.polling.poll_interval()).await;
        }
    }

    async fn poll_once(&mut self, target: Option<f64>) -> Result<PollReading> {
        let process_value = self.process_value().await?;
        let working_setpoint = self.working_setpoint().await?;
        let target = target.ok_or(EurothermError::TargetUnset)?;
        Ok(PollReading {
            process_value,
            working_setpoint,
            target,
        })
    }

    async fn classify_ramp(&mut self, target: Option<f64>) -> Result<RampDirection> {
        let mut budget = RetryBudget::new(self.polling.retry);
        loop {
            let attempt = match self.process_value().await {
                Ok(pv) => target
                    .map(|target| RampDirection::classify(pv, target))
                    .ok_or(EurothermError::TargetUnset),
                Err(e) => Err(e),
            };
            match attempt {
                Ok(direction) => return Ok(direction),
                Err(e) if e.is_retryable() => self.note_failure(&mut budget, e)?,
                Err(e) => return Err(e),
            }
        }
    }

    pub(crate) fn note_failure(&mut self, budget: &mut RetryBudget, error: EurothermError) -> Result<()> {
        let message = error.to_string();
        let consecutive = budget.record(error)?;
        warn!("Poll attempt failed ({} in a row): {}", consecutive, message);
        self.notify(InstrumentEvent::TransientFailure {
            consecutive,
            message,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_equal_is_heating() {
        assert_eq!(RampDirection::classify(50.0, 30.0), RampDirection::Cooling);
        assert_eq!(RampDirection::classify(30.0, 30.0), RampDirection::Heating);
        assert_eq!(RampDirection::classify(20.0, 30.0), RampDirection::Heating);
    }

    #[test]
    fn test_should_continue_stops_at_boundary() {
        assert!(RampDirection::Heating.should_continue(149.9, 150.0));
        assert!(!RampDirection::Heating.should_continue(150.0, 150.0));
        assert!(RampDirection::Cooling.should_continue(30.1, 30.0));
        assert!(!RampDirection::Cooling.should_continue(30.0, 30.0));
    }

    #[test]
    fn test_goal_input_parse() {
        assert_eq!(GoalInput::parse(" 12.5 "), GoalInput::Value(12.5));
        assert_eq!(GoalInput::parse(""), GoalInput::Omitted);
        assert!(matches!(
            GoalInput::parse("fast"),
            GoalInput::Invalid { ref input, .. } if input == "fast"
        ));
        assert!(matches!(GoalInput::parse("NaN"), GoalInput::Invalid { .. }));
        assert!(matches!(
            GoalInput::from_option(Some(f64::INFINITY)),
            GoalInput::Invalid { .. }
        ));
    }

    #[test]
    fn test_goal_parse_keeps_omission_distinct() {
        let goal = RampGoal::parse(None, Some("abc"));
        assert_eq!(goal.rate, GoalInput::Omitted);
        assert_eq!(goal.target.value(), None);
        assert!(matches!(goal.target, GoalInput::Invalid { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_window() {
        let mut budget = RetryBudget::new(RetryPolicy {
            max_consecutive_failures: None,
            max_failure_window_ms: Some(1_000),
        });
        assert_eq!(budget.record(EurothermError::TargetUnset).unwrap(), 1);
        tokio::time::advance(Duration::from_millis(1_500)).await;
        let err = budget.record(EurothermError::TargetUnset).unwrap_err();
        assert!(matches!(
            err,
            EurothermError::RetriesExhausted { attempts: 2, .. }
        ));

        budget.reset();
        assert_eq!(budget.record(EurothermError::TargetUnset).unwrap(), 1);
    }
}

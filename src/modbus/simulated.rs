// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eurotherm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Simulated register transport
//!
//! An in-memory register bank standing in for the controller. Reads can be
//! scripted per register (a queue of words and faults consumed one per read
//! attempt) so that ramp and status loops can be driven through exact
//! process value sequences and transient error bursts.
//!
//! Clones share the same state: hand one clone to the driver and keep another
//! to inspect read counts and the write log afterwards.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;

use crate::error::{EurothermError, Result};
use crate::instrument::registers::{controller_defaults, RegisterDescriptor};

use super::RegisterTransport;

/// Failure injected into a read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedFault {
    /// Behaves like a timeout on the line (`Communication`)
    NoResponse,
    /// Behaves like a reply that cannot be decoded (`Decode`)
    Garbled,
}

impl SimulatedFault {
    fn to_error(self, operation: &str, address: u16) -> EurothermError {
        match self {
            SimulatedFault::NoResponse => EurothermError::Communication(format!(
                "simulated timeout {} register {}",
                operation, address
            )),
            SimulatedFault::Garbled => EurothermError::Decode(format!(
                "simulated garbled reply {} register {}",
                operation, address
            )),
        }
    }
}

/// One scripted read result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedRead {
    Word(u16),
    Fault(SimulatedFault),
}

#[derive(Debug, Default)]
struct SimulatedState {
    registers: HashMap<u16, u16>,
    scripts: HashMap<u16, VecDeque<ScriptedRead>>,
    write_faults: HashMap<u16, VecDeque<Option<SimulatedFault>>>,
    read_attempts: HashMap<u16, usize>,
    writes: Vec<(u16, u16)>,
}

/// In-memory [`RegisterTransport`].
#[derive(Debug, Clone, Default)]
pub struct SimulatedTransport {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedTransport {
    /// Empty register bank: every read of an unknown register fails to decode,
    /// like the illegal data address exception of a real controller.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register bank seeded with an idle controller at room temperature.
    pub fn with_controller_defaults() -> Self {
        let transport = Self::new();
        transport.lock().registers = controller_defaults();
        transport
    }

    fn lock(&self) -> MutexGuard<'_, SimulatedState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_register(&self, address: u16, word: u16) {
        self.lock().registers.insert(address, word);
    }

    /// Store a scaled value; values that do not fit the register are ignored.
    pub fn set_value(&self, register: RegisterDescriptor, value: f64) {
        if let Ok(word) = register.encode(value) {
            self.set_register(register.address, word);
        }
    }

    pub fn register(&self, address: u16) -> Option<u16> {
        self.lock().registers.get(&address).copied()
    }

    /// Queue read results for a register, consumed one per read attempt.
    /// Once the queue is empty, reads return the stored register content.
    pub fn script(&self, address: u16, reads: impl IntoIterator<Item = ScriptedRead>) {
        self.lock()
            .scripts
            .entry(address)
            .or_default()
            .extend(reads);
    }

    /// Queue a sequence of scaled values for a register.
    pub fn script_values(&self, register: RegisterDescriptor, values: &[f64]) {
        let reads = values
            .iter()
            .filter_map(|value| register.encode(*value).ok())
            .map(ScriptedRead::Word)
            .collect::<Vec<_>>();
        self.script(register.address, reads);
    }

    /// Queue `count` identical faults for the next reads of a register.
    pub fn script_faults(&self, address: u16, fault: SimulatedFault, count: usize) {
        self.script(address, std::iter::repeat(ScriptedRead::Fault(fault)).take(count));
    }

    /// Make the next `count` writes to a register fail without being applied.
    pub fn fail_writes(&self, address: u16, fault: SimulatedFault, count: usize) {
        self.script_writes(address, std::iter::repeat(Some(fault)).take(count));
    }

    /// Queue write outcomes for a register, consumed one per write attempt:
    /// `None` lets the write through, `Some(fault)` fails it.
    pub fn script_writes(
        &self,
        address: u16,
        outcomes: impl IntoIterator<Item = Option<SimulatedFault>>,
    ) {
        self.lock()
            .write_faults
            .entry(address)
            .or_default()
            .extend(outcomes);
    }

    /// Number of read attempts on a register, failed ones included.
    pub fn read_attempts(&self, address: u16) -> usize {
        self.lock().read_attempts.get(&address).copied().unwrap_or(0)
    }

    /// Every successful write, in order, as `(address, word)`.
    pub fn writes(&self) -> Vec<(u16, u16)> {
        self.lock().writes.clone()
    }

    /// Successful writes to one register, in order.
    pub fn writes_to(&self, address: u16) -> Vec<u16> {
        self.lock()
            .writes
            .iter()
            .filter(|(written, _)| *written == address)
            .map(|(_, word)| *word)
            .collect()
    }
}

#[async_trait::async_trait]
impl RegisterTransport for SimulatedTransport {
    async fn read_holding_register(&mut self, address: u16) -> Result<u16> {
        let mut state = self.lock();
        *state.read_attempts.entry(address).or_insert(0) += 1;

        let scripted = state
            .scripts
            .get_mut(&address)
            .and_then(|queue| queue.pop_front());
        match scripted {
            Some(ScriptedRead::Fault(fault)) => Err(fault.to_error("reading", address)),
            Some(ScriptedRead::Word(word)) => {
                state.registers.insert(address, word);
                debug!("Simulated register {} read raw {}", address, word);
                Ok(word)
            }
            None => state.registers.get(&address).copied().ok_or_else(|| {
                EurothermError::Decode(format!(
                    "exception IllegalDataAddress reading register {}",
                    address
                ))
            }),
        }
    }

    async fn write_holding_register(&mut self, address: u16, value: u16) -> Result<()> {
        let mut state = self.lock();
        let fault = state
            .write_faults
            .get_mut(&address)
            .and_then(|queue| queue.pop_front())
            .flatten();
        if let Some(fault) = fault {
            return Err(fault.to_error("writing", address));
        }

        state.registers.insert(address, value);
        state.writes.push((address, value));
        debug!("Simulated register {} written raw {}", address, value);
        Ok(())
    }
}

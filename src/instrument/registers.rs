// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eurotherm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Eurotherm 3500 register map
//!
//! Every quantity lives in a single 16-bit holding register. A
//! [`RegisterDescriptor`] fixes the address, the number of implied decimal
//! places and whether the word is two's complement.
//!
//! | Register | Decimals | Meaning |
//! |---|---|---|
//! | 2 | 1 | Setpoint target, loop 1 |
//! | 5 | 1 | Working setpoint, loop 1 |
//! | 6 / 8 / 9 | preset | PID proportional band / integral time / derivative time |
//! | 24 | 1 | SP1 (write) |
//! | 35 | 1 | Setpoint ramp rate |
//! | 78 | 0 | Setpoint rate disable flag |
//! | 85 | 1 | Output % |
//! | 268 | 0 | Loop inhibit flag |
//! | 273 | 0 | Manual mode flag |
//! | 289 | 1 | Process value, loop 1 |
//! | 361 | 0 | IR status flag |
//! | 363 | 0 | MS trigger relay |
//! | 376 | 0 | IR / pulse trigger level |
//! | 10213 | 0 | Alarm summary |
//! | 10241 | 1 | Alarm 1 threshold |

use std::collections::HashMap;

use crate::error::{EurothermError, Result};

/// How a raw 16-bit word maps to a physical quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterDescriptor {
    pub address: u16,
    pub decimals: u8,
    pub signed: bool,
}

impl RegisterDescriptor {
    pub const fn new(address: u16, decimals: u8, signed: bool) -> Self {
        Self {
            address,
            decimals,
            signed,
        }
    }

    pub const fn unsigned(address: u16, decimals: u8) -> Self {
        Self::new(address, decimals, false)
    }

    pub const fn signed(address: u16, decimals: u8) -> Self {
        Self::new(address, decimals, true)
    }

    fn scale(&self) -> f64 {
        10f64.powi(i32::from(self.decimals))
    }

    /// Convert a raw word into the scaled quantity.
    pub fn decode(&self, raw: u16) -> f64 {
        let integer = if self.signed {
            f64::from(raw as i16)
        } else {
            f64::from(raw)
        };
        integer / self.scale()
    }

    /// Convert a quantity into the raw word, rounding to the register resolution.
    pub fn encode(&self, value: f64) -> Result<u16> {
        if !value.is_finite() {
            return Err(self.invalid(value, "not a finite number"));
        }

        let scaled = (value * self.scale()).round();
        let (min, max) = if self.signed {
            (f64::from(i16::MIN), f64::from(i16::MAX))
        } else {
            (0.0, f64::from(u16::MAX))
        };
        if scaled < min || scaled > max {
            return Err(self.invalid(
                value,
                &format!(
                    "out of range [{}, {}]",
                    min / self.scale(),
                    max / self.scale()
                ),
            ));
        }

        Ok(if self.signed {
            scaled as i16 as u16
        } else {
            scaled as u16
        })
    }

    fn invalid(&self, value: f64, reason: &str) -> EurothermError {
        EurothermError::InvalidValue {
            address: self.address,
            value,
            reason: reason.to_string(),
        }
    }
}

pub const SETPOINT_TARGET: RegisterDescriptor = RegisterDescriptor::signed(2, 1);
pub const WORKING_SETPOINT: RegisterDescriptor = RegisterDescriptor::signed(5, 1);
pub const SETPOINT_1: RegisterDescriptor = RegisterDescriptor::signed(24, 1);
pub const SETPOINT_RATE: RegisterDescriptor = RegisterDescriptor::unsigned(35, 1);
pub const SETPOINT_RATE_DISABLED: RegisterDescriptor = RegisterDescriptor::unsigned(78, 0);
pub const OUTPUT_PERCENT: RegisterDescriptor = RegisterDescriptor::signed(85, 1);
pub const INHIBITED: RegisterDescriptor = RegisterDescriptor::unsigned(268, 0);
pub const MANUAL_MODE: RegisterDescriptor = RegisterDescriptor::unsigned(273, 0);
pub const PROCESS_VALUE: RegisterDescriptor = RegisterDescriptor::signed(289, 1);
pub const IR_STATUS: RegisterDescriptor = RegisterDescriptor::unsigned(361, 0);
pub const MS_TRIGGER: RegisterDescriptor = RegisterDescriptor::unsigned(363, 0);
pub const IR_TRIGGER: RegisterDescriptor = RegisterDescriptor::unsigned(376, 0);
pub const ALARM_SUMMARY: RegisterDescriptor = RegisterDescriptor::unsigned(10213, 0);
pub const ALARM1_THRESHOLD: RegisterDescriptor = RegisterDescriptor::signed(10241, 1);

// PID terms share one resolution chosen by the preset being loaded.
pub const fn proportional_band(decimals: u8) -> RegisterDescriptor {
    RegisterDescriptor::unsigned(6, decimals)
}

pub const fn integral_time(decimals: u8) -> RegisterDescriptor {
    RegisterDescriptor::unsigned(8, decimals)
}

pub const fn derivative_time(decimals: u8) -> RegisterDescriptor {
    RegisterDescriptor::unsigned(9, decimals)
}

/// Register bank of an idle controller sitting at room temperature.
///
/// Used to seed the simulated transport and the simulated Modbus server.
pub fn controller_defaults() -> HashMap<u16, u16> {
    let mut registers = HashMap::new();
    let mut seed = |register: RegisterDescriptor, value: f64| {
        if let Ok(raw) = register.encode(value) {
            registers.insert(register.address, raw);
        }
    };

    seed(SETPOINT_TARGET, 25.0);
    seed(WORKING_SETPOINT, 25.0);
    seed(proportional_band(0), 600.0);
    seed(integral_time(0), 20.0);
    seed(derivative_time(0), 4.0);
    seed(SETPOINT_1, 25.0);
    seed(SETPOINT_RATE, 10.0);
    seed(SETPOINT_RATE_DISABLED, 0.0);
    seed(OUTPUT_PERCENT, 0.0);
    seed(INHIBITED, 0.0);
    seed(MANUAL_MODE, 0.0);
    seed(PROCESS_VALUE, 25.0);
    seed(IR_STATUS, 0.0);
    seed(MS_TRIGGER, 1.0);
    seed(IR_TRIGGER, 0.0);
    seed(ALARM_SUMMARY, 0.0);
    seed(ALARM1_THRESHOLD, 500.0);

    registers
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_decode_one_decimal() {
        assert_relative_eq!(PROCESS_VALUE.decode(253), 25.3);
        assert_relative_eq!(SETPOINT_RATE.decode(100), 10.0);
    }

    #[test]
    fn test_signed_decode_negative() {
        // -12.5 C is 0xFF83 on the wire
        assert_relative_eq!(PROCESS_VALUE.decode(0xFF83), -12.5);
        assert_relative_eq!(SETPOINT_RATE.decode(0xFF83), 6541.1);
    }

    #[test]
    fn test_encode_rounds_to_resolution() {
        assert_eq!(SETPOINT_1.encode(150.04).unwrap(), 1500);
        assert_eq!(SETPOINT_1.encode(150.05).unwrap(), 1501);
        assert_eq!(SETPOINT_1.encode(-12.5).unwrap(), 0xFF83);
    }

    #[test]
    fn test_encode_rejects_out_of_range() {
        assert!(SETPOINT_RATE.encode(-1.0).is_err());
        assert!(SETPOINT_RATE.encode(6553.5).is_ok());
        assert!(SETPOINT_RATE.encode(6553.6).is_err());
        assert!(SETPOINT_1.encode(3276.8).is_err());
    }

    #[test]
    fn test_encode_rejects_non_finite() {
        let err = SETPOINT_1.encode(f64::NAN).unwrap_err();
        assert!(matches!(err, EurothermError::InvalidValue { address: 24, .. }));
        assert!(SETPOINT_1.encode(f64::INFINITY).is_err());
    }

    #[test]
    fn test_round_trip_is_stable_at_register_scale() {
        for raw in [0u16, 1, 253, 1500, 0x7FFF, 0x8000, 0xFF83, 0xFFFF] {
            let value = PROCESS_VALUE.decode(raw);
            assert_eq!(PROCESS_VALUE.encode(value).unwrap(), raw);
        }
    }

    #[test]
    fn test_controller_defaults_cover_map() {
        let defaults = controller_defaults();
        for register in [SETPOINT_TARGET, WORKING_SETPOINT, PROCESS_VALUE, IR_STATUS] {
            assert!(defaults.contains_key(&register.address));
        }
        assert_eq!(defaults[&PROCESS_VALUE.address], 250);
    }
}

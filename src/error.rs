// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eurotherm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Error types for the Eurotherm driver
//!
//! `EurothermError` separates the two recoverable failure kinds seen at the
//! transport boundary from caller mistakes and from policy outcomes:
//!
//! - **`Communication`**: the instrument did not answer correctly at the
//!   transport level (timeout, no response, framing or CRC mismatch).
//! - **`Decode`**: an answer arrived but it is not the expected numeric reply
//!   (Modbus exception response, wrong word count, mismatched frame).
//! - **`InvalidValue`**: a value cannot be encoded into the target register.
//!   Nothing is sent to the instrument in that case.
//! - **`TargetUnset`**: a ramp comparison was attempted without a usable
//!   target setpoint.
//! - **`RetriesExhausted`**: a polling loop gave up according to its
//!   [`RetryPolicy`](crate::config::RetryPolicy).
//!
//! Application level code (configuration loading, CLI) uses `anyhow` on top
//! of these.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the driver error type.
pub type Result<T> = std::result::Result<T, EurothermError>;

#[derive(Error, Debug)]
pub enum EurothermError {
    #[error("Communication error: {0}")]
    Communication(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid value {value} for register {address}: {reason}")]
    InvalidValue {
        address: u16,
        value: f64,
        reason: String,
    },

    #[error("Target setpoint is not set")]
    TargetUnset,

    #[error("Failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Gave up after {attempts} consecutive failed attempts in {elapsed:?}: {last_error}")]
    RetriesExhausted {
        attempts: u32,
        elapsed: Duration,
        last_error: Box<EurothermError>,
    },
}

impl EurothermError {
    /// True for failures a polling loop may re-attempt without changing state.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EurothermError::Communication(_)
                | EurothermError::Decode(_)
                | EurothermError::TargetUnset
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EurothermError::Communication("timeout after 500ms".to_string());
        assert_eq!(err.to_string(), "Communication error: timeout after 500ms");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(EurothermError::Decode("exception".into()).is_retryable());
        assert!(EurothermError::TargetUnset.is_retryable());
        assert!(!EurothermError::InvalidValue {
            address: 24,
            value: f64::NAN,
            reason: "not finite".into(),
        }
        .is_retryable());
    }

    #[test]
    fn test_exhausted_keeps_last_error() {
        let err = EurothermError::RetriesExhausted {
            attempts: 3,
            elapsed: Duration::from_millis(20),
            last_error: Box::new(EurothermError::Communication("no response".into())),
        };
        let message = err.to_string();
        assert!(message.contains("3 consecutive"));
        assert!(message.contains("no response"));
    }
}

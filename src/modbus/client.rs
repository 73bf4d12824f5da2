// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eurotherm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus client transport
//!
//! For avoiding confusion with the Modbus master/slave terminology, this module
//! uses "client" for the side issuing requests (this driver) and "subordinate"
//! for the addressed controller.

use std::net::SocketAddr;
use std::time::Duration;

use log::debug;
use tokio_modbus::client::{rtu, tcp, Context, Reader, Writer};
use tokio_modbus::Slave;
use tokio_serial::SerialStream;

use crate::config::{ModbusConfig, ParityConfig, TransportKind, SUBORDINATE_ADDRESSES};
use crate::error::{EurothermError, Result};

use super::RegisterTransport;

/// Register transport backed by a tokio-modbus client context.
pub struct ModbusTransport {
    ctx: Context,
    endpoint: String,
    timeout: Duration,
}

impl ModbusTransport {
    /// Open the transport described by the configuration.
    pub async fn connect(config: &ModbusConfig) -> Result<Self> {
        match config.transport {
            TransportKind::Rtu => Self::open_rtu(config),
            TransportKind::Tcp => Self::connect_tcp(config).await,
        }
    }

    /// Open a serial port and attach a Modbus RTU client to it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open_rtu(config: &ModbusConfig) -> Result<Self> {
        check_subordinate(&config.port, config.slave)?;
        let builder = tokio_serial::new(&config.port, config.baud_rate)
            .data_bits(data_bits(config.data_bits))
            .parity(parity(config.parity))
            .stop_bits(stop_bits(config.stop_bits))
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(config.timeout());

        let stream = SerialStream::open(&builder).map_err(|e| EurothermError::Connect {
            endpoint: config.port.clone(),
            source: e.into(),
        })?;

        debug!(
            "Serial port '{}' opened at {} baud, subordinate {}",
            config.port, config.baud_rate, config.slave
        );

        Ok(Self {
            ctx: rtu::attach_slave(stream, Slave(config.slave)),
            endpoint: config.port.clone(),
            timeout: config.timeout(),
        })
    }

    /// Connect to a Modbus TCP endpoint (gateway or simulated controller).
    pub async fn connect_tcp(config: &ModbusConfig) -> Result<Self> {
        check_subordinate(&config.tcp_address, config.slave)?;
        let socket_addr: SocketAddr =
            config
                .tcp_address
                .parse()
                .map_err(|e| EurothermError::Connect {
                    endpoint: config.tcp_address.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
                })?;

        let ctx = tokio::time::timeout(
            config.timeout(),
            tcp::connect_slave(socket_addr, Slave(config.slave)),
        )
        .await
        .map_err(|_| EurothermError::Connect {
            endpoint: config.tcp_address.clone(),
            source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connection timed out"),
        })?
        .map_err(|e| EurothermError::Connect {
            endpoint: config.tcp_address.clone(),
            source: e,
        })?;

        debug!(
            "Connected to Modbus TCP endpoint {}, subordinate {}",
            socket_addr, config.slave
        );

        Ok(Self {
            ctx,
            endpoint: config.tcp_address.clone(),
            timeout: config.timeout(),
        })
    }

    /// Port name or socket address this transport talks to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn no_response(&self, operation: &str, address: u16) -> EurothermError {
        EurothermError::Communication(format!(
            "no response from {} within {:?} while {} register {}",
            self.endpoint, self.timeout, operation, address
        ))
    }
}

#[async_trait::async_trait]
impl RegisterTransport for ModbusTransport {
    async fn read_holding_register(&mut self, address: u16) -> Result<u16> {
        let response = tokio::time::timeout(
            self.timeout,
            self.ctx.read_holding_registers(address, 1),
        )
        .await
        .map_err(|_| self.no_response("reading", address))?;

        let words = response
            .map_err(|e| classify(e, "reading", address))?
            .map_err(|code| {
                EurothermError::Decode(format!(
                    "exception {:?} reading register {}",
                    code, address
                ))
            })?;

        match words.as_slice() {
            [word] => {
                debug!("Register {} read raw {}", address, word);
                Ok(*word)
            }
            other => Err(EurothermError::Decode(format!(
                "expected 1 word from register {}, got {}",
                address,
                other.len()
            ))),
        }
    }

    async fn write_holding_register(&mut self, address: u16, value: u16) -> Result<()> {
        let response = tokio::time::timeout(
            self.timeout,
            self.ctx.write_multiple_registers(address, &[value]),
        )
        .await
        .map_err(|_| self.no_response("writing", address))?;

        response
            .map_err(|e| classify(e, "writing", address))?
            .map_err(|code| {
                EurothermError::Decode(format!(
                    "exception {:?} writing register {}",
                    code, address
                ))
            })?;

        debug!("Register {} written raw {}", address, value);
        Ok(())
    }
}

/// Refuse the broadcast address and the reserved range before touching the line.
fn check_subordinate(endpoint: &str, slave: u8) -> Result<()> {
    if SUBORDINATE_ADDRESSES.contains(&slave) {
        return Ok(());
    }
    Err(EurothermError::Connect {
        endpoint: endpoint.to_string(),
        source: std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("subordinate address {} is outside 1-247", slave),
        ),
    })
}

/// Transport failures are communication errors; protocol mismatches mean the
/// reply could not be decoded.
fn classify(error: tokio_modbus::Error, operation: &str, address: u16) -> EurothermError {
    match error {
        tokio_modbus::Error::Transport(io) => EurothermError::Communication(format!(
            "{} register {}: {}",
            operation, address, io
        )),
        other => EurothermError::Decode(format!("{} register {}: {}", operation, address, other)),
    }
}

fn data_bits(bits: u8) -> tokio_serial::DataBits {
    match bits {
        5 => tokio_serial::DataBits::Five,
        6 => tokio_serial::DataBits::Six,
        7 => tokio_serial::DataBits::Seven,
        _ => tokio_serial::DataBits::Eight,
    }
}

fn parity(parity: ParityConfig) -> tokio_serial::Parity {
    match parity {
        ParityConfig::None => tokio_serial::Parity::None,
        ParityConfig::Even => tokio_serial::Parity::Even,
        ParityConfig::Odd => tokio_serial::Parity::Odd,
    }
}

fn stop_bits(bits: u8) -> tokio_serial::StopBits {
    match bits {
        2 => tokio_serial::StopBits::Two,
        _ => tokio_serial::StopBits::One,
    }
}

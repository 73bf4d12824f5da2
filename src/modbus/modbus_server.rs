// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eurotherm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Simulated Eurotherm 3500 exposed as a Modbus TCP server
//!
//! For avoiding confusion with the Modbus master/slave terminology, this module uses
//! the terms "server" and "client" instead. The server is the device that provides data,
//! while the client is the device that requests data.
//!
//! The server holds the controller register map in a shared bank so that a
//! test (or an operator at the bench) can move the process value while a
//! driver is connected. Writing SP1 (register 24) also updates the setpoint
//! target (register 2), as the controller does when SP1 is the active setpoint.

use std::{
    collections::HashMap,
    future,
    io,
    sync::{Arc, Mutex, MutexGuard},
};

use log::{debug, error, info};
use tokio::net::TcpListener;
use tokio_modbus::{
    prelude::*,
    server::tcp::{accept_tcp_connection, Server},
};

use crate::instrument::registers::{
    controller_defaults, RegisterDescriptor, SETPOINT_1, SETPOINT_TARGET,
};

/// Register bank of a simulated controller, served over Modbus TCP.
#[derive(Debug, Clone)]
pub struct SimulatedControllerServer {
    /// Holding registers (read-write), shared by every connection and clone
    holding_registers: Arc<Mutex<HashMap<u16, u16>>>,
}

impl tokio_modbus::server::Service for SimulatedControllerServer {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    /// Process a Modbus request and provide a response
    ///
    /// - 0x03: Read Holding Registers
    /// - 0x10: Write Multiple Registers
    /// - 0x06: Write Single Register
    ///
    /// Any other function code will return an IllegalFunction exception.
    fn call(&self, req: Self::Request) -> Self::Future {
        debug!("Received Modbus request: {:?}", req);

        let res = match req {
            Request::ReadHoldingRegisters(addr, cnt) => {
                register_read(&self.registers(), addr, cnt).map(Response::ReadHoldingRegisters)
            }
            Request::WriteMultipleRegisters(addr, values) => {
                register_write(&mut self.registers(), addr, &values)
                    .map(|_| Response::WriteMultipleRegisters(addr, values.len() as u16))
            }
            Request::WriteSingleRegister(addr, value) => register_write(
                &mut self.registers(),
                addr,
                std::slice::from_ref(&value),
            )
            .map(|_| Response::WriteSingleRegister(addr, value)),
            _ => {
                error!(
                    "Exception::IllegalFunction - Unimplemented function code in request: {req:?}"
                );
                Err(ExceptionCode::IllegalFunction)
            }
        };

        future::ready(res)
    }
}

impl Default for SimulatedControllerServer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedControllerServer {
    /// Create a controller sitting idle at room temperature.
    pub fn new() -> Self {
        Self {
            holding_registers: Arc::new(Mutex::new(controller_defaults())),
        }
    }

    fn registers(&self) -> MutexGuard<'_, HashMap<u16, u16>> {
        self.holding_registers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Raw content of a register.
    pub fn register(&self, address: u16) -> Option<u16> {
        self.registers().get(&address).copied()
    }

    /// Scaled content of a register.
    pub fn value(&self, register: RegisterDescriptor) -> Option<f64> {
        self.register(register.address)
            .map(|word| register.decode(word))
    }

    /// Overwrite a register, e.g. to move the simulated process value.
    pub fn set_value(&self, register: RegisterDescriptor, value: f64) {
        if let Ok(word) = register.encode(value) {
            self.registers().insert(register.address, word);
        }
    }

    /// Accept Modbus TCP clients on `listener` until the listener fails.
    pub async fn serve(self, listener: TcpListener) -> io::Result<()> {
        info!("Simulated controller listening on {:?}", listener.local_addr());
        let server = Server::new(listener);

        let on_connected = move |stream, socket_addr| {
            let service = self.clone();
            async move {
                debug!("Modbus client connected from {}", socket_addr);
                accept_tcp_connection(stream, socket_addr, move |_socket_addr| {
                    Ok(Some(service.clone()))
                })
            }
        };

        let on_process_error = |err| {
            error!("Modbus server error: {err}");
        };

        server.serve(&on_connected, on_process_error).await
    }
}

/// Helper function implementing reading registers from a HashMap.
fn register_read(
    registers: &HashMap<u16, u16>,
    addr: u16,
    cnt: u16,
) -> Result<Vec<u16>, ExceptionCode> {
    let mut response_values = Vec::with_capacity(cnt.into());
    for i in 0..cnt {
        let value = addr
            .checked_add(i)
            .and_then(|reg_addr| registers.get(&reg_addr));
        match value {
            Some(r) => response_values.push(*r),
            None => {
                error!(
                    "Exception::IllegalDataAddress - Register {} not found",
                    u32::from(addr) + u32::from(i)
                );
                return Err(ExceptionCode::IllegalDataAddress);
            }
        }
    }

    Ok(response_values)
}

/// Write holding registers. Used by both the write single register
/// and write multiple registers requests.
///
/// The whole request is checked before anything is written, so a request
/// touching an unknown register leaves the bank unchanged.
fn register_write(
    registers: &mut HashMap<u16, u16>,
    addr: u16,
    values: &[u16],
) -> Result<(), ExceptionCode> {
    let mut targets = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        let reg_addr = u16::try_from(i)
            .ok()
            .and_then(|offset| addr.checked_add(offset))
            .filter(|reg_addr| registers.contains_key(reg_addr));
        match reg_addr {
            Some(reg_addr) => targets.push(reg_addr),
            None => {
                error!("Exception::IllegalDataAddress - write at {} offset {}", addr, i);
                return Err(ExceptionCode::IllegalDataAddress);
            }
        }
    }

    for (reg_addr, value) in targets.into_iter().zip(values) {
        registers.insert(reg_addr, *value);
        if reg_addr == SETPOINT_1.address {
            registers.insert(SETPOINT_TARGET.address, *value);
        }
        debug!("Written value {} to register {}", value, reg_addr);
    }

    Ok(())
}

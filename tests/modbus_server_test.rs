// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eurotherm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Tests for the SimulatedControllerServer implementation
//!
//! These tests start a simulated controller on an ephemeral port, then talk
//! to it both with a raw tokio-modbus client and through the driver over its
//! Modbus TCP transport.

use std::net::SocketAddr;
use std::time::Duration;

use approx::assert_relative_eq;
use tokio::net::TcpListener;
use tokio::time;
use tokio_modbus::prelude::*;

use rust_eurotherm::config::{Config, ModbusConfig, PollingConfig, TransportKind};
use rust_eurotherm::instrument::registers::{PROCESS_VALUE, SETPOINT_TARGET};
use rust_eurotherm::instrument::{
    Eurotherm3500, RampDirection, RampGoal, RegisterDescriptor, SilentObserver,
};
use rust_eurotherm::modbus::{ModbusTransport, SimulatedControllerServer};
use rust_eurotherm::EurothermError;

/// Test utility function to start a simulated controller in the background
async fn start_test_server(
) -> Result<(SocketAddr, SimulatedControllerServer), Box<dyn std::error::Error>> {
    // Use port 0 to let the OS assign an available port
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let socket_addr = listener.local_addr()?;

    let server = SimulatedControllerServer::new();
    let background = server.clone();
    tokio::spawn(async move {
        if let Err(e) = background.serve(listener).await {
            eprintln!("Server error: {}", e);
        }
    });

    Ok((socket_addr, server))
}

async fn connect_driver(
    socket_addr: SocketAddr,
) -> Result<Eurotherm3500<ModbusTransport>, Box<dyn std::error::Error>> {
    let config = Config {
        modbus: ModbusConfig {
            transport: TransportKind::Tcp,
            tcp_address: socket_addr.to_string(),
            timeout_ms: 2_000,
            ..ModbusConfig::default()
        },
        polling: PollingConfig {
            poll_interval_ms: 10,
            ..PollingConfig::default()
        },
        ..Config::default()
    };
    Ok(Eurotherm3500::connect(&config)
        .await?
        .with_observer(SilentObserver))
}

#[tokio::test]
async fn test_raw_client_reads_register_map() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, _server) = start_test_server().await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    let data = ctx.read_holding_registers(289, 1).await??;
    assert_eq!(data, vec![250]);

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_sp1_write_moves_setpoint_target() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, server) = start_test_server().await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    ctx.write_single_register(24, 1500).await??;

    assert_eq!(server.register(24), Some(1500));
    assert_eq!(ctx.read_holding_registers(2, 1).await??, vec![1500]);

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_unknown_register_is_exception() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, _server) = start_test_server().await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    let response = ctx.read_holding_registers(4242, 1).await?;
    assert_eq!(response, Err(ExceptionCode::IllegalDataAddress));

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_driver_queries_over_tcp() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, server) = start_test_server().await?;
    let mut controller = connect_driver(socket_addr).await?;

    server.set_value(PROCESS_VALUE, -12.5);
    assert_relative_eq!(controller.process_value().await?, -12.5);

    controller.set_setpoint(150.0).await?;
    assert_eq!(server.value(SETPOINT_TARGET), Some(150.0));
    assert_relative_eq!(controller.setpoint_target().await?, 150.0);

    let snapshot = controller.snapshot().await?;
    assert_relative_eq!(snapshot.setpoint_rate, 10.0);
    assert!(!snapshot.manual);
    Ok(())
}

#[tokio::test]
async fn test_driver_refuses_broadcast_address() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, server) = start_test_server().await?;
    let config = Config {
        modbus: ModbusConfig {
            transport: TransportKind::Tcp,
            tcp_address: socket_addr.to_string(),
            slave: 0,
            ..ModbusConfig::default()
        },
        ..Config::default()
    };

    let result = Eurotherm3500::connect(&config).await;

    assert!(matches!(result, Err(EurothermError::Connect { .. })));
    assert_eq!(server.register(24), Some(250));
    Ok(())
}

#[tokio::test]
async fn test_driver_maps_exception_to_decode_error() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, _server) = start_test_server().await?;
    let mut controller = connect_driver(socket_addr).await?;

    let result = controller
        .read_register(RegisterDescriptor::unsigned(4242, 0))
        .await;
    assert!(matches!(result, Err(EurothermError::Decode(_))));

    // the link is still usable afterwards
    assert_relative_eq!(controller.process_value().await?, 25.0);
    Ok(())
}

#[tokio::test]
async fn test_cooling_ramp_over_tcp() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, server) = start_test_server().await?;
    let mut controller = connect_driver(socket_addr).await?;
    server.set_value(PROCESS_VALUE, 200.0);

    // the simulated reactor cools down while the driver polls
    let reactor = server.clone();
    tokio::spawn(async move {
        time::sleep(Duration::from_millis(50)).await;
        reactor.set_value(PROCESS_VALUE, 150.0);
    });

    let outcome = controller
        .ramp_to(&RampGoal::new(Some(20.0), Some(150.0)))
        .await?;

    assert_eq!(outcome.direction, RampDirection::Cooling);
    assert_relative_eq!(outcome.final_pv, 150.0);
    assert!(outcome.polls >= 2);
    assert_eq!(server.register(35), Some(200));
    Ok(())
}

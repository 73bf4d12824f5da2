// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eurotherm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the Eurotherm 3500 command line tool
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use rust_eurotherm::config::{self, Config};
use rust_eurotherm::instrument::{Eurotherm3500, PidPreset, RampGoal, RampOutcome};
use rust_eurotherm::modbus::{ModbusTransport, SimulatedControllerServer};

use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::signal;

/// Drive a Eurotherm 3500 process controller over Modbus
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file (YAML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to a configuration to validate and exit
    #[arg(long)]
    validate_config: Option<PathBuf>,

    /// Output the configuration schema as JSON and exit
    #[arg(long)]
    show_config_schema: bool,

    /// Serial port of the controller (overrides the configuration)
    #[arg(long)]
    port: Option<String>,

    /// Modbus subordinate address of the controller (overrides the configuration)
    #[arg(long)]
    slave: Option<u8>,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print every loop 1 quantity
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write SP1 of loop 1
    SetSp { value: f64 },
    /// Write the setpoint ramp rate (C/min)
    SetRate { value: f64 },
    /// Enable or disable the setpoint ramp rate
    SpRate { state: RateSwitch },
    /// Heat to a setpoint and wait until it is reached
    Heat(RampArgs),
    /// Cool to a setpoint and wait until it is reached
    Cool(RampArgs),
    /// Heat or cool to a setpoint depending on the current process value
    Ramp(RampArgs),
    /// Wait a number of seconds, printing progress
    Dwell {
        seconds: u64,
        /// Label printed before the countdown
        #[arg(long, default_value = "Dwell")]
        label: String,
    },
    /// Park the setpoint at 18 C, 10 C/min
    Finish,
    /// Fire a remote trigger
    Trigger { signal: TriggerArg },
    /// Load a PID preset
    Pid { preset: PresetArg },
    /// Serve a simulated controller over Modbus TCP
    Simulate {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:5020")]
        listen: SocketAddr,
    },
}

#[derive(Debug, clap::Args)]
struct RampArgs {
    /// Ramp rate in C/min; left unchanged when omitted
    #[arg(long)]
    rate: Option<String>,

    /// Target setpoint in C
    #[arg(long)]
    target: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RateSwitch {
    Enable,
    Disable,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TriggerArg {
    MsOn,
    MsOff,
    IrOn,
    PulseOn,
    PulseOff,
    IrWait,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PresetArg {
    Drifts,
    Clausen,
}

impl PresetArg {
    fn preset(self) -> PidPreset {
        match self {
            PresetArg::Drifts => PidPreset::DRIFTS,
            PresetArg::Clausen => PidPreset::CLAUSEN_CELL,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logger with appropriate level based on verbose and quiet flags
    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .parse_env("RUST_LOG")
        .init();

    // Check if --show-config-schema flag is set
    if args.show_config_schema {
        return config::output_config_schema();
    }

    // Validate configuration file if --validate-config is set
    if let Some(validate_path) = args.validate_config {
        if !validate_path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file does not exist: {}",
                validate_path.display()
            ));
        }

        Config::from_file(&validate_path)
            .map_err(|err| anyhow::anyhow!("Configuration validation failed: {}", err))?;
        println!("Configuration file is valid: {}", validate_path.display());
        return Ok(());
    }

    let command = args.command.unwrap_or(Command::Status { json: false });

    if let Command::Simulate { listen } = command {
        return simulate(listen).await;
    }

    // Load configuration
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("eurotherm.yaml"));
    let mut config = Config::from_file(&config_path)?;

    // Apply command line overrides
    config.apply_args(args.port.clone(), args.slave);
    config.validate()?;

    let mut controller = Eurotherm3500::connect(&config)
        .await
        .context("Failed to open the controller link")?;
    info!(
        "Connected to {} (subordinate {})",
        controller.transport().endpoint(),
        config.modbus.slave
    );

    // Dropping the running operation on Ctrl-C stops it between two bus transactions
    tokio::select! {
        result = run(&mut controller, command) => result,
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal, operation aborted");
            Ok(())
        }
    }
}

async fn run(controller: &mut Eurotherm3500<ModbusTransport>, command: Command) -> Result<()> {
    match command {
        Command::Status { json } => {
            let snapshot = controller.snapshot().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                println!("{}", snapshot);
            }
        }
        Command::SetSp { value } => controller.set_setpoint(value).await?,
        Command::SetRate { value } => controller.set_setpoint_rate(value).await?,
        Command::SpRate {
            state: RateSwitch::Enable,
        } => controller.enable_setpoint_rate().await?,
        Command::SpRate {
            state: RateSwitch::Disable,
        } => controller.disable_setpoint_rate().await?,
        Command::Heat(ramp) => report(controller.heat(&ramp.goal()).await?),
        Command::Cool(ramp) => report(controller.cool(&ramp.goal()).await?),
        Command::Ramp(ramp) => report(controller.ramp_to(&ramp.goal()).await?),
        Command::Dwell { seconds, label } => controller.dwell(seconds, &label).await,
        Command::Finish => {
            let configuration = controller.finish_experiment().await;
            info!("Setpoint parked: {:?}", configuration);
        }
        Command::Trigger { signal } => match signal {
            TriggerArg::MsOn => {
                controller.ms_on().await?;
            }
            TriggerArg::MsOff => {
                controller.ms_off().await?;
            }
            TriggerArg::IrOn => {
                controller.ir_on().await?;
            }
            TriggerArg::PulseOn => {
                controller.pulse_on().await?;
            }
            TriggerArg::PulseOff => {
                controller.pulse_off().await?;
            }
            TriggerArg::IrWait => {
                let polls = controller.wait_for_ir_ready().await?;
                println!("IR acquisition ready ({} status reads)", polls);
            }
        },
        Command::Pid { preset } => {
            controller.apply_pid_preset(&preset.preset()).await?;
        }
        Command::Simulate { .. } => {
            anyhow::bail!("the simulated controller runs without a controller link")
        }
    }
    Ok(())
}

impl RampArgs {
    fn goal(&self) -> RampGoal {
        RampGoal::parse(self.rate.as_deref(), self.target.as_deref())
    }
}

fn report(outcome: RampOutcome) {
    info!(
        "{} ramp done after {} polls, final PV {} C",
        outcome.direction, outcome.polls, outcome.final_pv
    );
}

/// Serve a simulated controller until Ctrl-C.
async fn simulate(listen: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind {}", listen))?;
    let server = SimulatedControllerServer::new();

    tokio::select! {
        result = server.serve(listener) => result.context("Simulated controller stopped")?,
        _ = signal::ctrl_c() => info!("Received shutdown signal, stopping simulated controller"),
    }
    Ok(())
}

// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use shmsens_config::SystemManifest;
use shmsens_core::bus::SystemBus;
use shmsens_core::peripherals::i2c_sensor::{I2cCtrl, REG_CTRL};
use shmsens_core::snapshot::MachineSnapshot;
use shmsens_core::source::{ScalarSource, ShmSource};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use tracing::{error, info};

const EXIT_PASS: u8 = 0;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

fn parse_u64(s: &str) -> Result<u64, String> {
    let trimmed = s.trim();
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value '{}': {}", s, e))
    } else {
        u64::from_str(trimmed).map_err(|e| format!("Invalid value '{}': {}", s, e))
    }
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let v = parse_u64(s)?;
    u32::try_from(v).map_err(|_| format!("Value '{}' does not fit in 32 bits", s))
}

fn parse_u8(s: &str) -> Result<u8, String> {
    let v = parse_u64(s)?;
    u8::try_from(v).map_err(|_| format!("Value '{}' does not fit in 8 bits", s))
}

/// `ADDR=VALUE`, both decimal or 0x-prefixed hex.
fn parse_write(s: &str) -> Result<(u64, u32), String> {
    let (addr, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Expected ADDR=VALUE, got '{}'", s))?;
    Ok((parse_u64(addr)?, parse_u32(value)?))
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Shared-memory sensor bench", long_about = None)]
struct Cli {
    /// Enable register-level tracing
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the system from a manifest and advance it for a number of ticks.
    Run(RunArgs),
    /// Write a value into a shared memory segment, acting as the external producer.
    Poke(PokeArgs),
    /// Print the value currently held by a shared memory segment.
    Peek(SegmentArgs),
    /// Read registers of an I2C sensor through the bus.
    I2cRead(I2cReadArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the system manifest (YAML)
    #[arg(short, long)]
    system: PathBuf,

    /// Number of ticks to run
    #[arg(long, default_value = "1000000")]
    cycles: u64,

    /// MMIO write applied before running, as ADDR=VALUE (repeatable)
    #[arg(long, value_parser = parse_write)]
    write: Vec<(u64, u32)>,

    /// Restore device state from a snapshot before running
    #[arg(long)]
    restore: Option<PathBuf>,

    /// Write a snapshot (JSON) after running
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Print a JSON report on stdout
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct SegmentArgs {
    /// Segment name (resolved under --dir) or path
    #[arg(long)]
    segment: String,

    /// Directory holding named segments
    #[arg(long)]
    dir: Option<String>,
}

#[derive(Parser, Debug)]
struct PokeArgs {
    #[command(flatten)]
    segment: SegmentArgs,

    /// Value to store
    #[arg(long, value_parser = parse_u32)]
    value: u32,
}

#[derive(Parser, Debug)]
struct I2cReadArgs {
    /// Path to the system manifest (YAML)
    #[arg(short, long)]
    system: PathBuf,

    /// 7-bit device address
    #[arg(long, value_parser = parse_u8)]
    address: u8,

    /// Register index to start reading from
    #[arg(long, value_parser = parse_u8)]
    register: u8,

    /// Number of bytes to read
    #[arg(long, default_value = "1")]
    len: usize,

    /// Set the enable bit before reading
    #[arg(long)]
    enable: bool,
}

#[derive(Debug, Serialize)]
struct RunReport {
    status: &'static str,
    cycles: u64,
    irq_raises: BTreeMap<String, u64>,
    irq_levels: BTreeMap<String, bool>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Poke(args) => poke(args),
        Commands::Peek(args) => peek(args),
        Commands::I2cRead(args) => i2c_read(args),
    }
}

fn build_bus(path: &Path) -> Result<SystemBus, ExitCode> {
    let manifest = SystemManifest::from_file(path).map_err(|e| {
        error!("{:#}", e);
        ExitCode::from(EXIT_CONFIG_ERROR)
    })?;
    info!("Loaded system '{}' ({} devices)", manifest.name, manifest.devices.len());
    SystemBus::from_config(&manifest).map_err(|e| {
        error!("{:#}", e);
        ExitCode::from(EXIT_CONFIG_ERROR)
    })
}

fn run(args: RunArgs) -> ExitCode {
    let mut bus = match build_bus(&args.system) {
        Ok(bus) => bus,
        Err(code) => return code,
    };

    if let Some(path) = &args.restore {
        let restored = MachineSnapshot::from_file(path)
            .and_then(|snap| bus.apply_snapshot(&snap).map_err(anyhow::Error::from));
        if let Err(e) = restored {
            error!("Failed to restore {:?}: {:#}", path, e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
        info!("Restored state from {:?} at cycle {}", path, bus.cycles);
    }

    for (addr, value) in &args.write {
        if let Err(e) = bus.write_u32(*addr, *value) {
            error!("MMIO write {:#x} <- {:#x} failed: {}", addr, value, e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    }

    let mut raises: BTreeMap<String, u64> = BTreeMap::new();
    let mut levels: Vec<bool> = bus.peripherals.iter().map(|p| p.dev.irq_level()).collect();
    for _ in 0..args.cycles {
        bus.tick_peripherals();
        for (p, last) in bus.peripherals.iter().zip(levels.iter_mut()) {
            let level = p.dev.irq_level();
            if level != *last {
                info!(
                    "{}: IRQ {} {} at cycle {}",
                    p.name,
                    p.irq.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string()),
                    if level { "raised" } else { "lowered" },
                    bus.cycles
                );
                if level {
                    *raises.entry(p.name.clone()).or_default() += 1;
                }
                *last = level;
            }
        }
    }
    info!("Finished after {} cycles", bus.cycles);

    if let Some(path) = &args.snapshot {
        if let Err(e) = bus.snapshot().to_file(path) {
            error!("{:#}", e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
        info!("Snapshot written to {:?}", path);
    }

    if args.json {
        let report = RunReport {
            status: "finished",
            cycles: bus.cycles,
            irq_raises: raises,
            irq_levels: bus
                .peripherals
                .iter()
                .map(|p| (p.name.clone(), p.dev.irq_level()))
                .collect(),
        };
        match serde_json::to_string(&report) {
            Ok(line) => println!("{}", line),
            Err(e) => {
                error!("Failed to encode report: {}", e);
                return ExitCode::from(EXIT_RUNTIME_ERROR);
            }
        }
    }

    ExitCode::from(EXIT_PASS)
}

fn poke(args: PokeArgs) -> ExitCode {
    let value = args.value;
    let path = ShmSource::resolve(&args.segment.segment, args.segment.dir.as_deref());
    let mut segment = match ShmSource::open(&path) {
        Ok(s) => s,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    };
    segment.store(value);
    info!("{:?} <- {:#x}", segment.path(), value);
    ExitCode::from(EXIT_PASS)
}

fn peek(args: SegmentArgs) -> ExitCode {
    let path = ShmSource::resolve(&args.segment, args.dir.as_deref());
    match ShmSource::open(&path) {
        Ok(segment) => {
            println!("{:#010x}", segment.load().unwrap_or_default());
            ExitCode::from(EXIT_PASS)
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_RUNTIME_ERROR)
        }
    }
}

fn i2c_read(args: I2cReadArgs) -> ExitCode {
    let mut bus = match build_bus(&args.system) {
        Ok(bus) => bus,
        Err(code) => return code,
    };

    let result = (|| -> anyhow::Result<Vec<u8>> {
        if args.enable {
            bus.i2c
                .write_register(args.address, REG_CTRL, &[I2cCtrl::EN.bits()])
                .context("Failed to enable sensor")?;
        }
        Ok(bus.i2c.read_register(args.address, args.register, args.len)?)
    })();

    match result {
        Ok(bytes) => {
            let hex: Vec<String> = bytes.iter().map(|b| format!("{:#04x}", b)).collect();
            println!("{}", hex.join(" "));
            ExitCode::from(EXIT_PASS)
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_RUNTIME_ERROR)
        }
    }
}

// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod bus;
pub mod i2c;
pub mod peripherals;
pub mod registry;
pub mod signals;
pub mod snapshot;
pub mod source;
pub mod timer;

use std::any::Any;


#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("Memory access violation at {0:#x}")]
    MemoryViolation(u64),
    #[error("Misaligned {width}-byte access at {addr:#x}")]
    MisalignedAccess { addr: u64, width: u8 },
    #[error("Unsupported {width}-byte access at {addr:#x}")]
    InvalidAccessWidth { addr: u64, width: u8 },
    #[error("No I2C device acknowledged address {0:#04x}")]
    I2cNack(u8),
    #[error("No I2C transfer in progress")]
    I2cIdle,
    #[error("Malformed device snapshot: {0}")]
    InvalidSnapshot(#[from] serde_json::Error),
}

pub type SimResult<T> = Result<T, SimulationError>;

#[derive(Debug, Clone, Default)]
pub struct PeripheralTickResult {
    /// Level of the device interrupt output after this tick.
    pub irq: bool,
    pub cycles: u32,
}

/// Trait representing a memory-mapped peripheral.
///
/// Accesses arrive already decoded to a device-relative offset. The system bus
/// only forwards aligned 32-bit accesses, so registers are exchanged as whole words.
pub trait Peripheral: std::fmt::Debug + Send {
    fn read(&self, offset: u64) -> SimResult<u32>;
    fn write(&mut self, offset: u64, value: u32) -> SimResult<()>;
    fn reset(&mut self);
    fn tick(&mut self) -> PeripheralTickResult {
        PeripheralTickResult::default()
    }
    /// Current level of the interrupt output, if the device has one.
    fn irq_level(&self) -> bool {
        false
    }
    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        None
    }
    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
    /// Raw state restore. Must not run register write side effects.
    fn restore(&mut self, _state: serde_json::Value) -> SimResult<()> {
        Ok(())
    }
}

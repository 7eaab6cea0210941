// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{SimResult, SimulationError};
use std::any::Any;

/// Bus conditions delivered to a slave, already demultiplexed by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum I2cEvent {
    /// Master addressed the slave for reading.
    StartRecv,
    /// Master addressed the slave for writing.
    StartSend,
    /// Stop condition.
    Finish,
    /// Master did not acknowledge the last byte it read.
    Nack,
}

/// Trait representing a device on a two-wire addressed bus.
///
/// Naming follows the master's point of view: `send` delivers a byte written by
/// the master, `recv` produces a byte the master reads.
pub trait I2cSlave: std::fmt::Debug + Send {
    fn event(&mut self, event: I2cEvent) -> SimResult<()>;
    fn recv(&mut self) -> u8;
    fn send(&mut self, data: u8) -> SimResult<()>;
    fn reset(&mut self);
    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        None
    }
    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
    fn restore(&mut self, _state: serde_json::Value) -> SimResult<()> {
        Ok(())
    }
}

pub struct I2cDeviceEntry {
    pub name: String,
    pub address: u8,
    pub dev: Box<dyn I2cSlave>,
}

/// Routes master transfers to the slave at the addressed 7-bit address.
///
/// Single master, no arbitration: a new start while a transfer is open is a
/// repeated start and simply retargets the transfer.
#[derive(Default)]
pub struct I2cBus {
    pub devices: Vec<I2cDeviceEntry>,
    current: Option<usize>,
}

impl I2cBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, name: impl Into<String>, address: u8, dev: Box<dyn I2cSlave>) {
        self.devices.push(I2cDeviceEntry {
            name: name.into(),
            address,
            dev,
        });
    }

    pub fn start_transfer(&mut self, address: u8, is_recv: bool) -> SimResult<()> {
        let Some(index) = self.devices.iter().position(|d| d.address == address) else {
            tracing::debug!("I2C: no device at {:#04x}", address);
            if let Some(prev) = self.current.take() {
                self.devices[prev].dev.event(I2cEvent::Finish)?;
            }
            return Err(SimulationError::I2cNack(address));
        };

        let event = if is_recv {
            I2cEvent::StartRecv
        } else {
            I2cEvent::StartSend
        };
        tracing::debug!("I2C: {:?} -> {:#04x}", event, address);
        self.devices[index].dev.event(event)?;
        self.current = Some(index);
        Ok(())
    }

    pub fn send(&mut self, data: u8) -> SimResult<()> {
        let index = self.current.ok_or(SimulationError::I2cIdle)?;
        self.devices[index].dev.send(data)
    }

    pub fn recv(&mut self) -> SimResult<u8> {
        let index = self.current.ok_or(SimulationError::I2cIdle)?;
        Ok(self.devices[index].dev.recv())
    }

    pub fn nack(&mut self) -> SimResult<()> {
        let index = self.current.ok_or(SimulationError::I2cIdle)?;
        self.devices[index].dev.event(I2cEvent::Nack)
    }

    pub fn end_transfer(&mut self) -> SimResult<()> {
        if let Some(index) = self.current.take() {
            self.devices[index].dev.event(I2cEvent::Finish)?;
        }
        Ok(())
    }

    pub fn is_busy(&self) -> bool {
        self.current.is_some()
    }

    /// Register-pointer write: address byte followed by `data`.
    pub fn write_register(&mut self, address: u8, register: u8, data: &[u8]) -> SimResult<()> {
        self.start_transfer(address, false)?;
        self.send(register)?;
        for byte in data {
            self.send(*byte)?;
        }
        self.end_transfer()
    }

    /// Register-pointer read: write the register index, repeated start, read `len` bytes.
    pub fn read_register(&mut self, address: u8, register: u8, len: usize) -> SimResult<Vec<u8>> {
        self.start_transfer(address, false)?;
        self.send(register)?;
        self.start_transfer(address, true)?;
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(self.recv()?);
        }
        self.nack()?;
        self.end_transfer()?;
        Ok(out)
    }

    pub fn reset(&mut self) {
        self.current = None;
        for d in &mut self.devices {
            d.dev.reset();
        }
    }

    pub fn device_mut<T: 'static>(&mut self, name: &str) -> Option<&mut T> {
        self.devices
            .iter_mut()
            .find(|d| d.name == name)
            .and_then(|d| d.dev.as_any_mut())
            .and_then(|any| any.downcast_mut::<T>())
    }
}

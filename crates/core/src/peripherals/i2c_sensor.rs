// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::i2c::{I2cEvent, I2cSlave};
use crate::source::{SourceHandle, SourceReader};
use crate::SimResult;
use serde::{Deserialize, Serialize};
use std::any::Any;

pub const REG_CTRL: u8 = 0x00;
pub const REG_DATA: u8 = 0x01;
pub const NUM_REGS: usize = 2;

/// Value returned for reads past the end of the register file.
pub const INVALID_READ: u8 = 0xFF;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct I2cCtrl: u8 {
        const EN = 0x01;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct I2cSensorState {
    regs: [u8; NUM_REGS],
    count: u8,
    ptr: u8,
}

/// I2C slave sensor reporting the low byte of an external value.
///
/// Register map:
/// - 0x00 CTRL, bit 0 enables the sensor
/// - 0x01 DATA, read-only, latched from the source when a read transfer starts
///
/// The first byte of a write transfer selects the register. Further bytes are
/// only stored while CTRL is selected. Reads auto-increment the pointer.
#[derive(Debug)]
pub struct I2cSensor {
    regs: [u8; NUM_REGS],
    count: u8,
    ptr: u8,
    source: SourceReader,
}

impl I2cSensor {
    pub fn new(source: SourceHandle) -> Self {
        Self {
            regs: [0; NUM_REGS],
            count: 0,
            ptr: 0,
            source: SourceReader::new(source),
        }
    }

    pub fn ctrl(&self) -> I2cCtrl {
        I2cCtrl::from_bits_retain(self.regs[REG_CTRL as usize])
    }

    pub fn data(&self) -> u8 {
        self.regs[REG_DATA as usize]
    }

    pub fn pointer(&self) -> u8 {
        self.ptr
    }

    /// True until the register-select byte of the current transfer has arrived.
    pub fn expects_address(&self) -> bool {
        self.count == 0
    }

    fn state(&self) -> I2cSensorState {
        I2cSensorState {
            regs: self.regs,
            count: self.count,
            ptr: self.ptr,
        }
    }
}

impl I2cSlave for I2cSensor {
    fn event(&mut self, event: I2cEvent) -> SimResult<()> {
        if event == I2cEvent::StartRecv && self.ptr == REG_DATA {
            self.regs[REG_DATA as usize] = if self.ctrl().contains(I2cCtrl::EN) {
                self.source.sample_byte()
            } else {
                0x00
            };
            tracing::debug!("I2CSENS: latched DATA={:#04x}", self.data());
        }

        self.count = 0;
        Ok(())
    }

    fn recv(&mut self) -> u8 {
        let Some(value) = self.regs.get(self.ptr as usize).copied() else {
            return INVALID_READ;
        };
        self.ptr += 1;
        value
    }

    fn send(&mut self, data: u8) -> SimResult<()> {
        if self.count == 0 {
            self.ptr = data;
            self.count = 1;
        } else if self.ptr == REG_CTRL {
            self.regs[self.ptr as usize] = data;
            self.ptr += 1;
        } else {
            tracing::debug!(
                "I2CSENS: dropped write {:#04x} to register {:#04x}",
                data,
                self.ptr
            );
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.regs = [0; NUM_REGS];
        self.count = 0;
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self.state()).unwrap_or(serde_json::Value::Null)
    }

    fn restore(&mut self, state: serde_json::Value) -> SimResult<()> {
        let state: I2cSensorState = serde_json::from_value(state)?;
        self.regs = state.regs;
        self.count = state.count;
        self.ptr = state.ptr;
        Ok(())
    }
}

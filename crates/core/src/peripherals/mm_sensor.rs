// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::signals::InterruptLine;
use crate::source::{SourceHandle, SourceReader};
use crate::timer::PeriodicTimer;
use crate::{Peripheral, PeripheralTickResult, SimResult, SimulationError};
use serde::{Deserialize, Serialize};
use std::any::Any;

pub const A_CTRL: u64 = 0x00;
pub const A_STATUS: u64 = 0x04;
pub const A_DATA: u64 = 0x08;

pub const R_CTRL: usize = 0;
pub const R_STATUS: usize = 1;
pub const R_DATA: usize = 2;
pub const R_MAX: usize = R_DATA + 1;

/// Size of the register window in bytes.
pub const MMIO_SIZE: u64 = (R_MAX * 4) as u64;

pub const DATA_SAMPLE_MASK: u32 = 0xFF;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Ctrl: u32 {
        /// Component enable, runs the sampling timer.
        const EN = 1 << 0;
        /// Interrupt enable.
        const IEN = 1 << 1;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u32 {
        /// Set by every sample.
        const IFG = 1 << 1;
    }
}

type PostWrite = fn(&mut MmSensor, u32);

struct RegisterAccessInfo {
    name: &'static str,
    addr: u64,
    reset: u32,
    /// Bits that read as zero and ignore writes.
    rsvd: u32,
    /// Bits that keep their value on writes.
    ro: u32,
    post_write: Option<PostWrite>,
}

impl RegisterAccessInfo {
    fn writable(&self) -> u32 {
        !(self.rsvd | self.ro)
    }
}

static REGS_INFO: [RegisterAccessInfo; R_MAX] = [
    RegisterAccessInfo {
        name: "CTRL",
        addr: A_CTRL,
        reset: 0,
        rsvd: !(Ctrl::EN.bits() | Ctrl::IEN.bits()),
        ro: 0,
        post_write: Some(MmSensor::on_ctrl_write as PostWrite),
    },
    RegisterAccessInfo {
        name: "STATUS",
        addr: A_STATUS,
        reset: 0,
        rsvd: !Status::IFG.bits(),
        ro: Status::IFG.bits(),
        post_write: Some(MmSensor::on_status_write as PostWrite),
    },
    RegisterAccessInfo {
        name: "DATA",
        addr: A_DATA,
        reset: 0,
        rsvd: !DATA_SAMPLE_MASK,
        ro: DATA_SAMPLE_MASK,
        post_write: None,
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct MmSensorState {
    regs: [u32; R_MAX],
    timer: PeriodicTimer,
    irq: bool,
}

/// Memory-mapped sensor sampling an external value on a periodic timer.
///
/// Register map (32-bit, 4-byte stride):
/// - 0x00 CTRL: bit 0 EN, bit 1 IEN
/// - 0x04 STATUS: bit 1 IFG, read-only
/// - 0x08 DATA: bits 7:0 last sample, read-only
///
/// While EN is set the timer runs; every expiry copies the low byte of the
/// source into DATA and sets IFG. The interrupt output is held high while
/// EN, IEN and IFG are all set. Writing STATUS does not clear IFG.
#[derive(Debug)]
pub struct MmSensor {
    regs: [u32; R_MAX],
    timer: PeriodicTimer,
    irq: InterruptLine,
    source: SourceReader,
}

impl MmSensor {
    /// `period` is the number of ticks between samples.
    pub fn new(source: SourceHandle, period: u64) -> Self {
        let mut s = Self {
            regs: [0; R_MAX],
            timer: PeriodicTimer::new(period),
            irq: InterruptLine::new(),
            source: SourceReader::new(source),
        };
        s.reset_registers();
        s
    }

    pub fn ctrl(&self) -> Ctrl {
        Ctrl::from_bits_retain(self.regs[R_CTRL])
    }

    pub fn status(&self) -> Status {
        Status::from_bits_retain(self.regs[R_STATUS])
    }

    pub fn data(&self) -> u32 {
        self.regs[R_DATA]
    }

    pub fn timer(&self) -> &PeriodicTimer {
        &self.timer
    }

    pub fn irq(&self) -> &InterruptLine {
        &self.irq
    }

    fn reg_index(offset: u64) -> Option<usize> {
        REGS_INFO.iter().position(|info| info.addr == offset)
    }

    fn reset_registers(&mut self) {
        for (reg, info) in self.regs.iter_mut().zip(REGS_INFO.iter()) {
            *reg = info.reset;
        }
    }

    fn register_write(&mut self, index: usize, value: u32) {
        let info = &REGS_INFO[index];
        let writable = info.writable();
        let old = self.regs[index];
        self.regs[index] = (old & !writable) | (value & writable);
        tracing::debug!(
            "MMSENS: {} <- {:#x} (now {:#x})",
            info.name,
            value,
            self.regs[index]
        );
        if let Some(post_write) = info.post_write {
            post_write(self, value);
        }
    }

    fn on_ctrl_write(&mut self, _value: u32) {
        if self.ctrl().contains(Ctrl::EN) {
            self.timer.run();
        } else {
            self.timer.stop();
        }
        self.update_irq();
    }

    fn on_status_write(&mut self, _value: u32) {
        self.update_irq();
    }

    /// Timer expiry: latch a new sample and flag it.
    fn update_data(&mut self) {
        self.regs[R_DATA] = u32::from(self.source.sample_byte()) & DATA_SAMPLE_MASK;
        self.regs[R_STATUS] |= Status::IFG.bits();
        tracing::debug!("MMSENS: sampled {:#04x}", self.regs[R_DATA]);
        self.update_irq();
    }

    fn update_irq(&mut self) {
        let pending = self.ctrl().contains(Ctrl::EN | Ctrl::IEN)
            && self.status().contains(Status::IFG);
        if self.irq.set_level(pending) {
            tracing::debug!(
                "MMSENS: interrupt {}",
                if pending { "raised" } else { "lowered" }
            );
        }
    }

    fn state(&self) -> MmSensorState {
        MmSensorState {
            regs: self.regs,
            timer: self.timer.clone(),
            irq: self.irq.is_pending(),
        }
    }
}

impl Peripheral for MmSensor {
    fn read(&self, offset: u64) -> SimResult<u32> {
        if offset % 4 != 0 {
            return Err(SimulationError::MisalignedAccess {
                addr: offset,
                width: 4,
            });
        }
        Ok(Self::reg_index(offset)
            .map(|index| self.regs[index])
            .unwrap_or(0))
    }

    fn write(&mut self, offset: u64, value: u32) -> SimResult<()> {
        if offset % 4 != 0 {
            return Err(SimulationError::MisalignedAccess {
                addr: offset,
                width: 4,
            });
        }
        match Self::reg_index(offset) {
            Some(index) => self.register_write(index, value),
            None => tracing::debug!(
                "MMSENS: write {:#x} to unmapped offset {:#x} ignored",
                value,
                offset
            ),
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.reset_registers();
        self.timer.reset();
        self.update_irq();
    }

    fn tick(&mut self) -> PeripheralTickResult {
        let running = self.timer.is_running();
        if self.timer.advance() {
            self.update_data();
        }
        PeripheralTickResult {
            irq: self.irq.is_pending(),
            cycles: u32::from(running),
        }
    }

    fn irq_level(&self) -> bool {
        self.irq.is_pending()
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
        let state: MmSensorState = serde_json::from_value(state)?;
        self.regs = state.regs;
        self.timer = state.timer;
        self.irq.set_level(state.irq);
        Ok(())
    }
}

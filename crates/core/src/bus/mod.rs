// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::i2c::I2cBus;
use crate::registry::{self, DeviceContext, DeviceFactory};
use crate::snapshot::MachineSnapshot;
use crate::source::{self, SourceHandle, Unavailable};
use crate::timer::PeriodicTimer;
use crate::{Peripheral, SimResult, SimulationError};
use anyhow::Context;
use shmsens_config::{parse_size, SystemManifest};
use std::sync::Arc;

pub struct PeripheralEntry {
    pub name: String,
    pub base: u64,
    pub size: u64,
    pub irq: Option<u32>,
    pub dev: Box<dyn Peripheral>,
}

/// Memory-mapped devices plus the I2C segment, driven by one tick counter.
#[derive(Default)]
pub struct SystemBus {
    pub peripherals: Vec<PeripheralEntry>,
    pub i2c: I2cBus,
    pub cycles: u64,
}

impl SystemBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(manifest: &SystemManifest) -> anyhow::Result<Self> {
        let mut bus = Self::new();

        for dev_cfg in &manifest.devices {
            let Some(dev_type) = registry::lookup(&dev_cfg.r#type) else {
                tracing::warn!(
                    "Unsupported device type '{}' for id '{}'; skipping",
                    dev_cfg.r#type,
                    dev_cfg.id
                );
                continue;
            };

            let source = acquire_source(&dev_cfg.id, dev_cfg.source.as_ref(), dev_type.default_segment);
            let ctx = DeviceContext {
                source,
                sample_period: PeriodicTimer::from_frequency(manifest.clock_hz, dev_cfg.sample_hz)
                    .period(),
            };

            match dev_type.factory {
                DeviceFactory::Mmio { create, window } => {
                    let base = dev_cfg.base_address.ok_or_else(|| {
                        anyhow::anyhow!(
                            "Device '{}' of type '{}' needs a 'base_address'",
                            dev_cfg.id,
                            dev_cfg.r#type
                        )
                    })?;
                    let size = match &dev_cfg.size {
                        Some(size) => parse_size(size)
                            .with_context(|| format!("Invalid size for '{}'", dev_cfg.id))?,
                        None => window,
                    };
                    tracing::info!(
                        "Mapping {} ({}) at {:#x}, {:#x} bytes",
                        dev_cfg.id,
                        dev_type.name,
                        base,
                        size
                    );
                    bus.add_peripheral(&dev_cfg.id, base, size, dev_cfg.irq, create(&ctx))?;
                }
                DeviceFactory::I2c { create } => {
                    let address = dev_cfg.i2c_address.ok_or_else(|| {
                        anyhow::anyhow!(
                            "Device '{}' of type '{}' needs an 'i2c_address'",
                            dev_cfg.id,
                            dev_cfg.r#type
                        )
                    })?;
                    tracing::info!(
                        "Attaching {} ({}) at I2C address {:#04x}",
                        dev_cfg.id,
                        dev_type.name,
                        address
                    );
                    bus.i2c.attach(&dev_cfg.id, address, create(&ctx));
                }
            }
        }

        Ok(bus)
    }

    pub fn add_peripheral(
        &mut self,
        name: &str,
        base: u64,
        size: u64,
        irq: Option<u32>,
        dev: Box<dyn Peripheral>,
    ) -> anyhow::Result<()> {
        if size == 0 {
            anyhow::bail!("Peripheral '{}' has an empty register window", name);
        }
        let Some(end) = base.checked_add(size) else {
            anyhow::bail!(
                "Peripheral '{}' window {:#x} + {:#x} wraps the address space",
                name,
                base,
                size
            );
        };
        // Entries already on the bus never wrap.
        if let Some(other) = self
            .peripherals
            .iter()
            .find(|p| base < p.base + p.size && p.base < end)
        {
            anyhow::bail!(
                "Peripheral '{}' at {:#x} overlaps '{}' at {:#x}",
                name,
                base,
                other.name,
                other.base
            );
        }
        self.peripherals.push(PeripheralEntry {
            name: name.to_string(),
            base,
            size,
            irq,
            dev,
        });
        Ok(())
    }

    fn decode(&self, addr: u64, width: u8) -> SimResult<usize> {
        if width != 4 {
            return Err(SimulationError::InvalidAccessWidth { addr, width });
        }
        if addr % 4 != 0 {
            return Err(SimulationError::MisalignedAccess { addr, width });
        }
        self.peripherals
            .iter()
            .position(|p| addr >= p.base && addr - p.base < p.size)
            .ok_or(SimulationError::MemoryViolation(addr))
    }

    /// Sized read. Only aligned 32-bit accesses reach the devices.
    pub fn read(&self, addr: u64, width: u8) -> SimResult<u32> {
        let index = self.decode(addr, width)?;
        let p = &self.peripherals[index];
        p.dev.read(addr - p.base)
    }

    pub fn write(&mut self, addr: u64, width: u8, value: u32) -> SimResult<()> {
        let index = self.decode(addr, width)?;
        let p = &mut self.peripherals[index];
        p.dev.write(addr - p.base, value)
    }

    pub fn read_u32(&self, addr: u64) -> SimResult<u32> {
        self.read(addr, 4)
    }

    pub fn write_u32(&mut self, addr: u64, value: u32) -> SimResult<()> {
        self.write(addr, 4, value)
    }

    /// Advance every device by one tick. Returns the IRQ numbers whose lines are high.
    pub fn tick_peripherals(&mut self) -> Vec<u32> {
        self.cycles += 1;
        let mut interrupts = Vec::new();
        for p in &mut self.peripherals {
            let res = p.dev.tick();
            if res.irq {
                if let Some(irq) = p.irq {
                    interrupts.push(irq);
                }
            }
        }
        interrupts
    }

    pub fn irq_level(&self, name: &str) -> Option<bool> {
        self.peripherals
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.dev.irq_level())
    }

    pub fn reset(&mut self) {
        for p in &mut self.peripherals {
            p.dev.reset();
        }
        self.i2c.reset();
    }

    pub fn snapshot(&self) -> MachineSnapshot {
        MachineSnapshot {
            cycles: self.cycles,
            peripherals: self
                .peripherals
                .iter()
                .map(|p| (p.name.clone(), p.dev.snapshot()))
                .collect(),
            i2c_devices: self
                .i2c
                .devices
                .iter()
                .map(|d| (d.name.clone(), d.dev.snapshot()))
                .collect(),
        }
    }

    pub fn apply_snapshot(&mut self, snapshot: &MachineSnapshot) -> SimResult<()> {
        self.cycles = snapshot.cycles;
        for p in &mut self.peripherals {
            if let Some(state) = snapshot.peripherals.get(&p.name) {
                p.dev.restore(state.clone())?;
            } else {
                tracing::warn!("Snapshot has no state for '{}'", p.name);
            }
        }
        for d in &mut self.i2c.devices {
            if let Some(state) = snapshot.i2c_devices.get(&d.name) {
                d.dev.restore(state.clone())?;
            } else {
                tracing::warn!("Snapshot has no state for '{}'", d.name);
            }
        }
        Ok(())
    }

    pub fn peripheral_mut<T: 'static>(&mut self, name: &str) -> Option<&mut T> {
        self.peripherals
            .iter_mut()
            .find(|p| p.name == name)
            .and_then(|p| p.dev.as_any_mut())
            .and_then(|any| any.downcast_mut::<T>())
    }
}

/// Failing to acquire a segment does not stop the system from coming up: the
/// device reads 0 and the failure is logged.
fn acquire_source(
    id: &str,
    config: Option<&shmsens_config::SourceConfig>,
    default_segment: &str,
) -> SourceHandle {
    match source::from_config(config, default_segment) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!("{}: external value unavailable: {:#}", id, e);
            Arc::new(Unavailable)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peripherals::mm_sensor::{MmSensor, A_CTRL, A_DATA};
    use crate::source::SharedValue;

    fn bus_with_sensor(value: &SharedValue) -> SystemBus {
        let mut bus = SystemBus::new();
        bus.add_peripheral(
            "mmsens0",
            0x4000_0000,
            0xC,
            Some(5),
            Box::new(MmSensor::new(value.handle(), 2)),
        )
        .unwrap();
        bus
    }

    #[test]
    fn test_word_access_reaches_device() {
        let value = SharedValue::new(0x66);
        let mut bus = bus_with_sensor(&value);
        bus.write_u32(0x4000_0000 + A_CTRL, 0x3).unwrap();
        assert!(bus.tick_peripherals().is_empty());
        assert_eq!(bus.tick_peripherals(), vec![5]);
        assert_eq!(bus.read_u32(0x4000_0000 + A_DATA).unwrap(), 0x66);
        assert_eq!(bus.irq_level("mmsens0"), Some(true));
        assert_eq!(bus.cycles, 2);
    }

    #[test]
    fn test_boundary_rejects_bad_accesses() {
        let value = SharedValue::new(0);
        let mut bus = bus_with_sensor(&value);
        assert!(matches!(
            bus.read(0x4000_0000, 1),
            Err(SimulationError::InvalidAccessWidth { width: 1, .. })
        ));
        assert!(matches!(
            bus.write(0x4000_0002, 4, 0),
            Err(SimulationError::MisalignedAccess { .. })
        ));
        assert!(matches!(
            bus.read_u32(0x4000_000C),
            Err(SimulationError::MemoryViolation(0x4000_000C))
        ));
    }

    #[test]
    fn test_overlapping_windows_rejected() {
        let value = SharedValue::new(0);
        let mut bus = bus_with_sensor(&value);
        let err = bus
            .add_peripheral(
                "other",
                0x4000_0008,
                0x10,
                None,
                Box::new(MmSensor::new(value.handle(), 1)),
            )
            .unwrap_err();
        assert!(err.to_string().contains("overlaps"));
    }

    #[test]
    fn test_window_wrapping_address_space_rejected() {
        let value = SharedValue::new(0);
        let mut bus = SystemBus::new();
        let err = bus
            .add_peripheral(
                "high",
                0xFFFF_FFFF_FFFF_FFF8,
                0xC,
                None,
                Box::new(MmSensor::new(value.handle(), 1)),
            )
            .unwrap_err();
        assert!(err.to_string().contains("wraps"));
        assert!(bus.peripherals.is_empty());

        // A window near the top of the address space decodes normally.
        bus.add_peripheral(
            "top",
            0xFFFF_FFFF_FFFF_FFE0,
            0x10,
            None,
            Box::new(MmSensor::new(value.handle(), 1)),
        )
        .unwrap();
        assert_eq!(bus.read_u32(0xFFFF_FFFF_FFFF_FFE8).unwrap(), 0);
        assert!(matches!(
            bus.read_u32(0xFFFF_FFFF_FFFF_FFF8),
            Err(SimulationError::MemoryViolation(_))
        ));
    }

    #[test]
    fn test_reset_reaches_all_devices() {
        let value = SharedValue::new(0x12);
        let mut bus = bus_with_sensor(&value);
        bus.write_u32(0x4000_0000, 0x3).unwrap();
        bus.tick_peripherals();
        bus.tick_peripherals();
        bus.reset();
        assert_eq!(bus.read_u32(0x4000_0000).unwrap(), 0);
        assert_eq!(bus.irq_level("mmsens0"), Some(false));
        let dev = bus.peripheral_mut::<MmSensor>("mmsens0").unwrap();
        assert!(!dev.timer().is_running());
    }
}

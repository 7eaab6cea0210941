// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Device types known to the system builder, keyed by the `type` string of a
//! device entry in the system manifest.

use crate::i2c::I2cSlave;
use crate::peripherals::{i2c_sensor::I2cSensor, mm_sensor};
use crate::source::SourceHandle;
use crate::Peripheral;

/// What a constructor gets from the manifest.
#[derive(Debug, Clone)]
pub struct DeviceContext {
    pub source: SourceHandle,
    /// Ticks between periodic samples, for devices that have a timer.
    pub sample_period: u64,
}

#[derive(Clone, Copy)]
pub enum DeviceFactory {
    Mmio {
        create: fn(&DeviceContext) -> Box<dyn Peripheral>,
        /// Register window used when the manifest gives no size.
        window: u64,
    },
    I2c {
        create: fn(&DeviceContext) -> Box<dyn I2cSlave>,
    },
}

pub struct DeviceType {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    /// Shared memory segment the device reads when the manifest names none.
    pub default_segment: &'static str,
    pub factory: DeviceFactory,
}

impl DeviceType {
    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.aliases.contains(&name)
    }

    pub fn is_i2c(&self) -> bool {
        matches!(self.factory, DeviceFactory::I2c { .. })
    }
}

fn create_mm_sensor(ctx: &DeviceContext) -> Box<dyn Peripheral> {
    Box::new(mm_sensor::MmSensor::new(ctx.source.clone(), ctx.sample_period))
}

fn create_i2c_sensor(ctx: &DeviceContext) -> Box<dyn I2cSlave> {
    Box::new(I2cSensor::new(ctx.source.clone()))
}

static DEVICE_TYPES: &[DeviceType] = &[
    DeviceType {
        name: "mmsens",
        aliases: &["custom.mmsens"],
        default_segment: "mmsens",
        factory: DeviceFactory::Mmio {
            create: create_mm_sensor,
            window: mm_sensor::MMIO_SIZE,
        },
    },
    DeviceType {
        name: "i2csens",
        aliases: &["custom.i2csens"],
        default_segment: "i2c",
        factory: DeviceFactory::I2c {
            create: create_i2c_sensor,
        },
    },
];

pub fn lookup(name: &str) -> Option<&'static DeviceType> {
    DEVICE_TYPES.iter().find(|t| t.matches(name))
}

pub fn device_types() -> &'static [DeviceType] {
    DEVICE_TYPES
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SharedValue;

    #[test]
    fn test_lookup_by_name_and_alias() {
        let mm = lookup("mmsens").unwrap();
        assert!(!mm.is_i2c());
        assert_eq!(mm.default_segment, "mmsens");
        assert!(std::ptr::eq(mm, lookup("custom.mmsens").unwrap()));

        let i2c = lookup("custom.i2csens").unwrap();
        assert!(i2c.is_i2c());
        assert_eq!(i2c.default_segment, "i2c");

        assert!(lookup("uart").is_none());
        assert_eq!(device_types().len(), 2);
    }

    #[test]
    fn test_factories_build_devices() {
        let value = SharedValue::new(0x5);
        let ctx = DeviceContext {
            source: value.handle(),
            sample_period: 2,
        };
        match lookup("mmsens").unwrap().factory {
            DeviceFactory::Mmio { create, window } => {
                let mut dev = create(&ctx);
                assert_eq!(window, 12);
                dev.write(0, 1).unwrap();
                dev.tick();
                dev.tick();
                assert_eq!(dev.read(8).unwrap(), 0x5);
            }
            DeviceFactory::I2c { .. } => panic!("mmsens must be memory mapped"),
        }
        match lookup("i2csens").unwrap().factory {
            DeviceFactory::I2c { create } => {
                let mut dev = create(&ctx);
                assert_eq!(dev.recv(), 0);
            }
            DeviceFactory::Mmio { .. } => panic!("i2csens must be an I2C slave"),
        }
    }
}

// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    "1.0".to_string()
}

fn default_clock_hz() -> u64 {
    1_000_000
}

fn default_sample_hz() -> u64 {
    1
}

/// Where a sensor reads its external value from.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Word-sized shared memory segment. `name` is resolved under `dir`
    /// (default `/dev/shm`) unless it is already a path.
    Shm {
        name: String,
        #[serde(default)]
        dir: Option<String>,
    },
    /// Fixed value, mostly for benches without an external writer.
    Constant { value: u32 },
    /// No backing resource; the sensor reads 0.
    Unavailable,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DeviceConfig {
    pub id: String,
    pub r#type: String, // "mmsens", "i2csens"
    #[serde(default)]
    pub base_address: Option<u64>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub irq: Option<u32>,
    #[serde(default)]
    pub i2c_address: Option<u8>,
    #[serde(default)]
    pub source: Option<SourceConfig>,
    #[serde(default = "default_sample_hz")]
    pub sample_hz: u64,
}

impl DeviceConfig {
    pub fn is_i2c(&self) -> bool {
        self.i2c_address.is_some()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SystemManifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub name: String,
    /// Simulation ticks per second; sampling periods are derived from it.
    #[serde(default = "default_clock_hz")]
    pub clock_hz: u64,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

impl SystemManifest {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open system manifest at {:?}", path.as_ref()))?;
        let manifest: Self =
            serde_yaml::from_reader(f).context("Failed to parse System Manifest")?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let manifest: Self =
            serde_yaml::from_str(yaml).context("Failed to parse System Manifest")?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        if self.clock_hz == 0 {
            anyhow::bail!("'clock_hz' must be greater than zero");
        }

        let mut ids = HashSet::new();
        let mut i2c_addresses = HashSet::new();
        for dev in &self.devices {
            if dev.id.trim().is_empty() {
                anyhow::bail!("Device id cannot be empty");
            }
            if !ids.insert(dev.id.as_str()) {
                anyhow::bail!("Duplicate device id '{}'", dev.id);
            }

            match (dev.base_address, dev.i2c_address) {
                (Some(_), Some(_)) => anyhow::bail!(
                    "Device '{}' sets both 'base_address' and 'i2c_address'",
                    dev.id
                ),
                (None, None) => anyhow::bail!(
                    "Device '{}' needs either 'base_address' or 'i2c_address'",
                    dev.id
                ),
                (None, Some(addr)) => {
                    if addr >= 0x80 {
                        anyhow::bail!(
                            "Device '{}' has I2C address {:#x}; only 7-bit addresses are supported",
                            dev.id,
                            addr
                        );
                    }
                    if !i2c_addresses.insert(addr) {
                        anyhow::bail!("I2C address {:#x} is used more than once", addr);
                    }
                }
                (Some(_), None) => {}
            }

            if dev.sample_hz == 0 {
                anyhow::bail!("Device '{}': 'sample_hz' must be greater than zero", dev.id);
            }
            if dev.sample_hz > self.clock_hz {
                anyhow::bail!(
                    "Device '{}': 'sample_hz' ({}) exceeds 'clock_hz' ({})",
                    dev.id,
                    dev.sample_hz,
                    self.clock_hz
                );
            }

            if let Some(size) = &dev.size {
                let size = parse_size(size)
                    .with_context(|| format!("Device '{}' has an invalid 'size'", dev.id))?;
                if let Some(base) = dev.base_address {
                    if base.checked_add(size).is_none() {
                        anyhow::bail!(
                            "Device '{}': window {:#x} + {:#x} wraps the address space",
                            dev.id,
                            base,
                            size
                        );
                    }
                }
            }
        }

        Ok(())
    }

    pub fn device(&self, id: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.id == id)
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}

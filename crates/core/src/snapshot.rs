// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MachineSnapshot {
    /// Simulation ticks elapsed when the snapshot was taken.
    #[serde(default)]
    pub cycles: u64,
    pub peripherals: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub i2c_devices: HashMap<String, serde_json::Value>,
}

impl MachineSnapshot {
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        use anyhow::Context;
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open snapshot {:?}", path.as_ref()))?;
        serde_json::from_reader(std::io::BufReader::new(f)).context("Failed to parse snapshot")
    }

    pub fn to_file<P: AsRef<std::path::Path>>(&self, path: P) -> anyhow::Result<()> {
        use anyhow::Context;
        let f = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create snapshot {:?}", path.as_ref()))?;
        serde_json::to_writer_pretty(f, self).context("Failed to write snapshot")
    }
}

// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

/// Represents a digital signal level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigitalLevel {
    #[default]
    Low,
    High,
}

impl From<bool> for DigitalLevel {
    fn from(b: bool) -> Self {
        if b {
            DigitalLevel::High
        } else {
            DigitalLevel::Low
        }
    }
}

impl From<DigitalLevel> for bool {
    fn from(level: DigitalLevel) -> Self {
        match level {
            DigitalLevel::High => true,
            DigitalLevel::Low => false,
        }
    }
}

/// Level-triggered interrupt output of a device.
///
/// The line holds whatever level was last driven; `raises` counts low-to-high
/// transitions so hosts and tests can observe edges without polling every tick.
#[derive(Debug, Clone, Default)]
pub struct InterruptLine {
    level: DigitalLevel,
    raises: u64,
}

impl InterruptLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drive the line. Returns true when the level changed.
    pub fn set_level(&mut self, level: impl Into<DigitalLevel>) -> bool {
        let level = level.into();
        if level == self.level {
            return false;
        }
        if level == DigitalLevel::High {
            self.raises += 1;
        }
        self.level = level;
        true
    }

    pub fn is_pending(&self) -> bool {
        self.level.into()
    }

    pub fn raise_count(&self) -> u64 {
        self.raises
    }
}

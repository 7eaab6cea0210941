// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

/// Free-running periodic down-counter, advanced one simulation tick at a time.
///
/// Stopping keeps the remaining count, so a later `run` resumes the current
/// period instead of starting a new one. The whole state is plain data and is
/// carried verbatim through snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodicTimer {
    period: u64,
    remaining: u64,
    running: bool,
}

impl PeriodicTimer {
    pub fn new(period: u64) -> Self {
        Self {
            period: period.max(1),
            remaining: 0,
            running: false,
        }
    }

    /// Period in ticks for `freq_hz` expirations per second of a `clock_hz` clock.
    pub fn from_frequency(clock_hz: u64, freq_hz: u64) -> Self {
        Self::new(clock_hz / freq_hz.max(1))
    }

    /// Start counting. No-op while already running.
    pub fn run(&mut self) {
        if self.running {
            return;
        }
        if self.remaining == 0 {
            self.remaining = self.period;
        }
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Stop and drop the current phase.
    pub fn reset(&mut self) {
        self.running = false;
        self.remaining = 0;
    }

    /// Advance by one tick. Returns true when the period expired on this tick.
    pub fn advance(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.remaining = self.period.max(1);
            return true;
        }
        false
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn period(&self) -> u64 {
        self.period
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

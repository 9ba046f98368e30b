// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Runtime settings of an actor system.

use serde::{Deserialize, Serialize};

/// Channel sizes used by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Capacity of each actor's stop channel.
    pub stop_buffer: usize,
    /// Capacity of the system event channel.
    pub system_event_buffer: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stop_buffer: 100,
            system_event_buffer: 100,
        }
    }
}

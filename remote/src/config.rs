// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Network settings of the remote registry.

use serde::{Deserialize, Serialize};

use std::time::Duration;

/// Settings shared by published endpoints and remote handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Bound on dialing plus handshake.
    pub connect_timeout: Duration,
    /// Largest accepted frame, length prefix excluded.
    pub max_frame_size: usize,
    /// Whether `TCP_NODELAY` is set on every socket.
    pub nodelay: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            max_frame_size: 16 * 1024 * 1024,
            nodelay: true,
        }
    }
}

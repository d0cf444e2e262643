// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Out-of-process worker descriptors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last observed health of a worker service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerHealth {
    Healthy,
    Degraded,
    Unreachable,
}

/// A registered worker: a logical name bound to an HTTP base address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerDescriptor {
    pub name: String,
    pub address: String,
    pub last_health: WorkerHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
}

impl WorkerDescriptor {
    pub fn new(name: &str, address: &str) -> Self {
        Self {
            name: name.to_string(),
            address: address.trim_end_matches('/').to_string(),
            last_health: WorkerHealth::Unreachable,
            last_checked: None,
        }
    }

    pub fn record_health(&mut self, health: WorkerHealth) {
        self.last_health = health;
        self.last_checked = Some(Utc::now());
    }
}

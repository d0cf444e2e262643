// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Audit record vocabulary.
//!
//! Entries are append-only and never handed out by reference; arguments and
//! results are stored as compact digests (sha256 prefix + truncated
//! preview) so the audit file stays bounded regardless of payload size.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest as _, Sha256};

use crate::domain::policy::RiskLevel;

/// Terminal status of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Denied,
    Cancelled,
    Error,
}

/// Compact representation of a payload: a sha256 prefix for correlation and
/// a preview truncated to the configured byte budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadDigest {
    pub sha256: String,
    pub preview: String,
}

impl PayloadDigest {
    pub fn of_value(value: &Value, budget: usize) -> Self {
        let rendered = value.to_string();
        Self::of_str(&rendered, budget)
    }

    pub fn of_str(rendered: &str, budget: usize) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(rendered.as_bytes());
        let sha256 = hex::encode(&hasher.finalize()[..8]);

        let preview = if rendered.len() > budget {
            let mut cut = budget;
            while cut > 0 && !rendered.is_char_boundary(cut) {
                cut -= 1;
            }
            format!("{}…", &rendered[..cut])
        } else {
            rendered.to_string()
        };

        Self { sha256, preview }
    }
}

/// One immutable audit record. Ordered by `ts` within a day file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub ts: DateTime<Utc>,
    pub principal: String,
    pub tool_name: String,
    pub risk: RiskLevel,
    pub status: AuditStatus,
    pub confirmation_required: bool,
    pub confirmation_granted: bool,
    /// Set when a dev-mode broker approved without asking a human.
    #[serde(default)]
    pub auto_approved: bool,
    pub arguments: PayloadDigest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<PayloadDigest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

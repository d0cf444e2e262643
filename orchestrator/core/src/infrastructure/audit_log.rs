// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Append-only audit store.
//!
//! One newline-delimited JSON file per UTC calendar day
//! (`audit_YYYYMMDD.jsonl`). All appends funnel through a single serialized
//! writer and every entry is flushed before the call returns, so concurrent
//! invocations interleave whole lines, never fragments. Entries are never
//! mutated and never handed out by reference.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crate::domain::audit::{AuditEntry, AuditStatus};
use crate::domain::policy::RiskLevel;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audit serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

struct DayWriter {
    day: NaiveDate,
    writer: BufWriter<File>,
}

/// The audit log: serialized appender plus read APIs for dashboards.
pub struct AuditLog {
    dir: PathBuf,
    writer: Mutex<Option<DayWriter>>,
}

impl AuditLog {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            writer: Mutex::new(None),
        })
    }

    fn file_for(&self, day: NaiveDate) -> PathBuf {
        self.dir.join(format!("audit_{}.jsonl", day.format("%Y%m%d")))
    }

    /// Append one entry, rolling to a new file at day boundaries. Flushes
    /// before returning.
    pub fn append(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let line = serde_json::to_string(entry)?;
        let day = entry.ts.date_naive();

        let mut guard = self.writer.lock();
        let rollover = match guard.as_ref() {
            Some(current) => current.day != day,
            None => true,
        };
        if rollover {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.file_for(day))?;
            *guard = Some(DayWriter {
                day,
                writer: BufWriter::new(file),
            });
        }

        let Some(current) = guard.as_mut() else {
            return Ok(());
        };
        current.writer.write_all(line.as_bytes())?;
        current.writer.write_all(b"\n")?;
        current.writer.flush()?;
        Ok(())
    }

    /// The most recent `limit` entries of the current day file.
    pub fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditError> {
        // Take the writer lock so a concurrent append's line is fully flushed.
        let _guard = self.writer.lock();
        let path = self.file_for(Utc::now().date_naive());
        let entries = read_entries(&path)?;
        let skip = entries.len().saturating_sub(limit);
        Ok(entries.into_iter().skip(skip).collect())
    }

    /// Per-principal aggregates over recent history, used by security
    /// dashboards.
    pub fn principal_stats(&self, principal: &str) -> Result<PrincipalStats, AuditError> {
        let entries = self.recent(1000)?;
        let mine: Vec<_> = entries
            .into_iter()
            .filter(|e| e.principal == principal)
            .collect();

        if mine.is_empty() {
            return Ok(PrincipalStats::empty(principal));
        }

        let mut by_risk = RiskCounts::default();
        let mut successes = 0usize;
        for entry in &mine {
            by_risk.bump(entry.risk);
            if entry.status == AuditStatus::Success {
                successes += 1;
            }
        }

        Ok(PrincipalStats {
            principal: principal.to_string(),
            total: mine.len(),
            by_risk,
            success_rate: successes as f64 / mine.len() as f64,
            last_action: mine.last().map(|e| e.ts.to_rfc3339()),
        })
    }
}

fn read_entries(path: &Path) -> Result<Vec<AuditEntry>, AuditError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => tracing::warn!(error = %e, "Skipping unreadable audit line"),
        }
    }
    Ok(entries)
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct RiskCounts {
    pub safe: usize,
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
}

impl RiskCounts {
    fn bump(&mut self, risk: RiskLevel) {
        match risk {
            RiskLevel::Safe => self.safe += 1,
            RiskLevel::Low => self.low += 1,
            RiskLevel::Medium => self.medium += 1,
            RiskLevel::High => self.high += 1,
            RiskLevel::Critical => self.critical += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PrincipalStats {
    pub principal: String,
    pub total: usize,
    pub by_risk: RiskCounts,
    pub success_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_action: Option<String>,
}

impl PrincipalStats {
    fn empty(principal: &str) -> Self {
        Self {
            principal: principal.to_string(),
            total: 0,
            by_risk: RiskCounts::default(),
            success_rate: 0.0,
            last_action: None,
        }
    }
}

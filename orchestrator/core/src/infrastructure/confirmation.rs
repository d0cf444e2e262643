// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Confirmation Broker - Infrastructure for human-in-the-loop approval
//!
//! Carries a confirmation question from the invocation pipeline to a human
//! and returns the decision before a per-request deadline. Three modes share
//! one contract: interactive (a prompt source supplied by the front-end),
//! channel (stored request resolved through the HTTP surface), and
//! auto-approve (development only, loudly advertised).
//!
//! Outcome transitions are one-way: once a request is approved, rejected or
//! expired it never changes again, and re-delivery of a decision reports
//! `AlreadyResolved` instead of crashing or flipping the outcome.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{oneshot, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::policy::RiskLevel;
use crate::domain::react::Action;

const COMPLETED_RING_CAP: usize = 256;

/// Terminal outcome of a confirmation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationOutcome {
    Approved,
    Rejected,
    Expired,
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Confirmation request {0} not found")]
    Unknown(Uuid),

    #[error("Confirmation request {0} already resolved")]
    AlreadyResolved(Uuid),

    #[error("Confirmation request {0} expired")]
    Expired(Uuid),
}

/// A pending request as shown to humans (CLI prompt or API listing).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingConfirmation {
    pub id: Uuid,
    pub principal: String,
    pub action: String,
    pub arguments: String,
    pub risk: RiskLevel,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Source of interactive yes/no answers (e.g. a terminal prompt).
#[async_trait]
pub trait PromptSource: Send + Sync {
    /// Ask the human; `true` approves. Implementations should block until
    /// an answer arrives; the broker enforces the timeout around the call.
    async fn ask(&self, request: &PendingConfirmation) -> bool;
}

/// How the broker reaches a human. Selected at construction.
#[derive(Clone)]
pub enum BrokerMode {
    /// Ask through an injected prompt source (CLI front-end).
    Interactive(Arc<dyn PromptSource>),
    /// Store the request and wait for `resolve` via the HTTP surface.
    Channel,
    /// Approve everything. Development only.
    AutoApprove,
}

struct PendingEntry {
    info: PendingConfirmation,
    tx: oneshot::Sender<ConfirmationOutcome>,
}

/// The confirmation broker. Requests complete through a per-request oneshot
/// signal; the pending table is guarded and expired requests move to
/// `expired` at first observation past their deadline, never to resurrect.
pub struct ConfirmationBroker {
    mode: BrokerMode,
    pending: RwLock<HashMap<Uuid, PendingEntry>>,
    completed: Mutex<VecDeque<(Uuid, ConfirmationOutcome)>>,
}

impl ConfirmationBroker {
    pub fn new(mode: BrokerMode) -> Self {
        if matches!(mode, BrokerMode::AutoApprove) {
            warn!("==========================================================");
            warn!("  AUTO-APPROVE ENABLED: confirmations are not asked.");
            warn!("  This is a development mode. Do not run in production.");
            warn!("==========================================================");
        }
        Self {
            mode,
            pending: RwLock::new(HashMap::new()),
            completed: Mutex::new(VecDeque::new()),
        }
    }

    pub fn is_auto_approve(&self) -> bool {
        matches!(self.mode, BrokerMode::AutoApprove)
    }

    /// Ask for confirmation of `action` and wait for a terminal outcome or
    /// the timeout.
    pub async fn request(
        &self,
        principal: &str,
        action: &Action,
        risk: RiskLevel,
        reason: &str,
        timeout: Duration,
    ) -> ConfirmationOutcome {
        let info = PendingConfirmation {
            id: Uuid::new_v4(),
            principal: principal.to_string(),
            action: action.tool_name.clone(),
            arguments: action.to_string(),
            risk,
            reason: reason.to_string(),
            created_at: Utc::now(),
            expires_at: Utc::now()
                + chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::seconds(30)),
        };

        match &self.mode {
            BrokerMode::AutoApprove => {
                warn!(action = %info.action, "AUTO-APPROVE: confirmation skipped (dev mode)");
                self.record_completed(info.id, ConfirmationOutcome::Approved);
                ConfirmationOutcome::Approved
            }
            BrokerMode::Interactive(source) => {
                let outcome = match tokio::time::timeout(timeout, source.ask(&info)).await {
                    Ok(true) => ConfirmationOutcome::Approved,
                    Ok(false) => ConfirmationOutcome::Rejected,
                    Err(_) => ConfirmationOutcome::Expired,
                };
                self.record_completed(info.id, outcome);
                outcome
            }
            BrokerMode::Channel => self.request_via_channel(info, timeout).await,
        }
    }

    async fn request_via_channel(
        &self,
        info: PendingConfirmation,
        timeout: Duration,
    ) -> ConfirmationOutcome {
        let id = info.id;
        let (tx, mut rx) = oneshot::channel();

        {
            let mut pending = self.pending.write().await;
            pending.insert(id, PendingEntry { info, tx });
        }
        info!(request_id = %id, timeout_secs = timeout.as_secs(), "Confirmation requested");

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                // Sender dropped without a decision; treat as expiry.
                self.expire(id).await
            }
            Err(_) => {
                // A decision may have raced the timer.
                if let Ok(outcome) = rx.try_recv() {
                    return outcome;
                }
                self.expire(id).await
            }
        }
    }

    async fn expire(&self, id: Uuid) -> ConfirmationOutcome {
        let mut pending = self.pending.write().await;
        if pending.remove(&id).is_some() {
            warn!(request_id = %id, "Confirmation request expired");
            self.record_completed(id, ConfirmationOutcome::Expired);
        }
        ConfirmationOutcome::Expired
    }

    /// Deliver a decision from the external channel.
    ///
    /// Returns the outcome now associated with the request. Re-delivery on a
    /// terminal request reports `AlreadyResolved`; a request observed past
    /// its deadline reports `Expired` and stays expired.
    pub async fn resolve(
        &self,
        id: Uuid,
        approved: bool,
    ) -> Result<ConfirmationOutcome, BrokerError> {
        let mut pending = self.pending.write().await;
        match pending.remove(&id) {
            Some(entry) => {
                if Utc::now() > entry.info.expires_at {
                    self.record_completed(id, ConfirmationOutcome::Expired);
                    let _ = entry.tx.send(ConfirmationOutcome::Expired);
                    return Err(BrokerError::Expired(id));
                }
                let outcome = if approved {
                    ConfirmationOutcome::Approved
                } else {
                    ConfirmationOutcome::Rejected
                };
                info!(request_id = %id, approved, "Confirmation resolved");
                self.record_completed(id, outcome);
                let _ = entry.tx.send(outcome);
                Ok(outcome)
            }
            None => {
                let completed = self.completed.lock();
                if completed.iter().any(|(cid, _)| *cid == id) {
                    Err(BrokerError::AlreadyResolved(id))
                } else {
                    Err(BrokerError::Unknown(id))
                }
            }
        }
    }

    /// Snapshot non-terminal requests, reaping any that expired.
    pub async fn pending(&self, principal: Option<&str>) -> Vec<PendingConfirmation> {
        let mut pending = self.pending.write().await;
        let now = Utc::now();

        let expired: Vec<Uuid> = pending
            .values()
            .filter(|entry| now > entry.info.expires_at)
            .map(|entry| entry.info.id)
            .collect();
        for id in expired {
            if let Some(entry) = pending.remove(&id) {
                debug!(request_id = %id, "Reaping expired confirmation");
                self.record_completed(id, ConfirmationOutcome::Expired);
                let _ = entry.tx.send(ConfirmationOutcome::Expired);
            }
        }

        let mut requests: Vec<PendingConfirmation> = pending
            .values()
            .map(|entry| entry.info.clone())
            .filter(|info| principal.map(|p| info.principal == p).unwrap_or(true))
            .collect();
        requests.sort_by_key(|info| info.created_at);
        requests
    }

    fn record_completed(&self, id: Uuid, outcome: ConfirmationOutcome) {
        let mut completed = self.completed.lock();
        if completed.len() == COMPLETED_RING_CAP {
            completed.pop_front();
        }
        completed.push_back((id, outcome));
    }
}

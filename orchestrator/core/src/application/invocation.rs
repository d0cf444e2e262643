// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! The safe-execution pipeline: Permission → Confirmation → Tool → Audit.
//!
//! Every side-effecting action flows through `invoke`, which guarantees the
//! core invariants: a denied action never reaches its handler, a
//! confirmable action runs only after the broker approves, and every
//! invocation leaves exactly one audit entry whose status reflects the
//! outcome (decision before outcome, totally ordered per invocation).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::domain::audit::{AuditEntry, AuditStatus, PayloadDigest};
use crate::domain::policy::{PermissionEngine, PermissionVerdict};
use crate::domain::react::{Action, Observation};
use crate::domain::tool::ToolError;
use crate::infrastructure::audit_log::AuditLog;
use crate::infrastructure::confirmation::{ConfirmationBroker, ConfirmationOutcome};
use crate::infrastructure::registry::ToolRegistry;

pub struct InvocationPipeline {
    registry: Arc<ToolRegistry>,
    permissions: Arc<PermissionEngine>,
    broker: Arc<ConfirmationBroker>,
    audit: Arc<AuditLog>,
    confirm_timeout: Duration,
    digest_budget: usize,
}

struct ConfirmationInfo {
    required: bool,
    granted: bool,
    auto_approved: bool,
}

impl InvocationPipeline {
    pub fn new(
        registry: Arc<ToolRegistry>,
        permissions: Arc<PermissionEngine>,
        broker: Arc<ConfirmationBroker>,
        audit: Arc<AuditLog>,
        confirm_timeout: Duration,
        digest_budget: usize,
    ) -> Self {
        Self {
            registry,
            permissions,
            broker,
            audit,
            confirm_timeout,
            digest_budget,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn permissions(&self) -> &Arc<PermissionEngine> {
        &self.permissions
    }

    /// Route one action through the full pipeline. Always returns an
    /// observation; errors are folded into its status and recorded in the
    /// audit log.
    pub async fn invoke(
        &self,
        principal: &str,
        action: &Action,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Observation {
        let started = Instant::now();
        let verdict = self
            .permissions
            .check(principal, &action.tool_name, &action.arguments);

        if !verdict.allow {
            let err = ToolError::PermissionDenied(verdict.reason.clone());
            self.record(
                principal,
                action,
                &verdict,
                ConfirmationInfo {
                    required: false,
                    granted: false,
                    auto_approved: false,
                },
                AuditStatus::Denied,
                None,
                Some(&verdict.reason),
            );
            return Observation::failed(
                action.clone(),
                err.action_status(),
                verdict.reason.clone(),
                err.kind(),
                started.elapsed(),
            );
        }

        let descriptor_confirms = self
            .registry
            .descriptor(&action.tool_name)
            .await
            .map(|d| d.requires_confirmation)
            .unwrap_or(false);
        let needs_confirmation = verdict.requires_confirmation || descriptor_confirms;

        let mut confirmation = ConfirmationInfo {
            required: needs_confirmation,
            granted: false,
            auto_approved: false,
        };

        if needs_confirmation {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let timeout = remaining.min(self.confirm_timeout);
            let outcome = self
                .broker
                .request(principal, action, verdict.risk, &verdict.reason, timeout)
                .await;
            confirmation.auto_approved = self.broker.is_auto_approve();

            match outcome {
                ConfirmationOutcome::Approved => {
                    confirmation.granted = true;
                }
                ConfirmationOutcome::Rejected => {
                    let err = ToolError::ConfirmationRejected;
                    self.record(
                        principal,
                        action,
                        &verdict,
                        confirmation,
                        err.audit_status(),
                        None,
                        Some("confirmation rejected"),
                    );
                    return Observation::failed(
                        action.clone(),
                        err.action_status(),
                        err.to_string(),
                        err.kind(),
                        started.elapsed(),
                    );
                }
                ConfirmationOutcome::Expired => {
                    let err = ToolError::ConfirmationTimeout;
                    self.record(
                        principal,
                        action,
                        &verdict,
                        confirmation,
                        err.audit_status(),
                        None,
                        Some("confirmation expired"),
                    );
                    return Observation::failed(
                        action.clone(),
                        err.action_status(),
                        err.to_string(),
                        err.kind(),
                        started.elapsed(),
                    );
                }
            }
        }

        match self
            .registry
            .invoke(&action.tool_name, &action.arguments, deadline, cancel)
            .await
        {
            Ok(result) => {
                info!(
                    principal = %principal,
                    tool = %action.tool_name,
                    risk = ?verdict.risk,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Action succeeded"
                );
                self.record(
                    principal,
                    action,
                    &verdict,
                    confirmation,
                    AuditStatus::Success,
                    Some(&result),
                    None,
                );
                Observation::success(action.clone(), result, started.elapsed())
            }
            Err(err) => {
                info!(
                    principal = %principal,
                    tool = %action.tool_name,
                    error = %err,
                    "Action failed"
                );
                // Cancellation may have interrupted a handler mid-flight;
                // the audit keeps the record either way.
                self.record(
                    principal,
                    action,
                    &verdict,
                    confirmation,
                    err.audit_status(),
                    None,
                    Some(&err.to_string()),
                );
                Observation::failed(
                    action.clone(),
                    err.action_status(),
                    err.to_string(),
                    err.kind(),
                    started.elapsed(),
                )
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        principal: &str,
        action: &Action,
        verdict: &PermissionVerdict,
        confirmation: ConfirmationInfo,
        status: AuditStatus,
        result: Option<&Value>,
        error: Option<&str>,
    ) {
        let arguments = serde_json::to_value(&action.arguments)
            .map(|v| PayloadDigest::of_value(&v, self.digest_budget))
            .unwrap_or_else(|_| PayloadDigest::of_str("<unserializable>", self.digest_budget));

        let entry = AuditEntry {
            ts: Utc::now(),
            principal: principal.to_string(),
            tool_name: action.tool_name.clone(),
            risk: verdict.risk,
            status,
            confirmation_required: confirmation.required,
            confirmation_granted: confirmation.granted,
            auto_approved: confirmation.auto_approved && confirmation.required,
            arguments,
            outcome: result.map(|v| PayloadDigest::of_value(v, self.digest_budget)),
            error: error.map(|e| e.to_string()),
        };

        if let Err(e) = self.audit.append(&entry) {
            error!(error = %e, tool = %entry.tool_name, "Failed to write audit entry");
        }
    }

}

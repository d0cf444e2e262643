// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent Loop - the reason/act/observe cycle.
//!
//! Given a task and a bounded view of prior exchanges, the loop asks the
//! planner for exactly one `Thought:` plus either an `Action:` or a final
//! `Answer:`, routes chosen actions through the invocation pipeline, and
//! feeds observations back. It terminates on an answer, the step cap, the
//! wall deadline, or cancellation, for any planner output including
//! adversarial ones.
//!
//! The loop check-points the cancellation signal between steps and around
//! every tool call, and the remaining wall budget bounds each tool call's
//! deadline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::conversation::{PromptMessage, Role};
use crate::domain::react::{parse_planner_reply, ActionStatus, PlannerReply, ReactStep};
use crate::infrastructure::config::AgentBudgets;
use crate::infrastructure::planner::{Planner, PlannerError};
use crate::infrastructure::registry::ToolRegistry;

use super::invocation::InvocationPipeline;

/// Why a run stopped without a final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncompleteReason {
    Timeout,
    MaxIterations,
    Cancelled,
}

/// Why a run failed outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    PlannerUnavailable,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Incomplete { reason: IncompleteReason },
    Failed { kind: FailureKind },
}

/// Result of one agent run: status, optional answer, and the full trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub trace: Vec<ReactStep>,
    pub duration: Duration,
}

impl RunOutcome {
    /// Flat list of invoked tool names, in order.
    pub fn actions_taken(&self) -> Vec<String> {
        self.trace
            .iter()
            .filter_map(|step| step.action.as_ref().map(|a| a.tool_name.clone()))
            .collect()
    }
}

/// Running counters, exposed read-only.
#[derive(Default)]
pub struct AgentStats {
    actions_attempted: AtomicU64,
    actions_succeeded: AtomicU64,
    actions_failed: AtomicU64,
    total_thoughts: AtomicU64,
    planner_failures: AtomicU64,
    total_action_ms: AtomicU64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatsSnapshot {
    pub actions_attempted: u64,
    pub actions_succeeded: u64,
    pub actions_failed: u64,
    pub total_thoughts: u64,
    pub planner_failures: u64,
    pub average_action_ms: u64,
}

impl AgentStats {
    fn snapshot(&self) -> AgentStatsSnapshot {
        let attempted = self.actions_attempted.load(Ordering::Relaxed);
        let total_ms = self.total_action_ms.load(Ordering::Relaxed);
        AgentStatsSnapshot {
            actions_attempted: attempted,
            actions_succeeded: self.actions_succeeded.load(Ordering::Relaxed),
            actions_failed: self.actions_failed.load(Ordering::Relaxed),
            total_thoughts: self.total_thoughts.load(Ordering::Relaxed),
            planner_failures: self.planner_failures.load(Ordering::Relaxed),
            average_action_ms: if attempted > 0 { total_ms / attempted } else { 0 },
        }
    }
}

pub struct AgentLoop {
    planner: Arc<dyn Planner>,
    pipeline: Arc<InvocationPipeline>,
    registry: Arc<ToolRegistry>,
    budgets: AgentBudgets,
    stats: AgentStats,
}

impl AgentLoop {
    pub fn new(
        planner: Arc<dyn Planner>,
        pipeline: Arc<InvocationPipeline>,
        registry: Arc<ToolRegistry>,
        budgets: AgentBudgets,
    ) -> Self {
        Self {
            planner,
            pipeline,
            registry,
            budgets,
            stats: AgentStats::default(),
        }
    }

    pub fn stats(&self) -> AgentStatsSnapshot {
        self.stats.snapshot()
    }

    /// Run the full cycle for one task.
    pub async fn run(
        &self,
        principal: &str,
        task: &str,
        history: &[PromptMessage],
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let started = Instant::now();
        let deadline = started + Duration::from_secs(self.budgets.deadline_secs);
        let catalog = self.registry.catalog_prompt().await;
        let mut trace: Vec<ReactStep> = Vec::new();

        for step_number in 1..=self.budgets.max_steps {
            if cancel.is_cancelled() {
                return self.stop(trace, started, IncompleteReason::Cancelled);
            }
            if Instant::now() >= deadline {
                return self.stop(trace, started, IncompleteReason::Timeout);
            }

            let prompt = self.build_prompt(task, history, &catalog, &trace);
            let raw = match self.planner.plan(&prompt).await {
                Ok(raw) => raw,
                Err(e) => {
                    self.stats.planner_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(principal = %principal, error = %e, "Planner call failed");
                    let kind = match e {
                        PlannerError::Timeout | PlannerError::Unavailable(_) => {
                            FailureKind::PlannerUnavailable
                        }
                        PlannerError::Invalid(_) => FailureKind::Internal,
                    };
                    return RunOutcome {
                        status: RunStatus::Failed { kind },
                        answer: None,
                        error: Some(e.to_string()),
                        trace,
                        duration: started.elapsed(),
                    };
                }
            };
            self.stats.total_thoughts.fetch_add(1, Ordering::Relaxed);

            match parse_planner_reply(&raw) {
                PlannerReply::Answer { thought, text } => {
                    trace.push(ReactStep {
                        step: step_number,
                        thought,
                        action: None,
                        observation: None,
                        diagnostic: None,
                    });
                    debug!(principal = %principal, steps = step_number, "Run completed");
                    return RunOutcome {
                        status: RunStatus::Completed,
                        answer: Some(text),
                        error: None,
                        trace,
                        duration: started.elapsed(),
                    };
                }
                PlannerReply::Act { thought, action } => {
                    self.stats.actions_attempted.fetch_add(1, Ordering::Relaxed);
                    let observation = self
                        .pipeline
                        .invoke(principal, &action, deadline, cancel)
                        .await;

                    match observation.status {
                        ActionStatus::Success => {
                            self.stats.actions_succeeded.fetch_add(1, Ordering::Relaxed)
                        }
                        _ => self.stats.actions_failed.fetch_add(1, Ordering::Relaxed),
                    };
                    self.stats.total_action_ms.fetch_add(
                        observation.duration.as_millis() as u64,
                        Ordering::Relaxed,
                    );

                    trace.push(ReactStep {
                        step: step_number,
                        thought,
                        action: Some(action),
                        observation: Some(observation),
                        diagnostic: None,
                    });
                }
                PlannerReply::Malformed { thought, diagnostic } => {
                    debug!(principal = %principal, diagnostic = %diagnostic, "Malformed planner output");
                    trace.push(ReactStep {
                        step: step_number,
                        thought,
                        action: None,
                        observation: None,
                        diagnostic: Some(diagnostic),
                    });
                }
            }
        }

        self.stop(trace, started, IncompleteReason::MaxIterations)
    }

    fn stop(
        &self,
        trace: Vec<ReactStep>,
        started: Instant,
        reason: IncompleteReason,
    ) -> RunOutcome {
        let error = match reason {
            IncompleteReason::Timeout => {
                format!("Deadline of {}s exceeded", self.budgets.deadline_secs)
            }
            IncompleteReason::MaxIterations => {
                format!("Max iterations ({}) reached", self.budgets.max_steps)
            }
            IncompleteReason::Cancelled => "Run cancelled".to_string(),
        };
        RunOutcome {
            status: RunStatus::Incomplete { reason },
            answer: None,
            error: Some(error),
            trace,
            duration: started.elapsed(),
        }
    }

    fn build_prompt(
        &self,
        task: &str,
        history: &[PromptMessage],
        catalog: &str,
        trace: &[ReactStep],
    ) -> String {
        let mut prompt = format!(
            "You are Majordomo, an autonomous assistant that uses tools to accomplish tasks.\n\n\
             Task: {}\n\n\
             {}\n\
             Use this format:\n\
             Thought: [your reasoning about what to do next]\n\
             Action: tool_name(arg1=\"value1\", arg2=\"value2\")\n\n\
             Or when you have the final answer:\n\
             Thought: [your reasoning]\n\
             Answer: [your final answer]\n\n",
            task, catalog
        );

        if !history.is_empty() {
            prompt.push_str("Conversation so far:\n");
            for message in history {
                let role = match message.role {
                    Role::User => "User",
                    Role::Assistant => "Assistant",
                };
                prompt.push_str(&format!("{}: {}\n", role, message.content));
            }
            prompt.push('\n');
        }

        if trace.is_empty() {
            prompt.push_str("Begin:\n");
        } else {
            prompt.push_str("Previous steps:\n");
            for step in trace {
                prompt.push_str(&format!("\nStep {}:\n", step.step));
                if !step.thought.is_empty() {
                    prompt.push_str(&format!("Thought: {}\n", step.thought));
                }
                if let Some(action) = &step.action {
                    prompt.push_str(&format!("Action: {}\n", action));
                }
                if let Some(observation) = &step.observation {
                    prompt.push_str(&format!("Observation: {}\n", observation.summary()));
                }
                if let Some(diagnostic) = &step.diagnostic {
                    prompt.push_str(&format!(
                        "Observation: Malformed response ({}). Reply with the required format.\n",
                        diagnostic
                    ));
                }
            }
            prompt.push_str("\nNow continue:\n");
        }

        prompt
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Dispatcher - the thin façade use-case behind `POST /command`.
//!
//! Validates the utterance, fetches bounded history, runs the agent loop,
//! appends the exchange, and returns a structured response. When the
//! planner worker is unreachable, a small deterministic pre-classifier
//! answers instead of failing the request; it is used only as a fallback,
//! never as the primary routing mechanism.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::conversation::{ActionRecord, Utterance};
use crate::domain::react::{Action, ActionStatus};
use crate::domain::tool::{ArgMap, ArgValue};
use crate::infrastructure::context_store::ContextStore;

use super::agent_loop::{AgentLoop, FailureKind, IncompleteReason, RunOutcome, RunStatus};
use super::invocation::InvocationPipeline;

const FALLBACK_DEADLINE: Duration = Duration::from_secs(15);

/// Phrases that introduce a fact to remember, checked by the fallback rule.
const LEARN_MARKERS: &[&str] = &["apprends que", "retiens que", "mémorise que", "learn that"];

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Utterance text must not be empty")]
    EmptyUtterance,
}

impl DispatchError {
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::EmptyUtterance => "ValidationError",
        }
    }
}

/// Structured response returned to front-ends.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DispatchOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub actions_taken: Vec<String>,
}

pub struct Dispatcher {
    store: Arc<ContextStore>,
    agent: Arc<AgentLoop>,
    pipeline: Arc<InvocationPipeline>,
    history_exchanges: usize,
}

impl Dispatcher {
    pub fn new(
        store: Arc<ContextStore>,
        agent: Arc<AgentLoop>,
        pipeline: Arc<InvocationPipeline>,
        history_exchanges: usize,
    ) -> Self {
        Self {
            store,
            agent,
            pipeline,
            history_exchanges,
        }
    }

    pub fn agent(&self) -> &Arc<AgentLoop> {
        &self.agent
    }

    /// Process one utterance end to end.
    pub async fn dispatch(
        &self,
        principal: &str,
        text: &str,
        extra_context: Option<&serde_json::Map<String, Value>>,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome, DispatchError> {
        let utterance =
            Utterance::new(principal, text).map_err(|_| DispatchError::EmptyUtterance)?;
        info!(principal = %principal, utterance = %utterance.id, "Command received");

        if let Some(context) = extra_context {
            for (key, value) in context {
                self.store.set_variable(principal, key, value.clone()).await;
            }
        }

        let history = self
            .store
            .format_history_for_prompt(principal, self.history_exchanges)
            .await;

        let outcome = self
            .agent
            .run(principal, &utterance.text, &history, cancel)
            .await;

        let response = match &outcome.status {
            RunStatus::Completed => DispatchOutcome {
                success: true,
                message: outcome
                    .answer
                    .clone()
                    .unwrap_or_else(|| "Commande exécutée".to_string()),
                data: Some(json!({ "steps": outcome.trace.len() })),
                actions_taken: outcome.actions_taken(),
            },
            RunStatus::Incomplete { reason } => DispatchOutcome {
                success: false,
                message: incomplete_message(*reason),
                data: Some(json!({
                    "reason": reason,
                    "steps": outcome.trace.len(),
                })),
                actions_taken: outcome.actions_taken(),
            },
            RunStatus::Failed { kind } => match kind {
                FailureKind::PlannerUnavailable => {
                    warn!(principal = %principal, "Planner unreachable, using fallback");
                    self.fallback(principal, &utterance.text, cancel).await
                }
                FailureKind::Internal => DispatchOutcome {
                    success: false,
                    message: "Je rencontre une difficulté technique. Pouvez-vous reformuler ?"
                        .to_string(),
                    data: outcome.error.clone().map(|e| json!({ "error": e })),
                    actions_taken: outcome.actions_taken(),
                },
            },
        };

        self.store
            .append_exchange(
                principal,
                utterance.text.clone(),
                response.message.clone(),
                action_records(&outcome),
            )
            .await;

        Ok(response)
    }

    /// Deterministic degraded-mode replies for planner outages. The learn
    /// rule still routes through the invocation pipeline so the audit trail
    /// stays complete.
    async fn fallback(
        &self,
        principal: &str,
        text: &str,
        cancel: &CancellationToken,
    ) -> DispatchOutcome {
        let lowered = text.to_lowercase();

        for marker in LEARN_MARKERS {
            if let Some(at) = lowered.find(marker) {
                // Index into the original text; lowercasing is length-stable
                // for the alphabets we match, but don't panic if it is not.
                let fact = text
                    .get(at + marker.len()..)
                    .unwrap_or(&lowered[at + marker.len()..])
                    .trim()
                    .to_string();
                if fact.is_empty() {
                    break;
                }
                return self.fallback_learn(principal, &fact, cancel).await;
            }
        }

        DispatchOutcome {
            success: false,
            message: "Je suis temporairement indisponible. Mode dégradé activé.".to_string(),
            data: Some(json!({ "mode": "fallback", "original_text": text })),
            actions_taken: vec!["fallback_generic".to_string()],
        }
    }

    async fn fallback_learn(
        &self,
        principal: &str,
        fact: &str,
        cancel: &CancellationToken,
    ) -> DispatchOutcome {
        let mut arguments = ArgMap::new();
        arguments.insert("text".to_string(), ArgValue::from(fact));
        let action = Action::new("learn_knowledge", arguments);

        let observation = self
            .pipeline
            .invoke(
                principal,
                &action,
                Instant::now() + FALLBACK_DEADLINE,
                cancel,
            )
            .await;

        match observation.status {
            ActionStatus::Success => DispatchOutcome {
                success: true,
                message: format!("J'ai appris: {}", fact),
                data: observation.result.clone(),
                actions_taken: vec!["learn_knowledge".to_string()],
            },
            _ => DispatchOutcome {
                success: false,
                message: "Je n'ai pas pu apprendre cette information.".to_string(),
                data: observation.error.clone().map(|e| json!({ "error": e })),
                actions_taken: vec!["learn_knowledge".to_string()],
            },
        }
    }
}

fn incomplete_message(reason: IncompleteReason) -> String {
    match reason {
        IncompleteReason::Timeout => {
            "Je n'ai pas pu terminer la tâche dans le temps imparti.".to_string()
        }
        IncompleteReason::MaxIterations => {
            "La tâche demande trop d'étapes, je m'arrête ici.".to_string()
        }
        IncompleteReason::Cancelled => "La tâche a été annulée.".to_string(),
    }
}

fn action_records(outcome: &RunOutcome) -> Vec<ActionRecord> {
    outcome
        .trace
        .iter()
        .filter_map(|step| {
            step.observation.as_ref().map(|observation| ActionRecord {
                tool_name: observation.action.tool_name.clone(),
                status: observation.status,
                duration_ms: observation.duration.as_millis() as u64,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::policy::PermissionEngine;
    use crate::infrastructure::audit_log::AuditLog;
    use crate::infrastructure::config::AgentBudgets;
    use crate::infrastructure::confirmation::{BrokerMode, ConfirmationBroker};
    use crate::infrastructure::coordinator::{PoolLimits, WorkerPool};
    use crate::infrastructure::planner::{Planner, PlannerError};
    use crate::infrastructure::registry::ToolRegistry;
    use crate::infrastructure::tools::remote::LearnKnowledgeTool;
    use async_trait::async_trait;

    struct DownPlanner;

    #[async_trait]
    impl Planner for DownPlanner {
        async fn plan(&self, _prompt: &str) -> Result<String, PlannerError> {
            Err(PlannerError::Unavailable("connection refused".into()))
        }
    }

    struct AnswerPlanner;

    #[async_trait]
    impl Planner for AnswerPlanner {
        async fn plan(&self, _prompt: &str) -> Result<String, PlannerError> {
            Ok("Thought: trivial.\nAnswer: Bonjour!".into())
        }
    }

    async fn dispatcher_with(
        planner: Arc<dyn Planner>,
        pool: Arc<WorkerPool>,
    ) -> (Dispatcher, tempfile::TempDir) {
        let registry = Arc::new(ToolRegistry::new());
        registry
            .register(Arc::new(LearnKnowledgeTool::new(pool)))
            .await
            .unwrap();

        let audit_dir = tempfile::tempdir().unwrap();
        let pipeline = Arc::new(InvocationPipeline::new(
            registry.clone(),
            Arc::new(PermissionEngine::default()),
            Arc::new(ConfirmationBroker::new(BrokerMode::Channel)),
            Arc::new(AuditLog::new(audit_dir.path()).unwrap()),
            Duration::from_secs(1),
            200,
        ));
        let agent = Arc::new(AgentLoop::new(
            planner,
            pipeline.clone(),
            registry,
            AgentBudgets::default(),
        ));
        let store = Arc::new(ContextStore::new(50, Duration::from_secs(3600)));
        (
            Dispatcher::new(store, agent, pipeline, 10),
            audit_dir,
        )
    }

    #[tokio::test]
    async fn test_empty_utterance_rejected() {
        let pool = Arc::new(WorkerPool::new(PoolLimits::default()));
        let (dispatcher, _dir) = dispatcher_with(Arc::new(AnswerPlanner), pool).await;

        let err = dispatcher
            .dispatch("u1", "   ", None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::EmptyUtterance));
        assert_eq!(err.kind(), "ValidationError");
    }

    #[tokio::test]
    async fn test_answer_appends_one_exchange() {
        let pool = Arc::new(WorkerPool::new(PoolLimits::default()));
        let (dispatcher, _dir) = dispatcher_with(Arc::new(AnswerPlanner), pool).await;

        let outcome = dispatcher
            .dispatch("u1", "dis bonjour", None, &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.message, "Bonjour!");
        assert!(outcome.actions_taken.is_empty());

        let stats = dispatcher.store.stats("u1").await;
        assert_eq!(stats.total_exchanges, 1);
    }

    #[tokio::test]
    async fn test_learn_fallback_when_planner_down() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/learn")
            .match_body(mockito::Matcher::Json(
                json!({"text": "Paris est la capitale de la France"}),
            ))
            .with_status(200)
            .with_body("{\"status\":\"success\"}")
            .create_async()
            .await;

        let pool = Arc::new(WorkerPool::new(PoolLimits::default()));
        pool.register_worker("learning", &server.url()).await;
        let (dispatcher, _dir) = dispatcher_with(Arc::new(DownPlanner), pool).await;

        let outcome = dispatcher
            .dispatch(
                "u1",
                "retiens que Paris est la capitale de la France",
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(
            outcome.message,
            "J'ai appris: Paris est la capitale de la France"
        );
        assert_eq!(outcome.actions_taken, vec!["learn_knowledge"]);
        mock.assert_async().await;

        assert_eq!(dispatcher.agent().stats().planner_failures, 1);
    }

    #[tokio::test]
    async fn test_generic_fallback_when_planner_down() {
        let pool = Arc::new(WorkerPool::new(PoolLimits::default()));
        let (dispatcher, _dir) = dispatcher_with(Arc::new(DownPlanner), pool).await;

        let outcome = dispatcher
            .dispatch("u1", "ouvre Safari", None, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.actions_taken, vec!["fallback_generic"]);
        assert_eq!(outcome.data.as_ref().unwrap()["mode"], "fallback");
    }

    #[tokio::test]
    async fn test_extra_context_lands_in_variables() {
        let pool = Arc::new(WorkerPool::new(PoolLimits::default()));
        let (dispatcher, _dir) = dispatcher_with(Arc::new(AnswerPlanner), pool).await;

        let mut context = serde_json::Map::new();
        context.insert("ville".into(), json!("Paris"));
        dispatcher
            .dispatch("u1", "bonjour", Some(&context), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            dispatcher.store.get_variable("u1", "ville").await,
            Some(json!("Paris"))
        );
    }
}

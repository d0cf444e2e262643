// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Planner adapter.
//!
//! The planner is the language-generation worker; the agent only sees this
//! trait. The worker adapter goes through the Service Coordinator so
//! timeouts, retries and backpressure apply uniformly.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;
use thiserror::Error;

use crate::infrastructure::coordinator::{CoordinatorError, WorkerPool};

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("Planner unavailable: {0}")]
    Unavailable(String),

    #[error("Planner call timed out")]
    Timeout,

    #[error("Planner returned an unusable response: {0}")]
    Invalid(String),
}

/// Produces the next planning step for a prompt. Output is untrusted text.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, prompt: &str) -> Result<String, PlannerError>;
}

/// Planner backed by the LLM worker's `/generate` endpoint.
pub struct WorkerPlanner {
    pool: Arc<WorkerPool>,
    worker: String,
    timeout: Duration,
}

impl WorkerPlanner {
    pub fn new(pool: Arc<WorkerPool>, worker: &str, timeout: Duration) -> Self {
        Self {
            pool,
            worker: worker.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl Planner for WorkerPlanner {
    async fn plan(&self, prompt: &str) -> Result<String, PlannerError> {
        let body = json!({ "prompt": prompt, "stream": false });
        let response = self
            .pool
            .call(&self.worker, "/generate", Method::POST, Some(body), self.timeout)
            .await
            .map_err(|e| match e {
                CoordinatorError::Timeout(_) => PlannerError::Timeout,
                other => PlannerError::Unavailable(other.to_string()),
            })?;

        // Workers answer either {"text": ...} or {"response": ...}.
        response
            .get("text")
            .or_else(|| response.get("response"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| PlannerError::Invalid(response.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::coordinator::PoolLimits;

    #[tokio::test]
    async fn test_worker_planner_extracts_text() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/generate")
            .with_status(200)
            .with_body("{\"text\": \"Thought: ok\\nAnswer: done\"}")
            .create_async()
            .await;

        let pool = Arc::new(WorkerPool::new(PoolLimits::default()));
        pool.register_worker("llm", &server.url()).await;

        let planner = WorkerPlanner::new(pool, "llm", Duration::from_secs(2));
        let text = planner.plan("do something").await.unwrap();
        assert!(text.contains("Answer: done"));
    }

    #[tokio::test]
    async fn test_worker_planner_unavailable() {
        let pool = Arc::new(WorkerPool::new(PoolLimits::default()));
        pool.register_worker("llm", "http://127.0.0.1:1").await;

        let planner = WorkerPlanner::new(pool, "llm", Duration::from_millis(500));
        let err = planner.plan("hello").await.unwrap_err();
        assert!(matches!(err, PlannerError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_worker_planner_rejects_shapeless_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/generate")
            .with_status(200)
            .with_body("{\"unexpected\": 1}")
            .create_async()
            .await;

        let pool = Arc::new(WorkerPool::new(PoolLimits::default()));
        pool.register_worker("llm", &server.url()).await;

        let planner = WorkerPlanner::new(pool, "llm", Duration::from_secs(2));
        let err = planner.plan("hello").await.unwrap_err();
        assert!(matches!(err, PlannerError::Invalid(_)));
    }
}

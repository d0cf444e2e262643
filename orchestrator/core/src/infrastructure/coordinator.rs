// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Service Coordinator - multiplexes calls to out-of-process workers.
//!
//! Keeps the address table, performs `/health` pings, and executes remote
//! calls with per-call timeouts. Transport-level failures (including 5xx,
//! which means the service itself is broken) are retried at most once after
//! a short fixed delay; HTTP application errors (4xx) are never retried.
//! Non-idempotent calls are never retried unless the caller says so.
//!
//! Backpressure: a bounded per-worker concurrency limit plus a bounded
//! overflow queue; beyond that, calls fail fast with `Unavailable`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, info, warn};

use crate::domain::tool::ToolError;
use crate::domain::worker::{WorkerDescriptor, WorkerHealth};

const TRANSPORT_RETRY_DELAY: Duration = Duration::from_millis(200);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Unknown worker: {0}")]
    UnknownWorker(String),

    #[error("Worker '{0}' unavailable: {1}")]
    Unavailable(String, String),

    #[error("Worker '{worker}' returned HTTP {status}: {body}")]
    Upstream {
        worker: String,
        status: u16,
        body: String,
    },

    #[error("Call to worker '{0}' timed out")]
    Timeout(String),

    #[error("Worker '{0}' is saturated, try again later")]
    Saturated(String),
}

impl From<CoordinatorError> for ToolError {
    fn from(err: CoordinatorError) -> Self {
        match err {
            CoordinatorError::UnknownWorker(name) => {
                ToolError::RemoteUnavailable(format!("unknown worker '{}'", name))
            }
            CoordinatorError::Unavailable(_, detail) => ToolError::RemoteUnavailable(detail),
            CoordinatorError::Saturated(name) => {
                ToolError::RemoteUnavailable(format!("worker '{}' saturated", name))
            }
            CoordinatorError::Timeout(_) => ToolError::Timeout,
            CoordinatorError::Upstream { status, body, .. } => {
                ToolError::Handler(format!("upstream HTTP {}: {}", status, body))
            }
        }
    }
}

struct WorkerEntry {
    descriptor: WorkerDescriptor,
    permits: Arc<Semaphore>,
    waiting: Arc<AtomicUsize>,
}

#[derive(Debug, Clone, Copy)]
pub struct PoolLimits {
    pub concurrency: usize,
    pub queue: usize,
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            concurrency: 8,
            queue: 32,
        }
    }
}

/// The worker pool shared by tools and the agent.
pub struct WorkerPool {
    workers: RwLock<HashMap<String, WorkerEntry>>,
    client: reqwest::Client,
    limits: PoolLimits,
}

impl WorkerPool {
    pub fn new(limits: PoolLimits) -> Self {
        Self {
            workers: RwLock::new(HashMap::new()),
            client: reqwest::Client::new(),
            limits,
        }
    }

    pub async fn register_worker(&self, name: &str, address: &str) {
        let mut workers = self.workers.write().await;
        info!(worker = %name, address = %address, "Worker registered");
        workers.insert(
            name.to_string(),
            WorkerEntry {
                descriptor: WorkerDescriptor::new(name, address),
                permits: Arc::new(Semaphore::new(self.limits.concurrency)),
                waiting: Arc::new(AtomicUsize::new(0)),
            },
        );
    }

    pub async fn deregister(&self, name: &str) -> bool {
        let mut workers = self.workers.write().await;
        workers.remove(name).is_some()
    }

    pub async fn descriptors(&self) -> Vec<WorkerDescriptor> {
        let workers = self.workers.read().await;
        let mut list: Vec<_> = workers.values().map(|w| w.descriptor.clone()).collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    /// Ping a worker's `/health` path, updating its descriptor.
    pub async fn health(&self, name: &str) -> Result<bool, CoordinatorError> {
        let address = {
            let workers = self.workers.read().await;
            workers
                .get(name)
                .map(|w| w.descriptor.address.clone())
                .ok_or_else(|| CoordinatorError::UnknownWorker(name.to_string()))?
        };

        let url = format!("{}/health", address);
        let health = match self.client.get(&url).timeout(HEALTH_TIMEOUT).send().await {
            Ok(response) if response.status().is_success() => WorkerHealth::Healthy,
            Ok(response) => {
                debug!(worker = %name, status = %response.status(), "Health check degraded");
                WorkerHealth::Degraded
            }
            Err(e) => {
                debug!(worker = %name, error = %e, "Health check failed");
                WorkerHealth::Unreachable
            }
        };

        let mut workers = self.workers.write().await;
        if let Some(entry) = workers.get_mut(name) {
            entry.descriptor.record_health(health);
        }
        Ok(health == WorkerHealth::Healthy)
    }

    /// Health of every registered worker, keyed by name. Pings run
    /// concurrently so one slow worker does not stall the report.
    pub async fn health_all(&self) -> HashMap<String, bool> {
        let names: Vec<String> = {
            let workers = self.workers.read().await;
            workers.keys().cloned().collect()
        };
        let checks = names.iter().map(|name| self.health(name));
        let outcomes = futures::future::join_all(checks).await;
        names
            .into_iter()
            .zip(outcomes)
            .map(|(name, healthy)| (name, healthy.unwrap_or(false)))
            .collect()
    }

    /// Issue a request to a worker. GETs are treated as idempotent; other
    /// methods are only retried when `idempotent` is set.
    pub async fn call(
        &self,
        name: &str,
        endpoint: &str,
        method: Method,
        body: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, CoordinatorError> {
        let idempotent = method == Method::GET;
        self.call_with(name, endpoint, method, body, timeout, idempotent)
            .await
    }

    pub async fn call_with(
        &self,
        name: &str,
        endpoint: &str,
        method: Method,
        body: Option<Value>,
        timeout: Duration,
        idempotent: bool,
    ) -> Result<Value, CoordinatorError> {
        let (address, permits, waiting) = {
            let workers = self.workers.read().await;
            let entry = workers
                .get(name)
                .ok_or_else(|| CoordinatorError::UnknownWorker(name.to_string()))?;
            (
                entry.descriptor.address.clone(),
                entry.permits.clone(),
                entry.waiting.clone(),
            )
        };

        // Admission control: fail fast once the overflow queue is full.
        if waiting.load(Ordering::Acquire) >= self.limits.queue {
            return Err(CoordinatorError::Saturated(name.to_string()));
        }
        waiting.fetch_add(1, Ordering::AcqRel);
        let permit = permits.acquire_owned().await;
        waiting.fetch_sub(1, Ordering::AcqRel);
        let _permit = permit.map_err(|_| CoordinatorError::Unavailable(
            name.to_string(),
            "worker pool closed".to_string(),
        ))?;

        let url = format!("{}{}", address, endpoint);
        let started = tokio::time::Instant::now();

        match self
            .attempt(name, &url, &method, body.as_ref(), timeout)
            .await
        {
            Ok(value) => Ok(value),
            Err(err @ CoordinatorError::Upstream { .. }) => Err(err),
            Err(err @ CoordinatorError::Timeout(_)) => Err(err),
            Err(first) => {
                if !idempotent {
                    return Err(first);
                }
                // One transport-level retry, within the caller's budget.
                tokio::time::sleep(TRANSPORT_RETRY_DELAY).await;
                let remaining = timeout.saturating_sub(started.elapsed());
                if remaining.is_zero() {
                    return Err(CoordinatorError::Timeout(name.to_string()));
                }
                warn!(worker = %name, endpoint = %endpoint, error = %first, "Retrying after transport failure");
                self.attempt(name, &url, &method, body.as_ref(), remaining)
                    .await
            }
        }
    }

    async fn attempt(
        &self,
        name: &str,
        url: &str,
        method: &Method,
        body: Option<&Value>,
        timeout: Duration,
    ) -> Result<Value, CoordinatorError> {
        let mut request = self.client.request(method.clone(), url).timeout(timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CoordinatorError::Timeout(name.to_string())
            } else {
                CoordinatorError::Unavailable(name.to_string(), e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoordinatorError::Unavailable(
                name.to_string(),
                format!("HTTP {}: {}", status.as_u16(), body),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoordinatorError::Upstream {
                worker: name.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| CoordinatorError::Unavailable(name.to_string(), format!("bad JSON: {}", e)))
    }

    /// Graceful drain on shutdown: forget the worker table. In-flight
    /// requests complete on their own timeouts.
    pub async fn close_all(&self) {
        let mut workers = self.workers.write().await;
        info!(count = workers.len(), "Closing worker connections");
        workers.clear();
    }
}

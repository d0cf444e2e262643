// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Runtime wiring: configuration in, a serving HTTP façade out.
//!
//! Builds every component in dependency order (audit → permissions →
//! broker → registry → pool → store → pipeline → agent → dispatcher) and
//! exposes the assembled axum router. Cyclic dependencies are broken by
//! injection: the agent receives the invocation pipeline as a capability,
//! and neither the registry nor the permission engine knows the agent
//! exists.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tracing::info;

use crate::application::agent_loop::AgentLoop;
use crate::application::dispatcher::Dispatcher;
use crate::application::invocation::InvocationPipeline;
use crate::domain::path_guard::PathGuard;
use crate::domain::policy::{PermissionEngine, SecurityPolicy};
use crate::infrastructure::audit_log::AuditLog;
use crate::infrastructure::config::CoreConfig;
use crate::infrastructure::confirmation::{BrokerMode, ConfirmationBroker};
use crate::infrastructure::context_store::ContextStore;
use crate::infrastructure::coordinator::{PoolLimits, WorkerPool};
use crate::infrastructure::exec_policy::CommandWhitelist;
use crate::infrastructure::planner::WorkerPlanner;
use crate::infrastructure::registry::ToolRegistry;
use crate::infrastructure::tools::exec::RunTerminalTool;
use crate::infrastructure::tools::fs::{
    GetFileInfoTool, ListDirectoryTool, ReadFileTool, SearchFilesTool, WriteFileTool,
};
use crate::infrastructure::tools::remote::{
    CloseAppTool, GetRunningAppsTool, GetSystemInfoTool, LearnKnowledgeTool, ListAppsTool,
    OpenAppTool,
};
use crate::presentation::api::{app, AppState};

pub struct OrchestratorRuntime {
    config: CoreConfig,
    state: Arc<AppState>,
}

impl OrchestratorRuntime {
    /// Assemble the full engine. `broker_mode` overrides the default
    /// (channel mode, or auto-approve when `dev_mode` is set).
    pub async fn bootstrap(
        config: CoreConfig,
        broker_mode: Option<BrokerMode>,
    ) -> Result<Self> {
        info!(
            host = %config.host,
            port = config.port,
            dev_mode = config.dev_mode,
            "Bootstrapping Majordomo orchestrator"
        );

        let audit = Arc::new(
            AuditLog::new(config.audit_dir.clone())
                .with_context(|| format!("opening audit dir {}", config.audit_dir.display()))?,
        );

        let policy = SecurityPolicy::default();
        let banned = policy.banned_commands.clone();
        let permissions = Arc::new(PermissionEngine::new(policy));

        let mode = broker_mode.unwrap_or(if config.dev_mode {
            BrokerMode::AutoApprove
        } else {
            BrokerMode::Channel
        });
        let broker = Arc::new(ConfirmationBroker::new(mode));

        let pool = Arc::new(WorkerPool::new(PoolLimits {
            concurrency: config.worker_concurrency,
            queue: config.worker_queue,
        }));
        pool.register_worker("llm", &config.workers.llm).await;
        pool.register_worker("executor", &config.workers.executor).await;
        pool.register_worker("connectors", &config.workers.connectors).await;
        pool.register_worker("learning", &config.workers.learning).await;

        let guard = Arc::new(PathGuard::new(
            config.fs_allowed_dirs.clone(),
            config.fs_denied_dirs.clone(),
        ));
        let whitelist = Arc::new(CommandWhitelist::load_or_default(
            config.exec_whitelist_path.as_deref(),
            &banned,
        ));

        let registry = Arc::new(ToolRegistry::new());
        registry
            .register(Arc::new(ReadFileTool::new(guard.clone(), config.max_read_bytes)))
            .await?;
        registry
            .register(Arc::new(WriteFileTool::new(guard.clone(), config.max_write_bytes)))
            .await?;
        registry
            .register(Arc::new(ListDirectoryTool::new(guard.clone())))
            .await?;
        registry
            .register(Arc::new(SearchFilesTool::new(guard.clone())))
            .await?;
        registry
            .register(Arc::new(GetFileInfoTool::new(guard.clone())))
            .await?;
        registry
            .register(Arc::new(RunTerminalTool::new(
                whitelist,
                config.fs_allowed_dirs.clone(),
            )))
            .await?;
        registry
            .register(Arc::new(LearnKnowledgeTool::new(pool.clone())))
            .await?;
        registry
            .register(Arc::new(OpenAppTool::new(pool.clone())))
            .await?;
        registry
            .register(Arc::new(CloseAppTool::new(pool.clone())))
            .await?;
        registry
            .register(Arc::new(GetSystemInfoTool::new(pool.clone())))
            .await?;
        registry
            .register(Arc::new(ListAppsTool::new(pool.clone())))
            .await?;
        registry
            .register(Arc::new(GetRunningAppsTool::new(pool.clone())))
            .await?;
        info!(tools = registry.describe().await.len(), "Tool catalog registered");

        let pipeline = Arc::new(InvocationPipeline::new(
            registry.clone(),
            permissions,
            broker.clone(),
            audit.clone(),
            config.confirm_timeout(),
            config.audit_digest_budget,
        ));

        let planner = Arc::new(WorkerPlanner::new(
            pool.clone(),
            "llm",
            config.worker_timeout(),
        ));
        let agent = Arc::new(AgentLoop::new(
            planner,
            pipeline.clone(),
            registry.clone(),
            config.agent.clone(),
        ));

        let store = Arc::new(ContextStore::new(
            config.session_cap,
            std::time::Duration::from_secs(config.session_idle_secs),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            agent,
            pipeline.clone(),
            config.agent.history_exchanges,
        ));

        let state = Arc::new(AppState {
            dispatcher,
            pipeline,
            store,
            broker,
            pool,
            audit,
        });

        Ok(Self { config, state })
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    pub fn router(&self) -> Router {
        app(self.state.clone())
    }

    /// Bind and serve until ctrl-c, then drain workers.
    pub async fn serve(self) -> Result<()> {
        let address = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&address)
            .await
            .with_context(|| format!("binding {}", address))?;
        info!(address = %address, "Majordomo orchestrator listening");

        let state = self.state.clone();
        let purge_store = state.store.clone();
        let purger = tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(15 * 60));
            loop {
                interval.tick().await;
                let purged = purge_store.purge_idle().await;
                if purged > 0 {
                    info!(purged, "Purged idle sessions");
                }
            }
        });

        // Keep worker descriptors fresh so /health answers from recent data.
        let health_pool = state.pool.clone();
        let health_loop = tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
            loop {
                interval.tick().await;
                let report = health_pool.health_all().await;
                for (worker, healthy) in report {
                    if !healthy {
                        tracing::warn!(worker = %worker, "Worker unhealthy");
                    }
                }
            }
        });

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutdown signal received");
            })
            .await?;

        purger.abort();
        health_loop.abort();
        state.pool.close_all().await;
        Ok(())
    }
}

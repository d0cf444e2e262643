// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Runtime configuration, resolved from the environment.
//!
//! The core consumes a deliberately small set of variables: worker
//! addresses, operational flags, and the policy file paths. Everything has
//! a development-friendly default so `majordomo serve` works out of the box.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Addresses of the out-of-process workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerUrls {
    pub llm: String,
    pub executor: String,
    pub connectors: String,
    pub learning: String,
}

impl Default for WorkerUrls {
    fn default() -> Self {
        Self {
            llm: "http://127.0.0.1:5001".to_string(),
            executor: "http://127.0.0.1:5002".to_string(),
            connectors: "http://127.0.0.1:5003".to_string(),
            learning: "http://127.0.0.1:5004".to_string(),
        }
    }
}

/// Agent-loop budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentBudgets {
    pub max_steps: usize,
    pub deadline_secs: u64,
    pub history_exchanges: usize,
}

impl Default for AgentBudgets {
    fn default() -> Self {
        Self {
            max_steps: 10,
            deadline_secs: 30,
            history_exchanges: 10,
        }
    }
}

/// Full core configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub host: String,
    pub port: u16,
    pub workers: WorkerUrls,
    /// Auto-approve confirmations. Development only; enabling it produces a
    /// prominent startup warning and marks every audit entry it touches.
    pub dev_mode: bool,
    pub audit_dir: PathBuf,
    pub audit_digest_budget: usize,
    pub fs_allowed_dirs: Vec<PathBuf>,
    pub fs_denied_dirs: Vec<PathBuf>,
    pub exec_whitelist_path: Option<PathBuf>,
    pub max_read_bytes: u64,
    pub max_write_bytes: u64,
    pub session_cap: usize,
    pub session_idle_secs: u64,
    pub confirm_timeout_secs: u64,
    pub worker_concurrency: usize,
    pub worker_queue: usize,
    pub worker_timeout_secs: u64,
    pub agent: AgentBudgets,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            workers: WorkerUrls::default(),
            dev_mode: false,
            audit_dir: PathBuf::from("data/logs/audit"),
            audit_digest_budget: 200,
            fs_allowed_dirs: vec![PathBuf::from("/tmp"), PathBuf::from("/data")],
            fs_denied_dirs: vec![
                PathBuf::from("/etc"),
                PathBuf::from("/sys"),
                PathBuf::from("/proc"),
                PathBuf::from("/boot"),
                PathBuf::from("/dev"),
            ],
            exec_whitelist_path: None,
            max_read_bytes: 10 * 1024 * 1024,
            max_write_bytes: 5 * 1024 * 1024,
            session_cap: 50,
            session_idle_secs: 24 * 60 * 60,
            confirm_timeout_secs: 30,
            worker_concurrency: 8,
            worker_queue: 32,
            worker_timeout_secs: 30,
            agent: AgentBudgets::default(),
        }
    }
}

impl CoreConfig {
    /// Build a configuration from the process environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("MAJORDOMO_HOST") {
            config.host = host;
        }
        if let Some(port) = env_parse("MAJORDOMO_PORT") {
            config.port = port;
        }

        if let Ok(url) = std::env::var("LLM_URL") {
            config.workers.llm = url;
        }
        if let Ok(url) = std::env::var("EXECUTOR_URL") {
            config.workers.executor = url;
        }
        if let Ok(url) = std::env::var("CONNECTORS_URL") {
            config.workers.connectors = url;
        }
        if let Ok(url) = std::env::var("LEARNING_URL") {
            config.workers.learning = url;
        }

        config.dev_mode = std::env::var("DEV_MODE")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        if let Ok(dir) = std::env::var("AUDIT_DIR") {
            config.audit_dir = PathBuf::from(dir);
        }
        if let Ok(dirs) = std::env::var("FS_ALLOWED_DIRS") {
            config.fs_allowed_dirs = split_paths(&dirs);
        }
        if let Ok(dirs) = std::env::var("FS_DENIED_DIRS") {
            config.fs_denied_dirs = split_paths(&dirs);
        }
        if let Ok(path) = std::env::var("EXEC_WHITELIST") {
            config.exec_whitelist_path = Some(PathBuf::from(path));
        }

        if let Some(steps) = env_parse("AGENT_MAX_STEPS") {
            config.agent.max_steps = steps;
        }
        if let Some(secs) = env_parse("AGENT_DEADLINE_SECS") {
            config.agent.deadline_secs = secs;
        }
        if let Some(secs) = env_parse("CONFIRM_TIMEOUT_SECS") {
            config.confirm_timeout_secs = secs;
        }

        config
    }

    pub fn agent_deadline(&self) -> Duration {
        Duration::from_secs(self.agent.deadline_secs)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_timeout_secs)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn split_paths(raw: &str) -> Vec<PathBuf> {
    raw.split(':')
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Worker-backed tools: connector applications, system info, and the
//! learning subsystem. Thin adapters over the Service Coordinator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::domain::tool::{ArgMap, ParamSpec, ParamType, ToolDescriptor, ToolError, ToolHandler};
use crate::infrastructure::coordinator::WorkerPool;

const REMOTE_TIMEOUT: Duration = Duration::from_secs(15);

fn required_str<'a>(args: &'a ArgMap, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::Validation(format!("Missing required parameter: {}", key)))
}

/// Store a fact in the learning worker's knowledge base.
pub struct LearnKnowledgeTool {
    pool: Arc<WorkerPool>,
}

impl LearnKnowledgeTool {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ToolHandler for LearnKnowledgeTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "learn_knowledge",
            "Store a fact in the assistant's knowledge base",
            "knowledge",
        )
        .with_param(
            "text",
            ParamSpec::required(ParamType::String, "The fact to remember"),
        )
    }

    async fn call(&self, args: ArgMap, _cancel: CancellationToken) -> Result<Value, ToolError> {
        let text = required_str(&args, "text")?;
        let response = self
            .pool
            .call_with(
                "learning",
                "/learn",
                Method::POST,
                Some(json!({ "text": text })),
                REMOTE_TIMEOUT,
                false,
            )
            .await
            .map_err(ToolError::from)?;

        Ok(json!({
            "learned": text,
            "worker": response,
        }))
    }
}

/// Open a desktop application through the connectors worker.
pub struct OpenAppTool {
    pool: Arc<WorkerPool>,
}

impl OpenAppTool {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ToolHandler for OpenAppTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new("open_app", "Open a desktop application", "apps")
            .with_param(
                "app_name",
                ParamSpec::required(ParamType::String, "Name of the application"),
            )
            .confirmed()
            .mutating()
    }

    async fn call(&self, args: ArgMap, _cancel: CancellationToken) -> Result<Value, ToolError> {
        let app_name = required_str(&args, "app_name")?;
        let response = self
            .pool
            .call_with(
                "connectors",
                "/apps/open",
                Method::POST,
                Some(json!({ "name": app_name })),
                REMOTE_TIMEOUT,
                false,
            )
            .await
            .map_err(ToolError::from)?;
        Ok(json!({ "app": app_name, "worker": response }))
    }
}

/// Close a desktop application through the connectors worker.
pub struct CloseAppTool {
    pool: Arc<WorkerPool>,
}

impl CloseAppTool {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ToolHandler for CloseAppTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new("close_app", "Close a running desktop application", "apps")
            .with_param(
                "app_name",
                ParamSpec::required(ParamType::String, "Name of the application"),
            )
            .confirmed()
            .mutating()
    }

    async fn call(&self, args: ArgMap, _cancel: CancellationToken) -> Result<Value, ToolError> {
        let app_name = required_str(&args, "app_name")?;
        let response = self
            .pool
            .call_with(
                "connectors",
                "/apps/close",
                Method::POST,
                Some(json!({ "name": app_name })),
                REMOTE_TIMEOUT,
                false,
            )
            .await
            .map_err(ToolError::from)?;
        Ok(json!({ "app": app_name, "worker": response }))
    }
}

/// List installed applications known to the connectors worker.
pub struct ListAppsTool {
    pool: Arc<WorkerPool>,
}

impl ListAppsTool {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ToolHandler for ListAppsTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new("list_apps", "List installed desktop applications", "apps")
    }

    async fn call(&self, _args: ArgMap, _cancel: CancellationToken) -> Result<Value, ToolError> {
        self.pool
            .call("connectors", "/apps/list", Method::GET, None, REMOTE_TIMEOUT)
            .await
            .map_err(ToolError::from)
    }
}

/// List currently running applications.
pub struct GetRunningAppsTool {
    pool: Arc<WorkerPool>,
}

impl GetRunningAppsTool {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ToolHandler for GetRunningAppsTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "get_running_apps",
            "List applications currently running",
            "apps",
        )
    }

    async fn call(&self, _args: ArgMap, _cancel: CancellationToken) -> Result<Value, ToolError> {
        self.pool
            .call(
                "connectors",
                "/apps/running",
                Method::GET,
                None,
                REMOTE_TIMEOUT,
            )
            .await
            .map_err(ToolError::from)
    }
}

/// Read-only system information from the connectors worker.
pub struct GetSystemInfoTool {
    pool: Arc<WorkerPool>,
}

impl GetSystemInfoTool {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ToolHandler for GetSystemInfoTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "get_system_info",
            "Report host system information (OS, CPU, memory)",
            "system",
        )
    }

    async fn call(&self, _args: ArgMap, _cancel: CancellationToken) -> Result<Value, ToolError> {
        self.pool
            .call("connectors", "/system/info", Method::GET, None, REMOTE_TIMEOUT)
            .await
            .map_err(ToolError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::coordinator::PoolLimits;

    async fn pool_with(server: &mockito::Server) -> Arc<WorkerPool> {
        let pool = Arc::new(WorkerPool::new(PoolLimits::default()));
        pool.register_worker("learning", &server.url()).await;
        pool.register_worker("connectors", &server.url()).await;
        pool
    }

    #[tokio::test]
    async fn test_learn_knowledge_posts_fact() {
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

        let pool = pool_with(&server).await;
        let tool = LearnKnowledgeTool::new(pool);

        let mut args = ArgMap::new();
        args.insert(
            "text".into(),
            "Paris est la capitale de la France".into(),
        );
        let result = tool.call(args, CancellationToken::new()).await.unwrap();
        assert_eq!(result["learned"], "Paris est la capitale de la France");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_learn_knowledge_worker_down() {
        let pool = Arc::new(WorkerPool::new(PoolLimits::default()));
        pool.register_worker("learning", "http://127.0.0.1:1").await;
        let tool = LearnKnowledgeTool::new(pool);

        let mut args = ArgMap::new();
        args.insert("text".into(), "fact".into());
        let err = tool.call(args, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::RemoteUnavailable(_)));
    }

    #[tokio::test]
    async fn test_close_app_calls_connectors() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/apps/close")
            .match_body(mockito::Matcher::Json(json!({"name": "Safari"})))
            .with_status(200)
            .with_body("{\"closed\":true}")
            .create_async()
            .await;

        let pool = pool_with(&server).await;
        let tool = CloseAppTool::new(pool);

        let mut args = ArgMap::new();
        args.insert("app_name".into(), "Safari".into());
        let result = tool.call(args, CancellationToken::new()).await.unwrap();
        assert_eq!(result["app"], "Safari");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_descriptors_flag_confirmation() {
        let pool = Arc::new(WorkerPool::new(PoolLimits::default()));
        assert!(CloseAppTool::new(pool.clone()).descriptor().requires_confirmation);
        assert!(OpenAppTool::new(pool.clone()).descriptor().requires_confirmation);
        assert!(!LearnKnowledgeTool::new(pool.clone()).descriptor().requires_confirmation);
        assert!(!GetSystemInfoTool::new(pool).descriptor().requires_confirmation);
    }
}

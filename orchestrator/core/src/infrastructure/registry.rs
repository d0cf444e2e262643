// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Tool Registry - typed catalog of callable capabilities.
//!
//! Many readers, rare writer: the catalog sits behind an async `RwLock` and
//! registered descriptors are immutable (replacement requires
//! unregister-then-register). `invoke` is the sole call path into handlers:
//! it validates arguments against the schema, then runs the handler under
//! the caller's deadline and cancellation signal.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::tool::{validate_args, ArgMap, ToolDescriptor, ToolError, ToolHandler};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("Tool '{0}' not found")]
    UnknownTool(String),
}

struct RegisteredTool {
    descriptor: ToolDescriptor,
    handler: Arc<dyn ToolHandler>,
}

/// The catalog. Iteration order is the tool name order, so `describe()` and
/// `catalog_prompt()` are deterministic.
pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, RegisteredTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(BTreeMap::new()),
        }
    }

    /// Insert a handler under its descriptor's name.
    pub async fn register(&self, handler: Arc<dyn ToolHandler>) -> Result<(), RegistryError> {
        let descriptor = handler.descriptor();
        let mut tools = self.tools.write().await;
        if tools.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateTool(descriptor.name));
        }
        debug!(tool = %descriptor.name, category = %descriptor.category, "Tool registered");
        tools.insert(
            descriptor.name.clone(),
            RegisteredTool {
                descriptor,
                handler,
            },
        );
        Ok(())
    }

    /// Remove a tool. Unregistering a missing name signals `UnknownTool` in
    /// this build.
    pub async fn unregister(&self, name: &str) -> Result<(), RegistryError> {
        let mut tools = self.tools.write().await;
        match tools.remove(name) {
            Some(_) => {
                debug!(tool = %name, "Tool unregistered");
                Ok(())
            }
            None => Err(RegistryError::UnknownTool(name.to_string())),
        }
    }

    pub async fn descriptor(&self, name: &str) -> Option<ToolDescriptor> {
        let tools = self.tools.read().await;
        tools.get(name).map(|t| t.descriptor.clone())
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    /// Deterministic listing of the catalog, name order.
    pub async fn describe(&self) -> Vec<ToolDescriptor> {
        let tools = self.tools.read().await;
        tools.values().map(|t| t.descriptor.clone()).collect()
    }

    /// The catalog rendered for the planner prompt.
    pub async fn catalog_prompt(&self) -> String {
        let tools = self.tools.read().await;
        if tools.is_empty() {
            return "No tools available.".to_string();
        }
        let mut prompt = String::from("Available tools:\n\n");
        for tool in tools.values() {
            prompt.push_str(&format!(
                "- {}\n  {}\n",
                tool.descriptor.signature(),
                tool.descriptor.description
            ));
        }
        prompt
    }

    /// Validate arguments and run the handler under `deadline`. The only
    /// path by which handlers execute.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: &ArgMap,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<Value, ToolError> {
        let (handler, validated) = {
            let tools = self.tools.read().await;
            let tool = tools
                .get(name)
                .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
            let validated = validate_args(&tool.descriptor, arguments)?;
            (tool.handler.clone(), validated)
        };

        if cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }
        if Instant::now() >= deadline {
            return Err(ToolError::Timeout);
        }

        tokio::select! {
            _ = cancel.cancelled() => Err(ToolError::Cancelled),
            outcome = tokio::time::timeout_at(deadline, handler.call(validated, cancel.clone())) => {
                match outcome {
                    Ok(result) => result,
                    Err(_) => Err(ToolError::Timeout),
                }
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

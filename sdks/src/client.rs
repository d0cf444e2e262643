// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::types::{CommandResponse, ErrorEnvelope, ExecResponse, HealthResponse, PendingRequest};

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{kind}: {message}")]
    Api {
        status: u16,
        kind: String,
        message: String,
    },
}

/// Client for interacting with the Majordomo orchestrator.
pub struct MajordomoClient {
    base_url: String,
    client: Client,
}

impl MajordomoClient {
    /// Create a new client for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// Submit an utterance and return the orchestrator's reply.
    pub async fn command(
        &self,
        text: &str,
        user_id: Option<&str>,
    ) -> Result<CommandResponse, SdkError> {
        let mut body = json!({ "text": text });
        if let Some(user_id) = user_id {
            body["user_id"] = json!(user_id);
        }
        let response = self
            .client
            .post(format!("{}/command", self.base_url))
            .json(&body)
            .send()
            .await?;
        Self::decode(response).await
    }

    /// Aggregate health of the orchestrator and its workers.
    pub async fn health(&self) -> Result<HealthResponse, SdkError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        Self::decode(response).await
    }

    /// Execute a whitelisted command through the safe-execution pipeline.
    pub async fn exec(
        &self,
        command: &str,
        args: &[String],
        timeout_secs: u64,
    ) -> Result<ExecResponse, SdkError> {
        let response = self
            .client
            .post(format!("{}/exec", self.base_url))
            .json(&json!({ "command": command, "args": args, "timeout": timeout_secs }))
            .send()
            .await?;
        Self::decode(response).await
    }

    /// List pending confirmation requests.
    pub async fn pending(&self) -> Result<Vec<PendingRequest>, SdkError> {
        let response = self
            .client
            .get(format!("{}/security/pending", self.base_url))
            .send()
            .await?;
        let value: Value = Self::decode(response).await?;
        let requests = value
            .get("requests")
            .and_then(|r| r.as_object())
            .map(|map| {
                map.values()
                    .filter_map(|v| serde_json::from_value(v.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();
        Ok(requests)
    }

    /// Resolve a pending confirmation.
    pub async fn confirm(&self, id: Uuid, approved: bool) -> Result<Value, SdkError> {
        let response = self
            .client
            .post(format!("{}/security/confirm/{}", self.base_url, id))
            .json(&json!({ "approved": approved }))
            .send()
            .await?;
        Self::decode(response).await
    }

    /// Fetch a session snapshot.
    pub async fn context(&self, user_id: &str) -> Result<Value, SdkError> {
        let response = self
            .client
            .get(format!("{}/context/{}", self.base_url, user_id))
            .send()
            .await?;
        Self::decode(response).await
    }

    /// Clear a session.
    pub async fn clear_context(&self, user_id: &str) -> Result<Value, SdkError> {
        let response = self
            .client
            .delete(format!("{}/context/{}", self.base_url, user_id))
            .send()
            .await?;
        Self::decode(response).await
    }

    /// Recent audit entries.
    pub async fn audit(&self, limit: usize) -> Result<Value, SdkError> {
        let response = self
            .client
            .get(format!("{}/security/audit?limit={}", self.base_url, limit))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, SdkError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let envelope: ErrorEnvelope = response.json().await.unwrap_or(ErrorEnvelope {
            error: format!("HTTP {}", status),
            kind: "Internal".to_string(),
        });
        Err(SdkError::Api {
            status: status.as_u16(),
            kind: envelope.kind,
            message: envelope.error,
        })
    }
}

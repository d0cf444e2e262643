// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Conversational state: utterances, exchanges, and bounded sessions.
//!
//! A `Session` exclusively owns its history. Timestamps are monotone within
//! a session and the FIFO never exceeds its configured capacity; the oldest
//! exchange is evicted first.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::react::ActionStatus;

pub const DEFAULT_HISTORY_CAP: usize = 50;

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("Utterance text must not be empty")]
    EmptyUtterance,
}

/// A single inbound user command. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utterance {
    pub id: Uuid,
    pub principal: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_session: Option<Uuid>,
}

impl Utterance {
    pub fn new(principal: &str, text: &str) -> Result<Self, ConversationError> {
        if text.trim().is_empty() {
            return Err(ConversationError::EmptyUtterance);
        }
        Ok(Self {
            id: Uuid::new_v4(),
            principal: principal.to_string(),
            text: text.to_string(),
            received_at: Utc::now(),
            channel: None,
            parent_session: None,
        })
    }
}

/// Flat record of one tool call inside an exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub tool_name: String,
    pub status: ActionStatus,
    pub duration_ms: u64,
}

/// One user/assistant turn with any tool calls it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exchange {
    pub ts: DateTime<Utc>,
    pub user_text: String,
    pub assistant_text: String,
    pub actions: Vec<ActionRecord>,
}

/// Role tag for prompt-formatted history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A role-tagged message handed to the planner prompt builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
    pub ts: DateTime<Utc>,
}

/// Per-principal conversation state: a bounded FIFO of exchanges plus a
/// free-form scratchpad of variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub principal: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    history: VecDeque<Exchange>,
    cap: usize,
    pub variables: HashMap<String, Value>,
}

impl Session {
    pub fn new(principal: &str, cap: usize) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            principal: principal.to_string(),
            created_at: now,
            last_updated: now,
            history: VecDeque::with_capacity(cap.min(64)),
            cap: cap.max(1),
            variables: HashMap::new(),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn history(&self) -> impl Iterator<Item = &Exchange> {
        self.history.iter()
    }

    /// Append an exchange, evicting the oldest entry at capacity and
    /// keeping timestamps monotone even under clock hiccups.
    pub fn push_exchange(
        &mut self,
        user_text: String,
        assistant_text: String,
        actions: Vec<ActionRecord>,
    ) {
        let now = Utc::now();
        let ts = self
            .history
            .back()
            .map(|last| now.max(last.ts))
            .unwrap_or(now);

        if self.history.len() == self.cap {
            self.history.pop_front();
        }
        self.history.push_back(Exchange {
            ts,
            user_text,
            assistant_text,
            actions,
        });
        self.last_updated = ts;
    }

    /// The most recent `max_exchanges` turns as role-tagged messages,
    /// oldest first (newest last).
    pub fn prompt_messages(&self, max_exchanges: usize) -> Vec<PromptMessage> {
        let skip = self.history.len().saturating_sub(max_exchanges);
        let mut messages = Vec::with_capacity((self.history.len() - skip) * 2);
        for exchange in self.history.iter().skip(skip) {
            messages.push(PromptMessage {
                role: Role::User,
                content: exchange.user_text.clone(),
                ts: exchange.ts,
            });
            messages.push(PromptMessage {
                role: Role::Assistant,
                content: exchange.assistant_text.clone(),
                ts: exchange.ts,
            });
        }
        messages
    }
}

/// Aggregates over a session, surfaced by the context API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    pub total_exchanges: usize,
    pub variables_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_exchange: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_exchange: Option<DateTime<Utc>>,
}

impl SessionStats {
    pub fn absent() -> Self {
        Self {
            exists: false,
            created_at: None,
            last_updated: None,
            total_exchanges: 0,
            variables_count: 0,
            first_exchange: None,
            last_exchange: None,
        }
    }

    pub fn of(session: &Session) -> Self {
        Self {
            exists: true,
            created_at: Some(session.created_at),
            last_updated: Some(session.last_updated),
            total_exchanges: session.len(),
            variables_count: session.variables.len(),
            first_exchange: session.history().next().map(|e| e.ts),
            last_exchange: session.history().last().map(|e| e.ts),
        }
    }
}

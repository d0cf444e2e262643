// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Conversational Context Store.
//!
//! Maps principals to bounded sessions. Appends are serialized per
//! principal behind a per-session mutex; there is no global lock across
//! principals. The store is process-local; persistence belongs to the
//! adaptive-learning workers, not the core.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::conversation::{
    ActionRecord, PromptMessage, Session, SessionStats,
};

pub struct ContextStore {
    sessions: DashMap<String, Arc<Mutex<Session>>>,
    cap: usize,
    idle_ttl: Duration,
}

impl ContextStore {
    pub fn new(cap: usize, idle_ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            cap,
            idle_ttl,
        }
    }

    /// Fetch a principal's session, creating it on first touch.
    pub fn get(&self, principal: &str) -> Arc<Mutex<Session>> {
        self.sessions
            .entry(principal.to_string())
            .or_insert_with(|| {
                debug!(principal = %principal, "Creating session");
                Arc::new(Mutex::new(Session::new(principal, self.cap)))
            })
            .clone()
    }

    pub async fn append_exchange(
        &self,
        principal: &str,
        user_text: String,
        assistant_text: String,
        actions: Vec<ActionRecord>,
    ) {
        let session = self.get(principal);
        let mut session = session.lock().await;
        session.push_exchange(user_text, assistant_text, actions);
    }

    /// Role-tagged history for the planner prompt, newest last.
    pub async fn format_history_for_prompt(
        &self,
        principal: &str,
        max_exchanges: usize,
    ) -> Vec<PromptMessage> {
        let session = self.get(principal);
        let session = session.lock().await;
        session.prompt_messages(max_exchanges)
    }

    pub async fn set_variable(&self, principal: &str, key: &str, value: Value) {
        let session = self.get(principal);
        let mut session = session.lock().await;
        session.variables.insert(key.to_string(), value);
        session.last_updated = Utc::now();
    }

    pub async fn get_variable(&self, principal: &str, key: &str) -> Option<Value> {
        let session = self.get(principal);
        let session = session.lock().await;
        session.variables.get(key).cloned()
    }

    /// Drop a principal's session entirely.
    pub fn clear(&self, principal: &str) -> bool {
        let removed = self.sessions.remove(principal).is_some();
        if removed {
            info!(principal = %principal, "Session cleared");
        }
        removed
    }

    pub async fn stats(&self, principal: &str) -> SessionStats {
        match self.sessions.get(principal) {
            Some(entry) => {
                let session = entry.value().clone();
                let session = session.lock().await;
                SessionStats::of(&session)
            }
            None => SessionStats::absent(),
        }
    }

    /// Serializable snapshot of a session for the context API.
    pub async fn snapshot(&self, principal: &str) -> Value {
        let session = self.get(principal);
        let session = session.lock().await;
        serde_json::to_value(&*session).unwrap_or(Value::Null)
    }

    /// Purge sessions idle past the TTL. Returns how many were dropped.
    pub async fn purge_idle(&self) -> usize {
        let ttl = match chrono::Duration::from_std(self.idle_ttl) {
            Ok(ttl) => ttl,
            Err(_) => return 0,
        };
        let cutoff = Utc::now() - ttl;

        let mut stale = Vec::new();
        for entry in self.sessions.iter() {
            if let Ok(session) = entry.value().try_lock() {
                if session.last_updated < cutoff {
                    stale.push(entry.key().clone());
                }
            }
        }
        for principal in &stale {
            self.sessions.remove(principal);
            debug!(principal = %principal, "Purged idle session");
        }
        stale.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::react::ActionStatus;

    fn store() -> ContextStore {
        ContextStore::new(50, Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_get_creates_on_first_touch() {
        let store = store();
        assert_eq!(store.session_count(), 0);
        let _ = store.get("u1");
        assert_eq!(store.session_count(), 1);

        // Second get returns the same session.
        store
            .append_exchange("u1", "hi".into(), "hello".into(), vec![])
            .await;
        let stats = store.stats("u1").await;
        assert_eq!(stats.total_exchanges, 1);
    }

    #[tokio::test]
    async fn test_history_formatting() {
        let store = store();
        store
            .append_exchange(
                "u1",
                "cherche les fichiers".into(),
                "voilà".into(),
                vec![ActionRecord {
                    tool_name: "search_files".into(),
                    status: ActionStatus::Success,
                    duration_ms: 12,
                }],
            )
            .await;

        let messages = store.format_history_for_prompt("u1", 10).await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "cherche les fichiers");
        assert_eq!(messages[1].content, "voilà");
    }

    #[tokio::test]
    async fn test_variables_roundtrip() {
        let store = store();
        store
            .set_variable("u1", "city", Value::String("Paris".into()))
            .await;
        assert_eq!(
            store.get_variable("u1", "city").await,
            Some(Value::String("Paris".into()))
        );
        assert_eq!(store.get_variable("u1", "missing").await, None);
    }

    #[tokio::test]
    async fn test_clear_removes_session() {
        let store = store();
        store
            .append_exchange("u1", "hi".into(), "hello".into(), vec![])
            .await;
        assert!(store.clear("u1"));
        assert!(!store.clear("u1"));
        assert!(!store.stats("u1").await.exists);
    }

    #[tokio::test]
    async fn test_sessions_isolated_by_principal() {
        let store = store();
        store
            .append_exchange("u1", "a".into(), "b".into(), vec![])
            .await;
        store
            .append_exchange("u2", "c".into(), "d".into(), vec![])
            .await;

        assert_eq!(store.stats("u1").await.total_exchanges, 1);
        assert_eq!(store.stats("u2").await.total_exchanges, 1);
        store.clear("u1");
        assert!(store.stats("u2").await.exists);
    }

    #[tokio::test]
    async fn test_purge_idle() {
        let store = ContextStore::new(50, Duration::from_millis(10));
        store
            .append_exchange("u1", "a".into(), "b".into(), vec![])
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let purged = store.purge_idle().await;
        assert_eq!(purged, 1);
        assert_eq!(store.session_count(), 0);
    }
}

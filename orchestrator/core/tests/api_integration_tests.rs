// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! End-to-end tests of the HTTP façade: command dispatch, the exec
//! endpoint's permission screen, context lifecycle, and the security
//! surface, exercised through the assembled axum router.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;

use majordomo_core::application::agent_loop::AgentLoop;
use majordomo_core::application::dispatcher::Dispatcher;
use majordomo_core::application::invocation::InvocationPipeline;
use majordomo_core::domain::path_guard::PathGuard;
use majordomo_core::domain::policy::PermissionEngine;
use majordomo_core::infrastructure::audit_log::AuditLog;
use majordomo_core::infrastructure::config::AgentBudgets;
use majordomo_core::infrastructure::confirmation::{BrokerMode, ConfirmationBroker};
use majordomo_core::infrastructure::context_store::ContextStore;
use majordomo_core::infrastructure::coordinator::{PoolLimits, WorkerPool};
use majordomo_core::infrastructure::exec_policy::CommandWhitelist;
use majordomo_core::infrastructure::planner::{Planner, PlannerError};
use majordomo_core::infrastructure::registry::ToolRegistry;
use majordomo_core::infrastructure::tools::exec::RunTerminalTool;
use majordomo_core::infrastructure::tools::fs::SearchFilesTool;
use majordomo_core::infrastructure::tools::remote::{CloseAppTool, LearnKnowledgeTool};
use majordomo_core::presentation::api::{app, AppState};

struct ScriptedPlanner {
    script: Vec<String>,
    cursor: AtomicUsize,
}

impl ScriptedPlanner {
    fn new(script: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            script: script.iter().map(|s| s.to_string()).collect(),
            cursor: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(&self, _prompt: &str) -> Result<String, PlannerError> {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        self.script
            .get(index.min(self.script.len().saturating_sub(1)))
            .cloned()
            .ok_or_else(|| PlannerError::Unavailable("script exhausted".into()))
    }
}

struct DownPlanner;

#[async_trait]
impl Planner for DownPlanner {
    async fn plan(&self, _prompt: &str) -> Result<String, PlannerError> {
        Err(PlannerError::Unavailable("connection refused".into()))
    }
}

struct Harness {
    router: Router,
    state: Arc<AppState>,
    audit_dir: tempfile::TempDir,
    sandbox: tempfile::TempDir,
}

async fn harness(planner: Arc<dyn Planner>, workers: &[(&str, String)]) -> Harness {
    let pool = Arc::new(WorkerPool::new(PoolLimits::default()));
    for (name, url) in workers {
        pool.register_worker(name, url).await;
    }

    let sandbox = tempfile::tempdir().unwrap();
    let guard = Arc::new(PathGuard::new(vec![sandbox.path().to_path_buf()], vec![]));
    let permissions = Arc::new(PermissionEngine::default());
    let whitelist = Arc::new(CommandWhitelist::load_or_default(
        None,
        &permissions.policy().banned_commands,
    ));

    let registry = Arc::new(ToolRegistry::new());
    registry
        .register(Arc::new(SearchFilesTool::new(guard.clone())))
        .await
        .unwrap();
    registry
        .register(Arc::new(RunTerminalTool::new(
            whitelist,
            vec![sandbox.path().to_path_buf()],
        )))
        .await
        .unwrap();
    registry
        .register(Arc::new(LearnKnowledgeTool::new(pool.clone())))
        .await
        .unwrap();
    registry
        .register(Arc::new(CloseAppTool::new(pool.clone())))
        .await
        .unwrap();

    let audit_dir = tempfile::tempdir().unwrap();
    let audit = Arc::new(AuditLog::new(audit_dir.path()).unwrap());
    let broker = Arc::new(ConfirmationBroker::new(BrokerMode::Channel));

    let pipeline = Arc::new(InvocationPipeline::new(
        registry.clone(),
        permissions,
        broker.clone(),
        audit.clone(),
        Duration::from_secs(2),
        200,
    ));
    let agent = Arc::new(AgentLoop::new(
        planner,
        pipeline.clone(),
        registry,
        AgentBudgets::default(),
    ));
    let store = Arc::new(ContextStore::new(50, Duration::from_secs(3600)));
    let dispatcher = Arc::new(Dispatcher::new(store.clone(), agent, pipeline.clone(), 10));

    let state = Arc::new(AppState {
        dispatcher,
        pipeline,
        store,
        broker,
        pool,
        audit,
    });

    Harness {
        router: app(state.clone()),
        state,
        audit_dir,
        sandbox,
    }
}

async fn request(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(value) => builder.body(Body::from(value.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn test_exec_banned_verb_denied_with_audit() {
    let h = harness(ScriptedPlanner::new(&["Thought: x\nAnswer: y"]), &[]).await;

    let (status, body) = request(
        &h.router,
        "POST",
        "/exec",
        Some(json!({"command": "rm", "args": ["-rf", "/"], "timeout": 5})),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Command 'rm' not permitted");
    assert_eq!(body["kind"], "PermissionDenied");

    let entries = h.state.audit.recent(10).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].tool_name, "run_terminal");
    assert_eq!(
        serde_json::to_value(entries[0].status).unwrap(),
        json!("denied")
    );
    assert_eq!(serde_json::to_value(entries[0].risk).unwrap(), json!("critical"));
}

#[tokio::test]
async fn test_exec_whitelisted_command_runs() {
    let h = harness(ScriptedPlanner::new(&["Thought: x\nAnswer: y"]), &[]).await;

    // echo requires confirmation through run_terminal, so approve it.
    let router = h.router.clone();
    let exec = tokio::spawn(async move {
        request(
            &router,
            "POST",
            "/exec",
            Some(json!({"command": "echo", "args": ["bonjour"], "timeout": 5})),
        )
        .await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    let pending = h.state.broker.pending(None).await;
    assert_eq!(pending.len(), 1);
    h.state.broker.resolve(pending[0].id, true).await.unwrap();

    let (status, body) = exec.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["exit_code"], 0);
    assert!(body["stdout"].as_str().unwrap().contains("bonjour"));
    assert_eq!(body["command_executed"], "echo bonjour");
}

#[tokio::test]
async fn test_command_empty_text_rejected() {
    let h = harness(ScriptedPlanner::new(&["Thought: x\nAnswer: y"]), &[]).await;

    let (status, body) = request(
        &h.router,
        "POST",
        "/command",
        Some(json!({"text": "   ", "user_id": "u1"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "ValidationError");
}

#[tokio::test]
async fn test_command_learn_fact_roundtrip() {
    let mut server = mockito::Server::new_async().await;
    let learn = server
        .mock("POST", "/learn")
        .match_body(mockito::Matcher::Json(
            json!({"text": "Paris est la capitale de la France"}),
        ))
        .with_status(200)
        .with_body("{\"status\":\"success\"}")
        .create_async()
        .await;

    let planner = ScriptedPlanner::new(&[
        "Thought: The user wants me to remember a fact.\nAction: learn_knowledge(text=\"Paris est la capitale de la France\")",
        "Thought: Stored.\nAnswer: J'ai appris: Paris est la capitale de la France",
    ]);
    let h = harness(planner, &[("learning", server.url())]).await;

    let (status, body) = request(
        &h.router,
        "POST",
        "/command",
        Some(json!({
            "text": "retiens que Paris est la capitale de la France",
            "user_id": "u1"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(
        body["message"],
        "J'ai appris: Paris est la capitale de la France"
    );
    assert_eq!(body["actions_taken"], json!(["learn_knowledge"]));
    learn.assert_async().await;

    let entries = h.state.audit.recent(10).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        serde_json::to_value(entries[0].status).unwrap(),
        json!("success")
    );
}

#[tokio::test]
async fn test_command_multi_step_search_and_count() {
    let planner = ScriptedPlanner::new(&[
        "Thought: Search the python files first.\nAction: search_files(query=\"\", extension=\".py\", limit=100)",
        "Thought: Two files came back.\nAnswer: J'ai trouvé 2 fichiers.",
    ]);
    let h = harness(planner, &[]).await;

    let src = h.sandbox.path().join("src");
    std::fs::create_dir(&src).unwrap();
    std::fs::write(src.join("main.py"), "print()").unwrap();
    std::fs::write(src.join("util.py"), "print()").unwrap();
    std::fs::write(src.join("README.md"), "# docs").unwrap();

    let (status, body) = request(
        &h.router,
        "POST",
        "/command",
        Some(json!({
            "text": "cherche les fichiers python dans src/ puis compte-les",
            "user_id": "u1"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "J'ai trouvé 2 fichiers.");
    assert_eq!(body["actions_taken"], json!(["search_files"]));
    assert_eq!(body["data"]["steps"], 2);
}

#[tokio::test]
async fn test_command_planner_down_generic_fallback() {
    let h = harness(Arc::new(DownPlanner), &[]).await;

    let (status, body) = request(
        &h.router,
        "POST",
        "/command",
        Some(json!({"text": "ouvre Safari", "user_id": "u1"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["actions_taken"], json!(["fallback_generic"]));

    let (_, stats) = request(&h.router, "GET", "/stats", None).await;
    assert_eq!(stats["agent"]["planner_failures"], 1);
}

#[tokio::test]
async fn test_context_lifecycle() {
    let h = harness(ScriptedPlanner::new(&["Thought: x\nAnswer: Bonjour!"]), &[]).await;

    request(
        &h.router,
        "POST",
        "/command",
        Some(json!({"text": "salut", "user_id": "u7"})),
    )
    .await;

    let (status, body) = request(&h.router, "GET", "/context/u7", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], "u7");
    assert_eq!(body["context"]["history"].as_array().unwrap().len(), 1);

    let (status, body) = request(&h.router, "DELETE", "/context/u7", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("u7"));

    let (_, body) = request(&h.router, "GET", "/context/u7", None).await;
    assert_eq!(body["context"]["history"].as_array().unwrap().len(), 0);

    let (status, body) = request(
        &h.router,
        "POST",
        "/context",
        Some(json!({"user_id": "u7"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["created"], true);

    let (status, body) = request(&h.router, "POST", "/context", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "ValidationError");
}

#[tokio::test]
async fn test_health_reports_degraded_services() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/health")
        .with_status(200)
        .with_body("{\"status\":\"ok\"}")
        .create_async()
        .await;

    let h = harness(
        ScriptedPlanner::new(&["Thought: x\nAnswer: y"]),
        &[
            ("learning", server.url()),
            ("connectors", "http://127.0.0.1:1".to_string()),
        ],
    )
    .await;

    let (status, body) = request(&h.router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["services"]["learning"], true);
    assert_eq!(body["services"]["connectors"], false);
}

#[tokio::test]
async fn test_confirmation_endpoints_roundtrip() {
    let mut server = mockito::Server::new_async().await;
    let close = server
        .mock("POST", "/apps/close")
        .with_status(200)
        .with_body("{\"closed\":true}")
        .create_async()
        .await;

    let planner = ScriptedPlanner::new(&[
        "Thought: Close it.\nAction: close_app(app_name=\"Safari\")",
        "Thought: Done.\nAnswer: Safari est fermé.",
    ]);
    let h = harness(planner, &[("connectors", server.url())]).await;

    let router = h.router.clone();
    let command = tokio::spawn(async move {
        request(
            &router,
            "POST",
            "/command",
            Some(json!({"text": "ferme Safari", "user_id": "u1"})),
        )
        .await
    });

    // The confirmation shows up on the security surface.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let (status, body) = request(&h.router, "GET", "/security/pending", None).await;
    assert_eq!(status, StatusCode::OK);
    let requests = body["requests"].as_object().unwrap();
    assert_eq!(requests.len(), 1);
    let (id, info) = requests.iter().next().unwrap();
    assert_eq!(info["action"], "close_app");
    assert_eq!(info["risk"], "high");

    // Approve it; the command completes and the app closes.
    let (status, body) = request(
        &h.router,
        "POST",
        &format!("/security/confirm/{}", id),
        Some(json!({"approved": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let (_, body) = command.await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["actions_taken"], json!(["close_app"]));
    close.assert_async().await;

    // Re-delivery reports already-resolved, not a crash.
    let (status, _) = request(
        &h.router,
        "POST",
        &format!("/security/confirm/{}", id),
        Some(json!({"approved": true})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_tools_listing_is_deterministic() {
    let h = harness(ScriptedPlanner::new(&["Thought: x\nAnswer: y"]), &[]).await;

    let (status, first) = request(&h.router, "GET", "/tools", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["count"], 4);

    let (_, second) = request(&h.router, "GET", "/tools", None).await;
    assert_eq!(first, second);

    let names: Vec<&str> = first["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
}

#[tokio::test]
async fn test_confirm_unknown_id() {
    let h = harness(ScriptedPlanner::new(&["Thought: x\nAnswer: y"]), &[]).await;

    let (status, body) = request(
        &h.router,
        "POST",
        &format!("/security/confirm/{}", uuid::Uuid::new_v4()),
        Some(json!({"approved": true})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "ValidationError");

    let (status, _) = request(
        &h.router,
        "POST",
        "/security/confirm/not-a-uuid",
        Some(json!({"approved": true})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_security_audit_endpoint() {
    let h = harness(ScriptedPlanner::new(&["Thought: x\nAnswer: y"]), &[]).await;

    request(
        &h.router,
        "POST",
        "/exec",
        Some(json!({"command": "sudo", "args": ["ls"], "timeout": 5})),
    )
    .await;

    let (status, body) = request(&h.router, "GET", "/security/audit?limit=10", None).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["status"], "denied");

    let (status, body) = request(&h.router, "GET", "/security/report/default", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["total"], 1);
    assert_eq!(body["stats"]["by_risk"]["critical"], 1);

    // Keep the audit dir alive until the end of the test.
    assert!(h.audit_dir.path().exists());
}

//! Integration tests for the autoflow-web crate.
//!
//! Each test serves the router on an ephemeral port over an in-memory
//! service and talks to it with reqwest.

use std::sync::Arc;

use autoflow_runtime::{AppConfig, AutomationService, WebConfig};
use autoflow_web::WebServer;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

struct TestServer {
    base: String,
    client: reqwest::Client,
    _stop: oneshot::Sender<()>,
}

async fn spawn_server() -> TestServer {
    let service = Arc::new(AutomationService::in_memory(AppConfig::default()).unwrap());
    let server = WebServer::new(WebConfig::default(), service);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let (stop, stopped) = oneshot::channel::<()>();
    tokio::spawn(async move {
        server
            .serve(listener, async {
                let _ = stopped.await;
            })
            .await
            .unwrap();
    });
    TestServer {
        base,
        client: reqwest::Client::new(),
        _stop: stop,
    }
}

impl TestServer {
    async fn get(&self, path: &str) -> (u16, Value) {
        let res = self
            .client
            .get(format!("{}{path}", self.base))
            .send()
            .await
            .unwrap();
        (res.status().as_u16(), res.json().await.unwrap())
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let res = self
            .client
            .post(format!("{}{path}", self.base))
            .json(&body)
            .send()
            .await
            .unwrap();
        (res.status().as_u16(), res.json().await.unwrap())
    }
}

#[tokio::test]
async fn health_reports_catalog_and_drivers() {
    let s = spawn_server().await;
    let (code, body) = s.get("/api/health").await;
    assert_eq!(code, 200);
    assert_eq!(body["status"], "ok");
    assert!(body["templates"].as_u64().unwrap() >= 8);
    assert!(body["drivers"].as_u64().unwrap() >= 1);
    assert_eq!(body["scheduler_running"], false);
}

#[tokio::test]
async fn message_runs_a_workflow() {
    let s = spawn_server().await;
    let (code, body) = s
        .post(
            "/api/instances/agent1/s1/messages",
            json!({"message": "Send a welcome email to ops@example.com"}),
        )
        .await;
    assert_eq!(code, 200);
    assert_eq!(body["status"], "executed");
    assert_eq!(body["execution_result"]["status"], "completed");
    assert!(body["workflow_id"].is_string());

    let (_, listing) = s.get("/api/instances").await;
    assert_eq!(listing["data"][0]["agent_id"], "agent1");
}

#[tokio::test]
async fn manual_trigger_over_http() {
    let s = spawn_server().await;
    let (_, run) = s
        .post(
            "/api/instances/agent1/s1/messages",
            json!({"message": "Send a welcome email to ops@example.com"}),
        )
        .await;
    let workflow_id = run["workflow_id"].as_str().unwrap().to_string();

    let (code, created) = s
        .post(
            "/api/triggers",
            json!({"agent_id": "agent1", "workflow_id": workflow_id, "trigger_type": "manual"}),
        )
        .await;
    assert_eq!(code, 200, "{created}");
    let trigger_id = created["trigger_id"].as_str().unwrap().to_string();

    let (code, fired) = s
        .post(&format!("/api/triggers/{trigger_id}/fire"), json!({}))
        .await;
    assert_eq!(code, 200, "{fired}");
    assert_eq!(fired["status"], "executed");

    let (_, listed) = s.get("/api/agents/agent1/triggers").await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn bad_requests_are_client_errors() {
    let s = spawn_server().await;
    let (code, body) = s
        .post("/api/instances", json!({"agent_id": "", "session_id": "s1"}))
        .await;
    assert_eq!(code, 400);
    assert_eq!(body["status"], "error");

    let (code, _) = s
        .post(
            "/api/triggers",
            json!({"agent_id": "a", "workflow_id": "00000000-0000-0000-0000-000000000000", "trigger_type": "manual"}),
        )
        .await;
    assert_eq!(code, 400);

    let res = s
        .client
        .delete(format!("{}/api/instances/nobody/none", s.base))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 404);
}

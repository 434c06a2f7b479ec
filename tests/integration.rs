//! Integration tests driving the real [`parley::orchestrator::Orchestrator`]
//! against a mocked Ollama server (wiremock), exercising the actual wire
//! path end to end rather than an in-memory scripted provider.

use parley::config::CoreConfig;
use parley::orchestrator::Orchestrator;
use parley::provider::OllamaProvider;
use parley::session::{Role, Session};
use parley::tools::{file::ReadFileTool, ToolRegistry};
use parley::ui::NullUi;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ndjson(lines: &[serde_json::Value]) -> ResponseTemplate {
    let body = lines
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join("\n");
    ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson")
}

fn orchestrator_for(mock_uri: &str, registry: ToolRegistry) -> Orchestrator {
    let mut config = CoreConfig::default();
    config.provider_url = mock_uri.to_string();
    config.model = "nemotron-mini".to_string();
    let provider = Arc::new(OllamaProvider::new(
        config.provider_url.clone(),
        config.model.clone(),
        config.temperature,
        config.top_p,
    ));
    Orchestrator::new(config, registry, provider, Arc::new(NullUi))
}

#[tokio::test]
async fn plain_answer_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ndjson(&[json!({
            "message": {"role": "assistant", "content": "4"},
            "done": true,
            "prompt_eval_count": 12,
            "eval_count": 1
        })]))
        .mount(&server)
        .await;

    let orchestrator = orchestrator_for(&server.uri(), ToolRegistry::new());
    let mut session = Session::new();
    let result = orchestrator.process("What is 2+2?", &mut session).await.unwrap();

    assert!(result.success);
    assert_eq!(result.content, "4");
    assert_eq!(result.iterations, 1);
    assert_eq!(session.messages().len(), 2);
    assert_eq!(session.messages()[0].role, Role::User);
    assert_eq!(session.messages()[1].role, Role::Assistant);
}

#[tokio::test]
async fn tool_call_then_answer_round_trip() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("test.txt"), "hello world").unwrap();

    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ndjson(&[
            json!({
                "message": {
                    "role": "assistant",
                    "content": "Let me check that file.",
                    "tool_calls": [{
                        "function": {"name": "read_file", "arguments": {"path": "test.txt"}}
                    }]
                },
                "done": false
            }),
            json!({"message": {"role": "assistant", "content": ""}, "done": true}),
        ]))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ndjson(&[json!({
            "message": {"role": "assistant", "content": "The file contains: hello world"},
            "done": true
        })]))
        .mount(&server)
        .await;

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ReadFileTool::new(dir.path().to_path_buf())));

    let orchestrator = orchestrator_for(&server.uri(), registry);
    let mut session = Session::new();
    let result = orchestrator
        .process("Read test.txt and tell me what's in it.", &mut session)
        .await
        .unwrap();

    assert!(result.success);
    assert!(result.content.contains("hello world"));
    assert_eq!(result.iterations, 2);
    assert_eq!(result.tool_calls_made.len(), 1);
    assert_eq!(result.tool_calls_made[0].name, "read_file");

    let msgs = session.messages();
    assert_eq!(msgs[0].role, Role::User);
    assert_eq!(msgs[1].role, Role::Assistant);
    assert!(!msgs[1].tool_calls.is_empty());
    assert_eq!(msgs[2].role, Role::Tool);
    assert_eq!(msgs[2].tool_call_id, Some(msgs[1].tool_calls[0].id.clone()));
    assert!(session.scan_integrity().is_clean());
}

#[tokio::test]
async fn server_error_is_retried_and_recovers() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ndjson(&[json!({
            "message": {"role": "assistant", "content": "recovered"},
            "done": true
        })]))
        .mount(&server)
        .await;

    let orchestrator = orchestrator_for(&server.uri(), ToolRegistry::new());
    let mut session = Session::new();
    let result = orchestrator.process("go", &mut session).await.unwrap();

    assert!(result.success);
    assert_eq!(result.content, "recovered");
}

#[tokio::test]
async fn rate_limit_status_classified_and_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ndjson(&[json!({
            "message": {"role": "assistant", "content": "ok"},
            "done": true
        })]))
        .mount(&server)
        .await;

    let orchestrator = orchestrator_for(&server.uri(), ToolRegistry::new());
    let mut session = Session::new();
    let result = orchestrator.process("go", &mut session).await.unwrap();

    assert!(result.success);
    assert_eq!(result.content, "ok");
}

#[tokio::test]
async fn unknown_tool_name_from_model_yields_error_result_not_crash() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ndjson(&[json!({
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{"function": {"name": "teleport", "arguments": {}}}]
            },
            "done": true
        })]))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ndjson(&[json!({
            "message": {"role": "assistant", "content": "I can't do that, sorry."},
            "done": true
        })]))
        .mount(&server)
        .await;

    let orchestrator = orchestrator_for(&server.uri(), ToolRegistry::new());
    let mut session = Session::new();
    let result = orchestrator.process("teleport me", &mut session).await.unwrap();

    assert!(result.success);
    assert!(session.scan_integrity().is_clean());
}

//! LLM backend tests against a stub OpenAI-compatible server on localhost.

use std::path::Path;

use arena::{AgentCapability, AgentProfile, CapabilityError, JudgingCapability};
use arena_agents::{ArenaConfig, ChatClient, LlmAgent, LlmJudge};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Serve one request with `status` and `body`, handing the parsed request body back.
async fn stub_server(status: u16, body: Value) -> (String, oneshot::Receiver<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let (header_end, content_length) = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
                let length = headers
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .map(|v| v.trim().parse::<usize>().unwrap())
                    .unwrap_or(0);
                break (pos + 4, length);
            }
        };
        while buf.len() < header_end + content_length {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        let request: Value =
            serde_json::from_slice(&buf[header_end..header_end + content_length]).unwrap();
        let _ = tx.send(request);

        let payload = body.to_string();
        let reason = if status == 200 { "OK" } else { "Error" };
        let response = format!(
            "HTTP/1.1 {} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            reason,
            payload.len(),
            payload
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
    });

    (format!("http://{}/v1", addr), rx)
}

fn reply(content: &str) -> Value {
    json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
}

fn profile() -> AgentProfile {
    AgentProfile::new("Turbo_Tim", "Speed Freak", "llama3.1", "You optimize for raw speed.")
}

#[tokio::test]
async fn test_agent_generates_extracted_code() {
    let (url, request) =
        stub_server(200, reply("Here you go:\n```python\ndef solution(n):\n    return n << 1\n```")).await;
    let agent = LlmAgent::new(profile(), ChatClient::new(&url, "local").unwrap());

    let code = agent.generate("double n").await.unwrap();
    assert_eq!(code, "def solution(n):\n    return n << 1");

    let sent = request.await.unwrap();
    assert_eq!(sent["model"], "llama3.1");
    assert_eq!(sent["messages"][0]["role"], "system");
    assert_eq!(sent["messages"][0]["content"], "You optimize for raw speed.");
    assert!(sent["messages"][1]["content"]
        .as_str()
        .unwrap()
        .starts_with("PROBLEM: double n"));
}

#[tokio::test]
async fn test_agent_refine_sends_reference_and_critique() {
    let (url, request) = stub_server(200, reply("```python\ndef solution(n): return n*2\n```")).await;
    let agent = LlmAgent::new(profile(), ChatClient::new(&url, "local").unwrap());

    agent
        .refine(
            "double n",
            "def solution(n): return n+n",
            "def solution(n): return n<<1",
            "JUDGE'S CRITIQUE:\nAvoid addition.",
        )
        .await
        .unwrap();

    let sent = request.await.unwrap();
    let prompt = sent["messages"][1]["content"].as_str().unwrap();
    assert!(prompt.contains("def solution(n): return n+n"));
    assert!(prompt.contains("def solution(n): return n<<1"));
    assert!(prompt.contains("Avoid addition."));
}

#[tokio::test]
async fn test_backend_error_status() {
    let (url, _request) = stub_server(500, json!({"error": "model not loaded"})).await;
    let agent = LlmAgent::new(profile(), ChatClient::new(&url, "local").unwrap());
    let err = agent.generate("double n").await.unwrap_err();
    match err {
        CapabilityError::Backend(msg) => assert!(msg.contains("500"), "{}", msg),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_reply_is_an_error() {
    let (url, _request) = stub_server(200, json!({"choices": []})).await;
    let agent = LlmAgent::new(profile(), ChatClient::new(&url, "local").unwrap());
    assert_eq!(
        agent.generate("double n").await.unwrap_err(),
        CapabilityError::EmptyResponse
    );
}

#[tokio::test]
async fn test_judge_returns_raw_reply() {
    let raw = "Verdict follows. {\"winner\": \"Turbo_Tim\", \"critiques\": {}, \"reasoning\": \"fast\"}";
    let (url, request) = stub_server(200, reply(raw)).await;
    let judge = LlmJudge::new(
        AgentProfile::new("Judge", "Adjudicator", "gpt-4o", "Be strict."),
        ChatClient::new(&url, "sk-test").unwrap(),
    );
    assert_eq!(judge.ask("EVIDENCE").await.unwrap(), raw);
    let sent = request.await.unwrap();
    assert_eq!(sent["messages"][1]["content"], "EVIDENCE");
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_error() {
    // Bind then drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = ChatClient::new(&format!("http://{}/v1", addr), "local").unwrap();
    assert!(!client.is_reachable().await);
    let agent = LlmAgent::new(profile(), client);
    assert!(matches!(
        agent.generate("double n").await,
        Err(CapabilityError::Transport(_))
    ));
}

#[test]
fn test_roster_file_with_prompt_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("prompts")).unwrap();
    std::fs::write(dir.path().join("prompts/tim.txt"), "You optimize for raw speed.").unwrap();
    let roster = dir.path().join("agents_config.yaml");
    std::fs::write(
        &roster,
        r#"
agents:
  - name: Turbo_Tim
    role: Speed Freak
    model: llama3.1
    prompt_file: prompts/tim.txt
  - name: Minimal_Max
    role: Minimalist
    model: llama3.1
    personality: Fewest lines wins.
    tier: cloud
"#,
    )
    .unwrap();

    let config = ArenaConfig::load(&roster).unwrap();
    assert_eq!(config.agents[0].personality, "You optimize for raw speed.");
    assert_eq!(config.agents[1].tier, arena::ModelTier::Cloud);

    std::fs::remove_file(dir.path().join("prompts/tim.txt")).unwrap();
    let err = ArenaConfig::load(&roster).unwrap_err();
    assert!(err.to_string().contains("Turbo_Tim"));
    assert!(ArenaConfig::load(Path::new("/nonexistent/agents.yaml")).is_err());
}

#[test]
fn test_shipped_roster_loads() {
    let roster = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/agents_config.yaml");
    let config = ArenaConfig::load(roster).unwrap();
    let names: Vec<_> = config.agents.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Turbo_Tim", "Pythonic_Pete", "Hacker_Hank", "Minimal_Max"]
    );
    assert!(config.agents.iter().all(|a| !a.personality.trim().is_empty()));
    assert_eq!(config.judge.name, "Judge_Judy");
    assert_eq!(config.judge.tier, arena::ModelTier::Cloud);
    assert_eq!(config.settings.harness.repetitions, 100);
}

use std::sync::{Arc, Mutex};
use std::time::Duration;

use medic_core::{BackendConfig, ModelBackend, OllamaBackend, OpenAiBackend};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Serves one canned response per connection, in order, and records requests.
struct MockServer {
    base: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockServer {
    async fn start(responses: Vec<(u16, &'static str)>, delay: Option<Duration>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let captured = requests.clone();

        tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let request = read_request(&mut stream).await;
                captured.lock().unwrap().push(request);
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                let response = format!(
                    "HTTP/1.1 {status} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        Self {
            base: format!("http://{addr}"),
            requests,
        }
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

async fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let body_len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

const OLLAMA_REPLY: &str =
    r#"{"model":"llama3.2","message":{"role":"assistant","content":"def f():\n    return 1"},"done":true}"#;

const OPENAI_REPLY: &str =
    r#"{"id":"chatcmpl-1","choices":[{"index":0,"message":{"role":"assistant","content":"x = 1"}}]}"#;

#[tokio::test]
async fn ollama_probe_then_chat() {
    let server = MockServer::start(vec![(200, r#"{"models":[]}"#), (200, OLLAMA_REPLY)], None).await;
    let config = BackendConfig::defaults().with_ollama_host(&server.base);
    let backend = OllamaBackend::new(&config, Some("qwen2.5-coder")).unwrap();

    assert!(backend.is_available().await);
    let reply = backend.query("fix this").await;
    assert!(!reply.is_error(), "unexpected error: {reply}");
    assert_eq!(reply.as_str(), "def f():\n    return 1");

    let requests = server.requests();
    assert!(requests[0].starts_with("GET /api/tags"));
    assert!(requests[1].starts_with("POST /api/chat"));
    assert!(requests[1].contains(r#""model":"qwen2.5-coder""#));
    assert!(requests[1].contains(r#""stream":false"#));
    assert!(requests[1].contains("fix this"));
}

#[tokio::test]
async fn ollama_malformed_envelope_is_error_reply() {
    let server = MockServer::start(vec![(200, r#"{"unexpected":true}"#)], None).await;
    let config = BackendConfig::defaults().with_ollama_host(&server.base);
    let backend = OllamaBackend::new(&config, None).unwrap();

    let reply = backend.query("fix this").await;
    assert!(reply.is_error());
    assert!(reply.as_str().contains("unexpected response"));
}

#[tokio::test]
async fn ollama_server_error_status_is_unavailable() {
    let server = MockServer::start(vec![(500, r#"{"error":"boom"}"#)], None).await;
    let config = BackendConfig::defaults().with_ollama_host(&server.base);
    let backend = OllamaBackend::new(&config, None).unwrap();
    assert!(!backend.is_available().await);
}

#[tokio::test]
async fn ollama_slow_inference_times_out() {
    let server = MockServer::start(vec![(200, OLLAMA_REPLY)], Some(Duration::from_secs(3))).await;
    let config = BackendConfig::defaults().with_ollama_host(&server.base);
    let backend = OllamaBackend::new(&config, None)
        .unwrap()
        .with_query_timeout(Duration::from_millis(200));

    let reply = backend.query("fix this").await;
    assert!(reply.is_error());
    assert!(reply.as_str().contains("timed out"), "got: {reply}");
}

#[tokio::test]
async fn openai_sends_bearer_and_reads_choice() {
    let server = MockServer::start(vec![(200, OPENAI_REPLY)], None).await;
    let config = BackendConfig::defaults()
        .with_openai_base_url(&format!("{}/v1", server.base))
        .with_openai_key("sk-test");
    let backend = OpenAiBackend::new(&config, None).unwrap();

    let reply = backend.query("fix this").await;
    assert_eq!(reply.as_str(), "x = 1");

    let request = server.requests().remove(0);
    assert!(request.starts_with("POST /v1/chat/completions"));
    assert!(request.to_lowercase().contains("authorization: bearer sk-test"));
    assert!(request.contains(r#""model":"gpt-4.1-mini""#));
}

#[tokio::test]
async fn openai_error_status_embeds_code_and_body() {
    let server = MockServer::start(
        vec![(401, r#"{"error":{"message":"Incorrect API key"}}"#)],
        None,
    )
    .await;
    let config = BackendConfig::defaults()
        .with_openai_base_url(&server.base)
        .with_openai_key("sk-bad");
    let backend = OpenAiBackend::new(&config, None).unwrap();

    let reply = backend.query("fix this").await;
    assert!(reply.is_error());
    assert!(reply.as_str().starts_with("Error 401:"));
    assert!(reply.as_str().contains("Incorrect API key"));
}

#[tokio::test]
async fn openai_timeout_has_specific_message() {
    let server = MockServer::start(vec![(200, OPENAI_REPLY)], Some(Duration::from_secs(3))).await;
    let config = BackendConfig::defaults()
        .with_openai_base_url(&server.base)
        .with_openai_key("sk-test");
    let backend = OpenAiBackend::new(&config, None)
        .unwrap()
        .with_query_timeout(Duration::from_millis(200));

    let reply = backend.query("fix this").await;
    assert!(reply.is_error());
    assert!(reply.as_str().contains("timed out"), "got: {reply}");
}

#[tokio::test]
async fn openai_unreachable_is_connection_error() {
    let config = BackendConfig::defaults()
        .with_openai_base_url("http://127.0.0.1:9")
        .with_openai_key("sk-test");
    let backend = OpenAiBackend::new(&config, None).unwrap();

    let reply = backend.query("fix this").await;
    assert!(reply.is_error());
    assert!(reply.as_str().starts_with("Connection Error"));
}

// Groq chat-completions streaming client using reqwest-eventsource.
//
// Sends an OpenAI-compatible chat request with `stream: true` and parses the
// Server-Sent Events into `LlmEvent` variants that are forwarded over an mpsc
// channel to whoever is assembling the answer.

use dotsage_core::config::{Config, LlmConfig};
use dotsage_core::protocol::LlmEvent;
use futures_util::StreamExt;
use reqwest_eventsource::{Event, RequestBuilderExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Sentinel data payload that terminates an OpenAI-style stream.
const DONE_MARKER: &str = "[DONE]";

/// Message sent when no API key is configured.
pub const MISSING_KEY_MESSAGE: &str = "GROQ_API_KEY not set. Please create a .env file in the backend directory with: GROQ_API_KEY=your_key_here";

// ---------------------------------------------------------------------------
// GroqClient
// ---------------------------------------------------------------------------

/// Low-level chat-completions streaming client.
pub struct GroqClient {
    http: reqwest::Client,
    api_key: String,
    api_url: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl GroqClient {
    /// Create a client with the given API key and `[llm]` settings.
    pub fn new(api_key: String, settings: &LlmConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            api_url: settings.api_url.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send one system + user exchange and stream the response as
    /// `LlmEvent`s over `tx`.
    ///
    /// Exactly one terminal event (`Complete` or `Error`) is sent unless the
    /// receiver is dropped first, in which case the stream is abandoned.
    pub async fn stream_chat(
        &self,
        system: &str,
        user_content: &str,
        tx: mpsc::Sender<LlmEvent>,
    ) -> anyhow::Result<()> {
        if self.api_key.is_empty() {
            let _ = tx
                .send(LlmEvent::Error {
                    message: MISSING_KEY_MESSAGE.to_string(),
                })
                .await;
            return Ok(());
        }

        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": true,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user_content }
            ]
        });

        let request = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body);

        let mut es = match request.eventsource() {
            Ok(es) => es,
            Err(e) => {
                let _ = tx
                    .send(LlmEvent::Error {
                        message: format!("AI API error: failed to create event source: {e}"),
                    })
                    .await;
                return Ok(());
            }
        };

        let mut full_text = String::new();
        let mut input_tokens: u32 = 0;
        let mut output_tokens: u32 = 0;

        while let Some(event) = es.next().await {
            match event {
                Ok(Event::Open) => {
                    debug!("SSE connection opened");
                }
                Ok(Event::Message(msg)) => {
                    let data = msg.data.trim();
                    if data == DONE_MARKER {
                        debug!("[DONE] received, streaming complete");
                        es.close();
                        break;
                    }

                    if let Some((input, output)) = parse_usage(data) {
                        input_tokens = input;
                        output_tokens = output;
                        debug!(input_tokens, output_tokens, "usage reported");
                    }

                    if let Some(text) = parse_delta_content(data) {
                        if text.is_empty() {
                            continue;
                        }
                        full_text.push_str(&text);
                        if tx.send(LlmEvent::Token { text }).await.is_err() {
                            // Receiver dropped, nobody wants the rest.
                            es.close();
                            return Ok(());
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => {
                    es.close();
                    break;
                }
                Err(err) => {
                    warn!(?err, "SSE stream error");
                    let message = extract_error_message(&err);
                    let _ = tx.send(LlmEvent::Error { message }).await;
                    es.close();
                    return Ok(());
                }
            }
        }

        if full_text.is_empty() {
            let _ = tx
                .send(LlmEvent::Error {
                    message: "AI API error: No response from AI model".to_string(),
                })
                .await;
        } else {
            let _ = tx
                .send(LlmEvent::Complete {
                    full_text,
                    input_tokens,
                    output_tokens,
                })
                .await;
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LlmClient wrapper
// ---------------------------------------------------------------------------

/// High-level wrapper that can be either an active Groq client or disabled.
pub enum LlmClient {
    /// API key present, requests go upstream.
    Active(GroqClient),
    /// No API key configured; every request fails immediately.
    Disabled,
}

impl LlmClient {
    /// Returns `Active` if an API key is present in credentials, otherwise
    /// `Disabled`.
    pub fn from_config(config: &Config) -> Self {
        match &config.credentials.groq_api_key {
            Some(key) if !key.is_empty() => {
                LlmClient::Active(GroqClient::new(key.clone(), &config.llm))
            }
            _ => LlmClient::Disabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, LlmClient::Active(_))
    }

    /// Stream a chat, delegating to the inner `GroqClient` or immediately
    /// sending an error if disabled.
    pub async fn stream_chat(
        &self,
        system: &str,
        user_content: &str,
        tx: mpsc::Sender<LlmEvent>,
    ) -> anyhow::Result<()> {
        match self {
            LlmClient::Active(client) => client.stream_chat(system, user_content, tx).await,
            LlmClient::Disabled => {
                let _ = tx
                    .send(LlmEvent::Error {
                        message: MISSING_KEY_MESSAGE.to_string(),
                    })
                    .await;
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SSE JSON parsing helpers
// ---------------------------------------------------------------------------

/// Extract `choices[0].delta.content` from a chunk.
///
/// Expected shape: `{ "choices": [ { "index": 0, "delta": { "content": "..." } } ] }`
pub(crate) fn parse_delta_content(data: &str) -> Option<String> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}

/// Extract `(prompt_tokens, completion_tokens)` from a chunk carrying usage.
///
/// OpenAI puts usage at the top level; Groq nests it under `x_groq`.
pub(crate) fn parse_usage(data: &str) -> Option<(u32, u32)> {
    let v: Value = serde_json::from_str(data).ok()?;
    let usage = v
        .get("usage")
        .filter(|u| u.is_object())
        .or_else(|| v.get("x_groq")?.get("usage"))?;
    let prompt = usage.get("prompt_tokens")?.as_u64()?;
    let completion = usage.get("completion_tokens")?.as_u64()?;
    Some((prompt as u32, completion as u32))
}

/// Extract a human-readable error message from an SSE error.
fn extract_error_message(err: &reqwest_eventsource::Error) -> String {
    match err {
        reqwest_eventsource::Error::InvalidStatusCode(status, _response) => {
            format!("AI API error: API returned status {status}")
        }
        reqwest_eventsource::Error::Transport(e) => {
            format!("AI API error: network error: {e}")
        }
        other => format!("AI API error: {other}"),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use dotsage_core::config::{
        CredentialsConfig, DatabaseConfig, FeedConfig, QuestionsConfig, ServerConfig,
    };
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    // -- SSE JSON parsing tests --

    #[test]
    fn parse_delta_content_text() {
        let data = r#"{
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "choices": [ { "index": 0, "delta": { "content": "Hello" }, "finish_reason": null } ]
        }"#;
        assert_eq!(parse_delta_content(data), Some("Hello".to_string()));
    }

    #[test]
    fn parse_delta_role_only_chunk() {
        let data = r#"{ "choices": [ { "index": 0, "delta": { "role": "assistant" } } ] }"#;
        assert_eq!(parse_delta_content(data), None);
    }

    #[test]
    fn parse_delta_empty_choices() {
        let data = r#"{ "choices": [] }"#;
        assert_eq!(parse_delta_content(data), None);
    }

    #[test]
    fn parse_delta_invalid_json() {
        assert_eq!(parse_delta_content("{broken"), None);
    }

    #[test]
    fn parse_delta_unicode() {
        let data = r#"{ "choices": [ { "delta": { "content": "Polkadot (波卡)" } } ] }"#;
        let text = parse_delta_content(data).unwrap();
        assert!(text.contains('\u{6ce2}'));
    }

    #[test]
    fn parse_usage_top_level() {
        let data = r#"{ "choices": [], "usage": { "prompt_tokens": 42, "completion_tokens": 7 } }"#;
        assert_eq!(parse_usage(data), Some((42, 7)));
    }

    #[test]
    fn parse_usage_groq_extension() {
        let data = r#"{
            "choices": [ { "delta": {}, "finish_reason": "stop" } ],
            "x_groq": { "id": "req_1", "usage": { "prompt_tokens": 120, "completion_tokens": 480 } }
        }"#;
        assert_eq!(parse_usage(data), Some((120, 480)));
    }

    #[test]
    fn parse_usage_null_falls_back_to_groq() {
        let data = r#"{
            "usage": null,
            "x_groq": { "usage": { "prompt_tokens": 1, "completion_tokens": 2 } }
        }"#;
        assert_eq!(parse_usage(data), Some((1, 2)));
    }

    #[test]
    fn parse_usage_missing() {
        let data = r#"{ "choices": [ { "delta": { "content": "x" } } ] }"#;
        assert_eq!(parse_usage(data), None);
        assert_eq!(parse_usage("nope"), None);
    }

    // -- LlmClient::Disabled path --

    #[tokio::test]
    async fn disabled_client_sends_error_event() {
        let client = LlmClient::Disabled;
        let (tx, mut rx) = mpsc::channel(8);

        client
            .stream_chat("system", "user", tx)
            .await
            .expect("should not fail");

        let event = rx.recv().await.expect("should receive an event");
        assert_eq!(
            event,
            LlmEvent::Error {
                message: MISSING_KEY_MESSAGE.to_string(),
            }
        );
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn empty_api_key_sends_error_event() {
        let client = GroqClient::new(String::new(), &make_test_config(None).llm);
        let (tx, mut rx) = mpsc::channel(8);

        client.stream_chat("system", "user", tx).await.unwrap();

        let event = rx.recv().await.expect("should receive an event");
        assert!(matches!(event, LlmEvent::Error { .. }));
    }

    // -- LlmClient::from_config --

    #[test]
    fn from_config_with_api_key_returns_active() {
        let client = LlmClient::from_config(&make_test_config(Some("gsk_test".to_string())));
        assert!(client.is_enabled());
        match client {
            LlmClient::Active(c) => assert_eq!(c.model(), "llama-3.3-70b-versatile"),
            LlmClient::Disabled => panic!("expected active client"),
        }
    }

    #[test]
    fn from_config_without_api_key_returns_disabled() {
        let client = LlmClient::from_config(&make_test_config(None));
        assert!(matches!(client, LlmClient::Disabled));
    }

    #[test]
    fn from_config_with_empty_api_key_returns_disabled() {
        let client = LlmClient::from_config(&make_test_config(Some(String::new())));
        assert!(matches!(client, LlmClient::Disabled));
    }

    // -- Integration-style tests with a mock TCP server --

    /// Serve one canned HTTP response on a local port and return its URL.
    async fn serve_once(response: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = socket.read(&mut buf).await.unwrap_or(0);
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
            // Keep the connection alive briefly so the client can read everything.
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            String::from_utf8_lossy(&buf[..n]).into_owned()
        });

        (format!("http://{addr}/openai/v1/chat/completions"), task)
    }

    fn client_for(url: String) -> GroqClient {
        let mut settings = make_test_config(None).llm;
        settings.api_url = url;
        GroqClient::new("gsk_test".to_string(), &settings)
    }

    async fn collect(mut rx: mpsc::Receiver<LlmEvent>) -> Vec<LlmEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn mock_sse_server_full_flow() {
        let (url, server_task) = serve_once(concat!(
            "HTTP/1.1 200 OK\r\n",
            "Content-Type: text/event-stream\r\n",
            "Cache-Control: no-cache\r\n",
            "\r\n",
            "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\r\n",
            "\r\n",
            "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Shared\"}}]}\r\n",
            "\r\n",
            "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\" security\"}}]}\r\n",
            "\r\n",
            "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}],\"x_groq\":{\"usage\":{\"prompt_tokens\":15,\"completion_tokens\":7}}}\r\n",
            "\r\n",
            "data: [DONE]\r\n",
            "\r\n",
        ))
        .await;

        let client = client_for(url);
        let (tx, rx) = mpsc::channel(32);
        client
            .stream_chat("system prompt", "What is shared security?", tx)
            .await
            .unwrap();

        let events = collect(rx).await;
        let request = server_task.await.unwrap();

        assert!(request.starts_with("POST /openai/v1/chat/completions"));
        assert!(request.to_lowercase().contains("authorization: bearer gsk_test"));

        assert_eq!(events.len(), 3, "expected 2 tokens + 1 complete: {events:?}");
        assert_eq!(
            events[0],
            LlmEvent::Token {
                text: "Shared".to_string()
            }
        );
        assert_eq!(
            events[1],
            LlmEvent::Token {
                text: " security".to_string()
            }
        );
        assert_eq!(
            events[2],
            LlmEvent::Complete {
                full_text: "Shared security".to_string(),
                input_tokens: 15,
                output_tokens: 7,
            }
        );
    }

    #[tokio::test]
    async fn mock_sse_server_error_status() {
        let (url, server_task) = serve_once(concat!(
            "HTTP/1.1 401 Unauthorized\r\n",
            "Content-Type: application/json\r\n",
            "Content-Length: 41\r\n",
            "\r\n",
            "{\"error\":{\"message\":\"Invalid API Key\"}}\r\n",
        ))
        .await;

        let client = client_for(url);
        let (tx, rx) = mpsc::channel(8);
        client.stream_chat("system", "user", tx).await.unwrap();

        let events = collect(rx).await;
        let _ = server_task.await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            LlmEvent::Error { message } => {
                assert!(message.contains("401"), "should mention status: {message}");
            }
            other => panic!("Expected LlmEvent::Error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_without_content_is_an_error() {
        let (url, server_task) = serve_once(concat!(
            "HTTP/1.1 200 OK\r\n",
            "Content-Type: text/event-stream\r\n",
            "\r\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\r\n",
            "\r\n",
            "data: [DONE]\r\n",
            "\r\n",
        ))
        .await;

        let client = client_for(url);
        let (tx, rx) = mpsc::channel(8);
        client.stream_chat("system", "user", tx).await.unwrap();

        let events = collect(rx).await;
        let _ = server_task.await;

        assert_eq!(
            events,
            vec![LlmEvent::Error {
                message: "AI API error: No response from AI model".to_string()
            }]
        );
    }

    // -- Helper to build a minimal Config for testing --

    fn make_test_config(api_key: Option<String>) -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8788,
                public_url: "http://localhost:3000".to_string(),
            },
            feed: FeedConfig { port: 8789 },
            database: DatabaseConfig {
                path: ":memory:".to_string(),
            },
            llm: LlmConfig {
                model: "llama-3.3-70b-versatile".to_string(),
                api_url: "https://api.groq.com/openai/v1/chat/completions".to_string(),
                temperature: 0.7,
                max_tokens: 500,
            },
            questions: QuestionsConfig {
                recent_limit: 20,
                analytics_limit: 100,
            },
            credentials: CredentialsConfig {
                groq_api_key: api_key,
            },
        }
    }
}

//! Provider adapter contract (spec §6 "To the provider adapter") and a
//! bundled Ollama implementation.
//!
//! The orchestrator never speaks a vendor wire format directly — it calls
//! [`Provider::send_streaming`] and gets back a normalized
//! [`ProviderResponse`]. `error_type` is how the retry policy (C9)
//! classifies a failure without parsing vendor-specific error bodies.

use crate::session::{Message, Role, ToolCall};
use crate::tools::ToolDescriptor;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// The error classes a provider adapter is expected to distinguish so the
/// retry policy (C9) can apply the right strategy without inspecting
/// vendor-specific error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorType {
    RateLimit,
    ServerError,
    TokenLimitExceeded,
    MalformedToolJson,
    MessageStructureError,
    Auth,
    Other,
}

/// Token accounting the provider reports back, when available.
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Normalized result of one streaming call (spec §6).
#[derive(Debug, Clone, Default)]
pub struct ProviderResponse {
    pub content: String,
    /// Present when the provider's transport supports structured tool
    /// calls natively; `None` means the orchestrator should run the
    /// extractor (C3) over `content` instead.
    pub tool_calls: Option<Vec<ToolCall>>,
    pub usage: Option<Usage>,
    pub error: Option<String>,
    pub error_type: Option<ProviderErrorType>,
    pub retryable: bool,
    pub retry_after: Option<Duration>,
    pub failed_tool: Option<String>,
}

impl ProviderResponse {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Some(calls),
            ..Default::default()
        }
    }

    pub fn err(message: impl Into<String>, error_type: ProviderErrorType, retryable: bool) -> Self {
        Self {
            error: Some(message.into()),
            error_type: Some(error_type),
            retryable,
            ..Default::default()
        }
    }
}

/// Per-chunk streaming callbacks (spec §6 "To the UI"): `on_chunk` fires
/// for every piece of assistant text as it arrives, `on_tool_call` fires
/// the moment a tool call is recognized in the stream (before the tool
/// actually runs — a UI hint, not a dispatch signal), and `on_thinking`
/// carries any provider-native reasoning/thinking trace separately from
/// the final answer text.
pub struct StreamSink<'a> {
    pub on_chunk: &'a (dyn Fn(&str) + Send + Sync),
    pub on_tool_call: &'a (dyn Fn(&str) + Send + Sync),
    pub on_thinking: &'a (dyn Fn(&str) + Send + Sync),
}

/// Contract the orchestrator drives every iteration against (C11 S2).
/// Implementations own their own HTTP/SSE plumbing; the core only ever
/// sees [`ProviderResponse`].
#[async_trait]
pub trait Provider: Send + Sync {
    async fn send_streaming(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
        sink: StreamSink<'_>,
    ) -> ProviderResponse;

    /// Whether this provider's wire format has a native `role=tool`
    /// channel (spec §3 invariant 2, §4.7 alternation enforcement). Ollama
    /// does; providers that don't must have their tool messages rewritten
    /// to `user` by the sanitizer before every send.
    fn supports_tool_role(&self) -> bool {
        true
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn message_to_json(msg: &Message) -> Value {
    let mut obj = json!({
        "role": role_str(msg.role),
        "content": msg.content,
    });
    let map = obj.as_object_mut().unwrap();
    if !msg.tool_calls.is_empty() {
        let calls: Vec<Value> = msg
            .tool_calls
            .iter()
            .map(|tc| {
                let args: Value = serde_json::from_str(&tc.arguments).unwrap_or(Value::Null);
                json!({ "function": { "name": tc.name, "arguments": args } })
            })
            .collect();
        map.insert("tool_calls".to_string(), Value::Array(calls));
    }
    obj
}

fn tool_descriptor_to_json(tool: &ToolDescriptor) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

/// Concrete adapter for a local Ollama server's `/api/chat` endpoint —
/// the one provider this crate ships so the orchestrator is runnable and
/// testable against a real wire path, not just an in-memory mock.
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    top_p: f32,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, temperature: f32, top_p: f32) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            temperature,
            top_p,
        }
    }

    fn classify_http_error(status: reqwest::StatusCode, body: &str) -> ProviderResponse {
        let message = format!("ollama request failed ({status}): {body}");
        if status.as_u16() == 429 {
            ProviderResponse::err(message, ProviderErrorType::RateLimit, true)
        } else if status.is_server_error() {
            ProviderResponse::err(message, ProviderErrorType::ServerError, true)
        } else if status.as_u16() == 401 || status.as_u16() == 403 {
            ProviderResponse::err(message, ProviderErrorType::Auth, false)
        } else if body.to_lowercase().contains("context") && body.to_lowercase().contains("length") {
            ProviderResponse::err(message, ProviderErrorType::TokenLimitExceeded, true)
        } else {
            ProviderResponse::err(message, ProviderErrorType::Other, false)
        }
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn send_streaming(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
        sink: StreamSink<'_>,
    ) -> ProviderResponse {
        let body = json!({
            "model": self.model,
            "messages": messages.iter().map(message_to_json).collect::<Vec<_>>(),
            "tools": tools.iter().map(tool_descriptor_to_json).collect::<Vec<_>>(),
            "stream": true,
            "options": {
                "temperature": self.temperature,
                "top_p": self.top_p,
            }
        });

        let url = format!("{}/api/chat", self.base_url);
        let response = match self.client.post(&url).json(&body).send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return ProviderResponse::err(
                    format!("ollama request timed out: {e}"),
                    ProviderErrorType::ServerError,
                    true,
                );
            }
            Err(e) => {
                return ProviderResponse::err(
                    format!("ollama request failed: {e}"),
                    ProviderErrorType::ServerError,
                    true,
                );
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Self::classify_http_error(status, &text);
        }

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        let mut saw_tool_calls = false;

        use futures::StreamExt;
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    return ProviderResponse::err(
                        format!("ollama stream error: {e}"),
                        ProviderErrorType::ServerError,
                        true,
                    );
                }
            };
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].to_string();
                buffer.drain(..=pos);
                if line.trim().is_empty() {
                    continue;
                }
                let Ok(parsed) = serde_json::from_str::<Value>(&line) else {
                    continue;
                };

                if let Some(msg) = parsed.get("message") {
                    if let Some(c) = msg.get("content").and_then(|v| v.as_str()) {
                        if !c.is_empty() {
                            (sink.on_chunk)(c);
                            content.push_str(c);
                        }
                    }
                    if let Some(thinking) = msg.get("thinking").and_then(|v| v.as_str()) {
                        if !thinking.is_empty() {
                            (sink.on_thinking)(thinking);
                        }
                    }
                    if let Some(calls) = msg.get("tool_calls").and_then(|v| v.as_array()) {
                        for call in calls {
                            let Some(func) = call.get("function") else { continue };
                            let name = func.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string();
                            let arguments = func.get("arguments").cloned().unwrap_or_else(|| json!({}));
                            (sink.on_tool_call)(&name);
                            tool_calls.push(ToolCall {
                                id: format!("call_{}", uuid::Uuid::new_v4().simple()),
                                name,
                                arguments: arguments.to_string(),
                            });
                        }
                        saw_tool_calls = true;
                    }
                }

                if parsed.get("done").and_then(|v| v.as_bool()).unwrap_or(false) {
                    let usage = Usage {
                        prompt_tokens: parsed.get("prompt_eval_count").and_then(|v| v.as_u64()).unwrap_or(0),
                        completion_tokens: parsed.get("eval_count").and_then(|v| v.as_u64()).unwrap_or(0),
                    };
                    return ProviderResponse {
                        content,
                        tool_calls: saw_tool_calls.then_some(tool_calls),
                        usage: Some(usage),
                        ..Default::default()
                    };
                }
            }
        }

        ProviderResponse {
            content,
            tool_calls: saw_tool_calls.then_some(tool_calls),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_rate_limit() {
        let resp = OllamaProvider::classify_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert_eq!(resp.error_type, Some(ProviderErrorType::RateLimit));
        assert!(resp.retryable);
    }

    #[test]
    fn classify_server_error() {
        let resp = OllamaProvider::classify_http_error(reqwest::StatusCode::BAD_GATEWAY, "oops");
        assert_eq!(resp.error_type, Some(ProviderErrorType::ServerError));
        assert!(resp.retryable);
    }

    #[test]
    fn classify_auth_error_is_not_retryable() {
        let resp = OllamaProvider::classify_http_error(reqwest::StatusCode::UNAUTHORIZED, "bad key");
        assert_eq!(resp.error_type, Some(ProviderErrorType::Auth));
        assert!(!resp.retryable);
    }

    #[test]
    fn classify_context_length_as_token_limit() {
        let resp = OllamaProvider::classify_http_error(
            reqwest::StatusCode::BAD_REQUEST,
            "prompt exceeds context length",
        );
        assert_eq!(resp.error_type, Some(ProviderErrorType::TokenLimitExceeded));
    }

    #[test]
    fn message_to_json_includes_tool_calls() {
        let msg = Message::assistant_with_tool_calls(
            "",
            vec![ToolCall {
                id: "c1".into(),
                name: "read_file".into(),
                arguments: r#"{"path":"a.rs"}"#.into(),
            }],
        );
        let v = message_to_json(&msg);
        assert_eq!(v["tool_calls"][0]["function"]["name"], "read_file");
    }
}

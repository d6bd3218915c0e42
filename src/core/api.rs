use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;

// ── Types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccumulatedToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: ToolCallFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Default)]
pub struct StreamResult {
    pub content: String,
    pub tool_calls: Vec<AccumulatedToolCall>,
    pub usage: Usage,
    pub finish_reason: String,
}

/// Accumulation state for one streamed completion.
#[derive(Debug, Default)]
struct ChunkState {
    content: String,
    tool_calls: HashMap<usize, AccumulatedToolCall>,
    usage: Usage,
    finish_reason: String,
    error: Option<String>,
}

impl ChunkState {
    fn into_result(self) -> StreamResult {
        let mut entries: Vec<(usize, AccumulatedToolCall)> = self.tool_calls.into_iter().collect();
        entries.sort_by_key(|(k, _)| *k);
        StreamResult {
            content: self.content,
            tool_calls: entries.into_iter().map(|(_, v)| v).collect(),
            usage: self.usage,
            finish_reason: self.finish_reason,
        }
    }
}

// ── Client ──────────────────────────────────────────────────────────────

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct ChatApiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl ChatApiClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn headers(&self) -> Result<HeaderMap, EngineError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| EngineError::Other(format!("invalid API key: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Stream a chat completion. Content fragments are sent on `fragment_tx`
    /// as they arrive; the accumulated result is returned at the end.
    pub async fn stream_chat(
        &self,
        model: &str,
        messages: &[Value],
        tools: Option<&[Value]>,
        fragment_tx: &mpsc::UnboundedSender<String>,
        cancel: &CancellationToken,
    ) -> Result<StreamResult, EngineError> {
        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": true,
        });

        if let Some(tools) = tools {
            if !tools.is_empty() {
                body["tools"] = serde_json::json!(tools);
                body["tool_choice"] = serde_json::json!("auto");
            }
        }

        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(%url, model, messages = messages.len(), "requesting completion");
        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|json| parse_api_error(&json))
                .unwrap_or(text);
            return Err(EngineError::Api { status, message });
        }

        let mut state = ChunkState::default();
        let mut chunk_count: u64 = 0;
        let mut stream = response.bytes_stream();

        let mut lines = SseLineBuffer::default();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("completion cancelled");
                    break;
                }
                chunk = stream.next() => {
                    match chunk {
                        Some(Ok(bytes)) => {
                            for line in lines.push(&bytes) {
                                let Some(data) = sse_data(&line) else {
                                    continue;
                                };
                                if data == "[DONE]" {
                                    continue;
                                }
                                if let Ok(chunk_json) = serde_json::from_str::<Value>(data) {
                                    chunk_count += 1;
                                    if let Some(fragment) = process_chunk(&chunk_json, &mut state) {
                                        let _ = fragment_tx.send(fragment);
                                    }
                                }
                            }
                            if let Some(message) = state.error.take() {
                                return Err(EngineError::Stream(message));
                            }
                        }
                        Some(Err(e)) => return Err(EngineError::Stream(e.to_string())),
                        None => break,
                    }
                }
            }
        }

        if chunk_count == 0 && !cancel.is_cancelled() {
            return Err(EngineError::Stream(
                "no response received from API (0 chunks)".to_string(),
            ));
        }

        let result = state.into_result();
        tracing::debug!(
            chunks = chunk_count,
            tool_calls = result.tool_calls.len(),
            finish_reason = %result.finish_reason,
            total_tokens = result.usage.total_tokens,
            "completion finished"
        );
        Ok(result)
    }
}

/// Splits a byte stream into SSE lines. Bytes are held until their line is
/// complete, so a multi-byte character split across network chunks decodes
/// intact.
#[derive(Debug, Default)]
struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    /// Append `bytes` and return every line completed by them, without the
    /// line terminator.
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw[..end]);
            lines.push(line.trim_end_matches('\r').to_string());
        }
        lines
    }
}

/// Payload of an SSE `data:` line, if this is one.
fn sse_data(line: &str) -> Option<&str> {
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    line.strip_prefix("data:").map(str::trim)
}

/// Best-effort message from an error body. Providers disagree on the shape.
fn parse_api_error(data: &Value) -> Option<String> {
    match data.get("error") {
        Some(Value::String(msg)) => Some(msg.clone()),
        Some(err) => err
            .get("message")
            .or_else(|| err.get("msg"))
            .and_then(|v| v.as_str())
            .map(str::to_string),
        None => data
            .get("message")
            .or_else(|| data.get("detail"))
            .and_then(|v| v.as_str())
            .map(str::to_string),
    }
}

/// Fold one SSE chunk into `state`. Returns the content delta, if any.
fn process_chunk(chunk: &Value, state: &mut ChunkState) -> Option<String> {
    if let Some(u) = chunk.get("usage").filter(|u| u.is_object()) {
        state.usage = Usage {
            prompt_tokens: u.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
            completion_tokens: u
                .get("completion_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            total_tokens: u.get("total_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
        };
    }

    if chunk.get("error").is_some() {
        let msg = parse_api_error(chunk).unwrap_or_else(|| "unknown API error".to_string());
        state.error = Some(format!("API error: {}", msg));
        return None;
    }

    let choice = chunk.get("choices").and_then(|c| c.get(0))?;

    if let Some(fr) = choice.get("finish_reason").and_then(|v| v.as_str()) {
        state.finish_reason = fr.to_string();
    }

    let delta = choice.get("delta")?;

    if let Some(tcs) = delta.get("tool_calls").and_then(|v| v.as_array()) {
        for tc in tcs {
            let idx = tc.get("index").and_then(|v| v.as_u64()).unwrap_or(0) as usize;

            let entry = state.tool_calls.entry(idx).or_insert_with(|| AccumulatedToolCall {
                id: String::new(),
                call_type: "function".to_string(),
                function: ToolCallFunction {
                    name: String::new(),
                    arguments: String::new(),
                },
            });

            if let Some(id) = tc.get("id").and_then(|v| v.as_str()) {
                entry.id = id.to_string();
            }
            if let Some(func) = tc.get("function") {
                if let Some(name) = func.get("name").and_then(|v| v.as_str()) {
                    entry.function.name = name.to_string();
                }
                if let Some(args) = func.get("arguments").and_then(|v| v.as_str()) {
                    entry.function.arguments.push_str(args);
                }
            }
        }
    }

    let content = delta.get("content").and_then(|v| v.as_str())?;
    if content.is_empty() {
        return None;
    }
    state.content.push_str(content);
    Some(content.to_string())
}

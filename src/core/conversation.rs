use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::api::{AccumulatedToolCall, ChatApiClient};
use super::engine::{Conversation, FragmentStream, Model, ModelClient};
use super::Turn;
use crate::error::EngineError;
use crate::tools::{ToolExecutionResult, ToolRef};

/// One entry of the model table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub id: String,
    pub model_name: String,
    pub api_base: String,
    pub api_key: Option<String>,
    pub supports_tools: bool,
}

/// Resolves model ids against a fixed table of OpenAI-compatible endpoints.
pub struct HttpModelClient {
    models: Vec<ModelSpec>,
}

impl HttpModelClient {
    pub fn new(models: Vec<ModelSpec>) -> Self {
        Self { models }
    }
}

impl ModelClient for HttpModelClient {
    fn resolve(&self, model_id: &str) -> Result<Arc<dyn Model>, EngineError> {
        let spec = self
            .models
            .iter()
            .find(|m| m.id == model_id)
            .ok_or_else(|| EngineError::UnknownModel(model_id.to_string()))?;
        Ok(Arc::new(HttpModel {
            api: ChatApiClient::new(&spec.api_base, spec.api_key.clone()),
            spec: spec.clone(),
        }))
    }
}

struct HttpModel {
    spec: ModelSpec,
    api: ChatApiClient,
}

impl Model for HttpModel {
    fn id(&self) -> &str {
        &self.spec.id
    }

    fn open(&self, capabilities: &[ToolRef]) -> Box<dyn Conversation> {
        let tools = if self.spec.supports_tools {
            capabilities.to_vec()
        } else {
            Vec::new()
        };
        Box::new(HttpConversation {
            api: self.api.clone(),
            model_name: self.spec.model_name.clone(),
            tools: Arc::new(tools),
            state: Arc::new(Mutex::new(ConversationState::default())),
        })
    }
}

#[derive(Default)]
struct ConversationState {
    /// API messages, without the system prompt.
    history: Vec<Value>,
    turns: Vec<Turn>,
}

/// A live chat against one endpoint. Each submission runs in a spawned task;
/// dropping the returned stream cancels it.
struct HttpConversation {
    api: ChatApiClient,
    model_name: String,
    tools: Arc<Vec<ToolRef>>,
    state: Arc<Mutex<ConversationState>>,
}

impl Conversation for HttpConversation {
    fn submit(&mut self, text: &str, system_prompt: Option<&str>) -> FragmentStream {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.turns.push(Turn::user(text));
            state
                .history
                .push(serde_json::json!({ "role": "user", "content": text }));
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let exchange = Exchange {
            api: self.api.clone(),
            model_name: self.model_name.clone(),
            tools: self.tools.clone(),
            state: self.state.clone(),
            system_prompt: system_prompt.map(str::to_string),
            cancel: cancel.clone(),
        };
        tokio::spawn(exchange.run(tx));

        let guard = cancel.drop_guard();
        stream::poll_fn(move |cx| {
            let _cancel_on_drop = &guard;
            rx.poll_recv(cx)
        })
        .boxed()
    }

    fn turns(&self) -> Vec<Turn> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .turns
            .clone()
    }
}

struct Exchange {
    api: ChatApiClient,
    model_name: String,
    tools: Arc<Vec<ToolRef>>,
    state: Arc<Mutex<ConversationState>>,
    system_prompt: Option<String>,
    cancel: CancellationToken,
}

impl Exchange {
    fn messages(&self) -> Vec<Value> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut messages = Vec::with_capacity(state.history.len() + 1);
        if let Some(prompt) = self.system_prompt.as_deref().filter(|p| !p.is_empty()) {
            messages.push(serde_json::json!({ "role": "system", "content": prompt }));
        }
        messages.extend(state.history.iter().cloned());
        messages
    }

    fn push_history(&self, message: Value) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .push(message);
    }

    /// Run the request/tool loop until the model answers without tool calls.
    /// The assistant turn is recorded before the fragment channel closes.
    async fn run(self, tx: mpsc::UnboundedSender<Result<String, EngineError>>) {
        let tool_defs: Vec<Value> = self.tools.iter().map(|t| t.definition()).collect();
        let mut reply = String::new();

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let (fragment_tx, mut fragment_rx) = mpsc::unbounded_channel::<String>();
            let forward_tx = tx.clone();
            let forward_handle = tokio::spawn(async move {
                while let Some(fragment) = fragment_rx.recv().await {
                    let _ = forward_tx.send(Ok(fragment));
                }
            });

            let result = self
                .api
                .stream_chat(
                    &self.model_name,
                    &self.messages(),
                    Some(tool_defs.as_slice()),
                    &fragment_tx,
                    &self.cancel,
                )
                .await;

            drop(fragment_tx);
            let _ = forward_handle.await;

            let result = match result {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(model = %self.model_name, error = %e, "completion failed");
                    let _ = tx.send(Err(e));
                    return;
                }
            };

            reply.push_str(&result.content);
            let tool_calls = sanitize_tool_calls(result.tool_calls);
            self.push_history(assistant_message(&result.content, &tool_calls));

            if tool_calls.is_empty() || self.cancel.is_cancelled() {
                break;
            }

            for tc in &tool_calls {
                let outcome = self.execute_tool(tc).await;
                self.push_history(serde_json::json!({
                    "role": "tool",
                    "content": outcome.result,
                    "tool_call_id": tc.id,
                }));
            }
        }

        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .turns
            .push(Turn::assistant(reply));
    }

    async fn execute_tool(&self, call: &AccumulatedToolCall) -> ToolExecutionResult {
        let name = call.function.name.as_str();
        let Some(tool) = self.tools.iter().find(|t| t.name() == name) else {
            tracing::warn!(tool = name, "model called a tool outside the capability set");
            return ToolExecutionResult::error(format!("unknown tool '{}'", name));
        };

        let args = serde_json::from_str::<Value>(&call.function.arguments)
            .unwrap_or_else(|_| serde_json::json!({}));
        tracing::info!(tool = name, "executing tool");
        let outcome = tool.execute(args).await;
        if outcome.is_error {
            tracing::debug!(tool = name, result = %outcome.result, "tool reported an error");
        }
        outcome
    }
}

/// Arguments that are not valid JSON are replaced with `{}` so the history
/// stays acceptable to the API.
fn sanitize_tool_calls(calls: Vec<AccumulatedToolCall>) -> Vec<AccumulatedToolCall> {
    calls
        .into_iter()
        .map(|mut tc| {
            if serde_json::from_str::<Value>(&tc.function.arguments).is_err() {
                tc.function.arguments = "{}".to_string();
            }
            tc
        })
        .collect()
}

fn assistant_message(content: &str, tool_calls: &[AccumulatedToolCall]) -> Value {
    let mut message = serde_json::json!({ "role": "assistant", "content": content });
    if !tool_calls.is_empty() {
        message["tool_calls"] = serde_json::json!(tool_calls);
    }
    message
}

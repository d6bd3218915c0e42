use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::sync::Arc;

use crate::core::Turn;
use crate::error::{EngineError, SessionError};
use crate::tools::ToolRef;

/// Single-pass stream of assistant output fragments. Concatenating every
/// fragment yields the full reply.
pub type FragmentStream = BoxStream<'static, Result<String, EngineError>>;

/// Resolves model identifiers. Implemented by the HTTP client and by test fakes.
pub trait ModelClient: Send + Sync {
    fn resolve(&self, model_id: &str) -> Result<Arc<dyn Model>, EngineError>;
}

pub trait Model: Send + Sync {
    fn id(&self) -> &str;

    /// Open a fresh conversation that may call the given tools.
    fn open(&self, capabilities: &[ToolRef]) -> Box<dyn Conversation>;
}

/// One live conversation with a model.
pub trait Conversation: Send {
    /// Append a user turn and stream the reply. The assistant turn shows up in
    /// `turns()` once the stream has been drained.
    fn submit(&mut self, text: &str, system_prompt: Option<&str>) -> FragmentStream;

    fn turns(&self) -> Vec<Turn>;
}

/// Binds capability sets to conversations for one configured model.
#[derive(Clone)]
pub struct ConversationEngine {
    client: Arc<dyn ModelClient>,
    model_id: String,
}

impl ConversationEngine {
    pub fn new(client: Arc<dyn ModelClient>, model_id: impl Into<String>) -> Self {
        Self {
            client,
            model_id: model_id.into(),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn bind(&self, capabilities: &[ToolRef]) -> Result<EngineHandle, SessionError> {
        let model = self
            .client
            .resolve(&self.model_id)
            .map_err(|source| SessionError::EngineInit {
                model: self.model_id.clone(),
                source,
            })?;
        let conversation = model.open(capabilities);
        tracing::debug!(
            model = %self.model_id,
            tools = capabilities.len(),
            "bound conversation"
        );
        Ok(EngineHandle {
            conversation,
            capabilities: capabilities.to_vec(),
        })
    }
}

/// A conversation bound to one capability set.
pub struct EngineHandle {
    conversation: Box<dyn Conversation>,
    capabilities: Vec<ToolRef>,
}

impl EngineHandle {
    pub fn submit(&mut self, text: &str, system_prompt: Option<&str>) -> FragmentStream {
        self.conversation.submit(text, system_prompt)
    }

    pub fn turns(&self) -> Vec<Turn> {
        self.conversation.turns()
    }

    pub fn capabilities(&self) -> &[ToolRef] {
        &self.capabilities
    }
}

/// Consume a stream to the end, returning the concatenated text.
pub async fn drain(mut stream: FragmentStream) -> Result<String, EngineError> {
    let mut text = String::new();
    while let Some(fragment) = stream.next().await {
        text.push_str(&fragment?);
    }
    Ok(text)
}

use crate::core::engine::{drain, ConversationEngine, EngineHandle};
use crate::core::mode::Mode;
use crate::core::{Role, Turn};
use crate::error::SessionError;

/// The user turns of a conversation, captured right before a mode switch.
#[derive(Debug, Clone, Default)]
pub struct TranscriptSnapshot {
    turns: Vec<Turn>,
}

impl TranscriptSnapshot {
    /// Keep user turns with non-blank text, in their original order.
    pub fn capture(handle: &EngineHandle) -> Self {
        Self::from_turns(handle.turns())
    }

    pub fn from_turns(turns: Vec<Turn>) -> Self {
        Self {
            turns: turns
                .into_iter()
                .filter(|t| t.role == Role::User && !t.text.trim().is_empty())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.turns.iter().map(|t| t.text.as_str())
    }
}

/// A freshly primed handle, ready to replace the session's current one.
pub struct Rebound {
    pub handle: EngineHandle,
    pub replayed: usize,
    pub announced: bool,
}

/// Rebuilds a new engine's context so it behaves as if it had been part of the
/// conversation all along.
pub struct HistoryReplayer<'a> {
    engine: &'a ConversationEngine,
    system_prompt: Option<&'a str>,
}

impl<'a> HistoryReplayer<'a> {
    pub fn new(engine: &'a ConversationEngine, system_prompt: Option<&'a str>) -> Self {
        Self {
            engine,
            system_prompt,
        }
    }

    /// Bind a handle for `target`, send its switch message, then resubmit every
    /// user turn of `previous` in order. Each reply is drained silently before
    /// the next submission. Nothing of `previous` is modified.
    pub async fn rebind(
        &self,
        previous: &EngineHandle,
        target: &Mode,
    ) -> Result<Rebound, SessionError> {
        let snapshot = TranscriptSnapshot::capture(previous);
        let mut handle = self.engine.bind(target.capabilities())?;

        let announced = match target.switch_message() {
            Some(message) => {
                self.prime(&mut handle, target, message).await?;
                true
            }
            None => false,
        };

        for text in snapshot.texts() {
            self.prime(&mut handle, target, text).await?;
        }

        tracing::debug!(
            mode = target.name(),
            replayed = snapshot.len(),
            announced,
            "replayed history into new engine"
        );

        Ok(Rebound {
            handle,
            replayed: snapshot.len(),
            announced,
        })
    }

    async fn prime(
        &self,
        handle: &mut EngineHandle,
        target: &Mode,
        text: &str,
    ) -> Result<(), SessionError> {
        drain(handle.submit(text, self.system_prompt))
            .await
            .map(|_| ())
            .map_err(|source| SessionError::Replay {
                mode: target.name().to_string(),
                source,
            })
    }
}

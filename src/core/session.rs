use futures_util::{Stream, StreamExt};
use std::mem;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::core::engine::{ConversationEngine, EngineHandle, FragmentStream};
use crate::core::mode::{Mode, ModeRegistry};
use crate::core::replay::HistoryReplayer;
use crate::core::Turn;
use crate::error::{EngineError, SessionError};
use crate::tools::ToolRef;

/// Receives every turn as it is added to the session log, with the name of
/// the mode it was made in.
pub type TurnSink = Box<dyn FnMut(&Turn, &str) + Send>;

/// Append-only record of the conversation as the user saw it.
#[derive(Default)]
pub struct Transcript {
    turns: Vec<Turn>,
    sink: Option<TurnSink>,
}

impl Transcript {
    fn record(&mut self, turn: Turn, mode: &str) {
        if let Some(sink) = self.sink.as_mut() {
            sink(&turn, mode);
        }
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }
}

/// Result of a mode switch request that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    Unchanged,
    Switched {
        from: String,
        to: String,
        replayed: usize,
    },
}

/// Owns the current mode and the engine bound to it.
pub struct SessionState {
    registry: ModeRegistry,
    current_mode: Mode,
    engine: ConversationEngine,
    handle: EngineHandle,
    transcript: Transcript,
    system_prompt: Option<String>,
    debug: bool,
}

impl SessionState {
    /// Bind the registry's initial mode. Fails if the model cannot be resolved.
    pub fn new(
        registry: ModeRegistry,
        engine: ConversationEngine,
        system_prompt: Option<String>,
    ) -> Result<Self, SessionError> {
        let current_mode = registry.initial().clone();
        let handle = engine.bind(current_mode.capabilities())?;
        tracing::info!(
            mode = current_mode.name(),
            model = engine.model_id(),
            "session started"
        );
        Ok(Self {
            registry,
            current_mode,
            engine,
            handle,
            transcript: Transcript::default(),
            system_prompt,
            debug: false,
        })
    }

    pub fn with_turn_sink(mut self, sink: TurnSink) -> Self {
        self.transcript.sink = Some(sink);
        self
    }

    pub fn current_mode(&self) -> &Mode {
        &self.current_mode
    }

    pub fn registry(&self) -> &ModeRegistry {
        &self.registry
    }

    pub fn modes_enabled(&self) -> bool {
        self.registry.is_enabled()
    }

    pub fn current_capabilities(&self) -> &[ToolRef] {
        self.current_mode.capabilities()
    }

    pub fn turn_log(&self) -> &[Turn] {
        self.transcript.turns()
    }

    /// What the bound engine has seen, replay turns included.
    pub fn engine_turns(&self) -> Vec<Turn> {
        self.handle.turns()
    }

    pub fn model_id(&self) -> &str {
        self.engine.model_id()
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn toggle_debug(&mut self) -> bool {
        self.debug = !self.debug;
        self.debug
    }

    /// Log a user turn and stream the model's reply. The assistant turn is
    /// logged once the returned stream has been fully drained.
    pub fn submit_turn(&mut self, text: &str) -> Result<TurnStream<'_>, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyInputIgnored);
        }

        self.transcript
            .record(Turn::user(text), self.current_mode.name());
        let inner = self.handle.submit(text, self.system_prompt.as_deref());
        Ok(TurnStream {
            inner,
            transcript: &mut self.transcript,
            mode: self.current_mode.name(),
            reply: String::new(),
            finished: false,
        })
    }

    /// Switch to `target`. The current mode and engine are only replaced after
    /// the new engine has been fully primed; on error nothing changes.
    pub async fn switch_mode(&mut self, target: &str) -> Result<SwitchOutcome, SessionError> {
        if !self.registry.is_enabled() {
            return Err(SessionError::ModesDisabled);
        }
        if target == self.current_mode.name() {
            return Ok(SwitchOutcome::Unchanged);
        }

        let mode = self.registry.lookup(target)?.clone();
        let rebound = HistoryReplayer::new(&self.engine, self.system_prompt.as_deref())
            .rebind(&self.handle, &mode)
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    from = self.current_mode.name(),
                    to = target,
                    error = %e,
                    "mode switch aborted"
                );
            })?;

        let previous = mem::replace(&mut self.current_mode, mode);
        self.handle = rebound.handle;
        tracing::info!(
            from = previous.name(),
            to = target,
            replayed = rebound.replayed,
            "switched mode"
        );

        Ok(SwitchOutcome::Switched {
            from: previous.name().to_string(),
            to: target.to_string(),
            replayed: rebound.replayed,
        })
    }

    /// Switch to the next mode in configuration order. A no-op with fewer than two modes.
    pub async fn advance_mode(&mut self) -> Result<SwitchOutcome, SessionError> {
        let Some(next) = self
            .registry
            .next_after(self.current_mode.name())
            .map(str::to_string)
        else {
            return Ok(SwitchOutcome::Unchanged);
        };
        self.switch_mode(&next).await
    }
}

/// Reply stream of one user turn. Logs the assistant turn when exhausted.
pub struct TurnStream<'a> {
    inner: FragmentStream,
    transcript: &'a mut Transcript,
    mode: &'a str,
    reply: String,
    finished: bool,
}

impl TurnStream<'_> {
    /// Drain the stream and return the full reply.
    pub async fn collect_reply(mut self) -> Result<String, EngineError> {
        while let Some(fragment) = self.next().await {
            fragment?;
        }
        Ok(self
            .transcript
            .turns()
            .last()
            .map(|t| t.text.clone())
            .unwrap_or_default())
    }
}

impl Stream for TurnStream<'_> {
    type Item = Result<String, EngineError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(fragment))) => {
                this.reply.push_str(&fragment);
                Poll::Ready(Some(Ok(fragment)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.finished = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finished = true;
                let reply = mem::take(&mut this.reply);
                this.transcript.record(Turn::assistant(reply), this.mode);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

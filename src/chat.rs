use anyhow::Result;
use futures_util::future::{self, BoxFuture};
use futures_util::StreamExt;
use std::sync::Arc;

use crate::core::commands::{report_switch, CommandResult, SlashCommand, SlashCommandDispatcher};
use crate::core::engine::{ConversationEngine, ModelClient};
use crate::core::mode::{Mode, ModeRegistry};
use crate::core::session::{SessionState, SwitchOutcome, TurnSink};
use crate::error::SessionError;
use crate::tools::ToolRef;
use crate::ui::{Ui, UserInput};

const FAREWELL: &str = "[cyan]Thanks for using modechat. Goodbye![/cyan]";

/// Makes a future that resolves when the user interrupts the session. Called
/// once per model call that the loop waits on.
pub type InterruptSource = Box<dyn FnMut() -> BoxFuture<'static, ()> + Send>;

fn ctrl_c() -> BoxFuture<'static, ()> {
    Box::pin(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
            future::pending::<()>().await;
        }
    })
}

/// Collects everything a chat session needs before the first engine is bound.
pub struct ChatBuilder {
    client: Arc<dyn ModelClient>,
    model_id: String,
    modes: Vec<Mode>,
    tools_only: Option<Vec<ToolRef>>,
    initial_mode: Option<String>,
    system_prompt: Option<String>,
    commands: Vec<(String, SlashCommand)>,
    turn_sink: Option<TurnSink>,
    debug: bool,
    show_banner: bool,
    first_message: Option<String>,
    interrupt: InterruptSource,
}

impl ChatBuilder {
    pub fn mode(mut self, mode: Mode) -> Self {
        self.modes.push(mode);
        self
    }

    pub fn modes(mut self, modes: impl IntoIterator<Item = Mode>) -> Self {
        self.modes.extend(modes);
        self
    }

    /// No modes; the given tools are always available.
    pub fn tools_only(mut self, tools: Vec<ToolRef>) -> Self {
        self.tools_only = Some(tools);
        self
    }

    pub fn initial_mode(mut self, name: impl Into<String>) -> Self {
        self.initial_mode = Some(name.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn slash_command(mut self, name: impl Into<String>, command: SlashCommand) -> Self {
        self.commands.push((name.into(), command));
        self
    }

    pub fn turn_sink(mut self, sink: TurnSink) -> Self {
        self.turn_sink = Some(sink);
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn show_banner(mut self, show: bool) -> Self {
        self.show_banner = show;
        self
    }

    pub fn first_message(mut self, message: impl Into<String>) -> Self {
        self.first_message = Some(message.into());
        self
    }

    /// Replace Ctrl-C as the signal that ends the session mid-reply or mid-switch.
    pub fn interrupt<F>(mut self, source: F) -> Self
    where
        F: FnMut() -> BoxFuture<'static, ()> + Send + 'static,
    {
        self.interrupt = Box::new(source);
        self
    }

    /// Validate the configuration and bind the initial mode's engine.
    pub fn build(self) -> Result<Chat, SessionError> {
        let registry = match self.tools_only {
            Some(_) if !self.modes.is_empty() => {
                return Err(SessionError::Config(
                    "tools-only sessions cannot also declare modes".to_string(),
                ))
            }
            Some(_) if self.initial_mode.is_some() => {
                return Err(SessionError::Config(
                    "tools-only sessions have no initial mode".to_string(),
                ))
            }
            Some(tools) => ModeRegistry::tools_only(tools),
            None => ModeRegistry::new(self.modes, self.initial_mode.as_deref())?,
        };

        let mut dispatcher = SlashCommandDispatcher::new();
        for (name, command) in self.commands {
            dispatcher.register(&name, command)?;
        }

        let engine = ConversationEngine::new(self.client, self.model_id);
        let mut session = SessionState::new(registry, engine, self.system_prompt)?;
        session.set_debug(self.debug);
        if let Some(sink) = self.turn_sink {
            session = session.with_turn_sink(sink);
        }

        Ok(Chat {
            session,
            dispatcher,
            show_banner: self.show_banner,
            first_message: self.first_message,
            tips_shown: false,
            interrupt: self.interrupt,
        })
    }
}

/// An interactive session: reads input, routes commands and streams replies.
pub struct Chat {
    session: SessionState,
    dispatcher: SlashCommandDispatcher,
    show_banner: bool,
    first_message: Option<String>,
    tips_shown: bool,
    interrupt: InterruptSource,
}

impl Chat {
    pub fn builder(client: Arc<dyn ModelClient>, model_id: impl Into<String>) -> ChatBuilder {
        ChatBuilder {
            client,
            model_id: model_id.into(),
            modes: Vec::new(),
            tools_only: None,
            initial_mode: None,
            system_prompt: None,
            commands: Vec::new(),
            turn_sink: None,
            debug: false,
            show_banner: true,
            first_message: None,
            interrupt: Box::new(ctrl_c),
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn prompt(&self) -> String {
        if self.session.modes_enabled() {
            format!("[{}] > ", self.session.current_mode().name())
        } else {
            "> ".to_string()
        }
    }

    /// Run until the user quits, input ends or the user interrupts a model call.
    pub async fn run(&mut self, ui: &mut dyn Ui) -> Result<()> {
        self.greet(ui);

        loop {
            self.show_tips_once(ui);
            let completions = self.dispatcher.completions(self.session.modes_enabled());
            let line = match ui.read_line(&self.prompt(), &completions)? {
                UserInput::Interrupted => break,
                UserInput::CycleMode => {
                    if !self.cycle_mode(ui).await {
                        break;
                    }
                    continue;
                }
                UserInput::Line(line) => line,
            };

            // `/mode` may replay history into a new engine.
            let interrupt = (self.interrupt)();
            let result = tokio::select! {
                biased;
                _ = interrupt => None,
                result = self.dispatcher.dispatch(&line, &mut self.session, ui) => Some(result),
            };
            let text = match result {
                None => {
                    tracing::info!("interrupted while running a command");
                    break;
                }
                Some(CommandResult::Quit) => break,
                Some(CommandResult::Handled) => continue,
                Some(CommandResult::Prompt(text)) => text,
            };
            if text.trim().is_empty() {
                continue;
            }

            if !self.stream_reply(&text, ui).await {
                break;
            }
        }

        ui.print("");
        ui.print(FAREWELL);
        ui.print("");
        Ok(())
    }

    fn greet(&self, ui: &mut dyn Ui) {
        if self.show_banner {
            ui.print(&format!(
                "[cyan][bold]modechat[/bold][/cyan] [dim]model: {}[/dim]",
                self.session.model_id()
            ));
            ui.print("[dim]Type /help for available commands[/dim]");
            ui.print("");
        }
        if let Some(message) = &self.first_message {
            ui.print(message);
            ui.print("");
        }
        if self.session.debug() {
            ui.print("[magenta]Debug mode enabled[/magenta]");
            ui.print("");
        }
    }

    fn show_tips_once(&mut self, ui: &mut dyn Ui) {
        if self.tips_shown {
            return;
        }
        let mut tips = String::from("[dim]Tips: TAB for completions • ↑/↓ for history");
        if self.session.registry().len() > 1 {
            tips.push_str(" • Shift+TAB to switch modes");
        }
        tips.push_str("[/dim]");
        ui.print(&tips);
        self.tips_shown = true;
    }

    /// Move to the next mode. Returns false when the user interrupted the
    /// replay; the session then stays in its current mode.
    async fn cycle_mode(&mut self, ui: &mut dyn Ui) -> bool {
        let interrupt = (self.interrupt)();
        let result = tokio::select! {
            biased;
            _ = interrupt => {
                tracing::info!("interrupted during mode switch");
                return false;
            }
            result = self.session.advance_mode() => result,
        };
        match result {
            Ok(SwitchOutcome::Unchanged) => {}
            result => report_switch(&self.session, result, ui),
        }
        true
    }

    /// Submit `text` and stream the reply. Returns false when the user
    /// interrupted mid-reply and the session should end.
    async fn stream_reply(&mut self, text: &str, ui: &mut dyn Ui) -> bool {
        let mut interrupt = (self.interrupt)();
        let mut stream = match self.session.submit_turn(text) {
            Ok(stream) => stream,
            Err(SessionError::EmptyInputIgnored) => return true,
            Err(e) => {
                ui.print(&format!("[red]Error: {}[/red]", e));
                ui.print("");
                return true;
            }
        };

        let mut started = false;
        let mut interrupted = false;
        let mut failure = None;
        loop {
            tokio::select! {
                biased;
                _ = &mut interrupt => {
                    interrupted = true;
                    break;
                }
                fragment = stream.next() => match fragment {
                    Some(Ok(fragment)) => {
                        if !started {
                            ui.stream_start();
                            started = true;
                        }
                        ui.stream_fragment(&fragment);
                    }
                    Some(Err(e)) => {
                        failure = Some(e);
                        break;
                    }
                    None => break,
                },
            }
        }
        drop(stream);

        if started {
            ui.stream_end();
        }
        if let Some(e) = failure {
            tracing::warn!(error = %e, "reply stream failed");
            ui.print(&format!("[red]Error: {}[/red]", e));
        }
        ui.print("");
        !interrupted
    }
}

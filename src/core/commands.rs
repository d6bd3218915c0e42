use crate::core::session::{SessionState, SwitchOutcome};
use crate::error::SessionError;
use crate::ui::Ui;

/// Zero-argument handler of a user command. `Ok(Some(text))` either feeds the
/// model or, for UI markup, is printed.
pub type CommandAction = Box<dyn Fn() -> anyhow::Result<Option<String>> + Send + Sync>;

pub enum SlashCommand {
    /// Sent to the model verbatim.
    Prompt(String),
    Action {
        description: Option<String>,
        run: CommandAction,
    },
}

impl SlashCommand {
    pub fn prompt(text: impl Into<String>) -> Self {
        SlashCommand::Prompt(text.into())
    }

    pub fn action<F>(description: impl Into<String>, run: F) -> Self
    where
        F: Fn() -> anyhow::Result<Option<String>> + Send + Sync + 'static,
    {
        SlashCommand::Action {
            description: Some(description.into()),
            run: Box::new(run),
        }
    }

    fn summary(&self) -> String {
        match self {
            SlashCommand::Prompt(text) => {
                if text.chars().count() > 50 {
                    format!("{}...", text.chars().take(50).collect::<String>())
                } else {
                    text.clone()
                }
            }
            SlashCommand::Action { description, .. } => description
                .clone()
                .unwrap_or_else(|| "Custom function".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    Quit,
    Handled,
    /// Text to submit to the model as the next user turn.
    Prompt(String),
}

const BUILTIN_COMMANDS: &[(&str, &str)] = &[
    ("/quit", "Exit the application"),
    ("/help", "Show this help message"),
    ("/tools", "Show available tools"),
    ("/debug", "Toggle debug mode"),
];

const MODE_COMMANDS: &[(&str, &str)] = &[
    ("/mode", "Switch mode interactively or /mode <mode_name>"),
    ("/modes", "List available modes"),
];

/// Split `/command rest of line` at the first run of whitespace.
pub fn split_command(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if !line.starts_with('/') {
        return None;
    }
    match line.split_once(char::is_whitespace) {
        Some((name, rest)) => Some((name, rest.trim())),
        None => Some((line, "")),
    }
}

/// Handler output that looks like UI markup is shown to the user, not sent to the model.
pub fn is_ui_markup(text: &str) -> bool {
    text.starts_with('[') || text.ends_with(']')
}

/// Routes slash commands to built-in or user handlers. Anything else, including
/// unrecognised `/...` lines, is model input.
#[derive(Default)]
pub struct SlashCommandDispatcher {
    user_commands: Vec<(String, SlashCommand)>,
}

impl SlashCommandDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user command. A missing leading `/` is added.
    pub fn register(&mut self, name: &str, command: SlashCommand) -> Result<(), SessionError> {
        let name = if name.starts_with('/') {
            name.to_string()
        } else {
            format!("/{}", name)
        };
        if name.len() < 2 || name.contains(char::is_whitespace) {
            return Err(SessionError::Config(format!(
                "invalid slash command name \"{}\"",
                name
            )));
        }
        if BUILTIN_COMMANDS
            .iter()
            .chain(MODE_COMMANDS)
            .any(|(builtin, _)| *builtin == name)
        {
            return Err(SessionError::Config(format!(
                "slash command {} shadows a built-in command",
                name
            )));
        }
        if self.user_commands.iter().any(|(existing, _)| *existing == name) {
            return Err(SessionError::Config(format!(
                "slash command {} registered twice",
                name
            )));
        }
        self.user_commands.push((name, command));
        Ok(())
    }

    pub fn builtin_names(modes_enabled: bool) -> Vec<&'static str> {
        let mut names: Vec<&str> = BUILTIN_COMMANDS.iter().map(|(n, _)| *n).collect();
        if modes_enabled {
            names.extend(MODE_COMMANDS.iter().map(|(n, _)| *n));
        }
        names
    }

    pub fn completions(&self, modes_enabled: bool) -> Vec<String> {
        Self::builtin_names(modes_enabled)
            .into_iter()
            .map(str::to_string)
            .chain(self.user_commands.iter().map(|(n, _)| n.clone()))
            .collect()
    }

    pub fn is_command(&self, name: &str, modes_enabled: bool) -> bool {
        Self::builtin_names(modes_enabled).contains(&name)
            || self.user_commands.iter().any(|(n, _)| n == name)
    }

    pub async fn dispatch(
        &self,
        line: &str,
        session: &mut SessionState,
        ui: &mut dyn Ui,
    ) -> CommandResult {
        let line = line.trim();
        let Some((name, args)) = split_command(line) else {
            return CommandResult::Prompt(line.to_string());
        };
        if !self.is_command(name, session.modes_enabled()) {
            return CommandResult::Prompt(line.to_string());
        }
        tracing::debug!(command = name, "dispatching slash command");

        match name {
            "/quit" => CommandResult::Quit,
            "/help" => self.show_help(session, ui),
            "/tools" => show_tools(session, ui),
            "/debug" => {
                let status = if session.toggle_debug() {
                    "enabled"
                } else {
                    "disabled"
                };
                ui.print(&format!("[magenta]Debug mode {}[/magenta]", status));
                ui.print("");
                CommandResult::Handled
            }
            "/mode" => mode_command(args, session, ui).await,
            "/modes" => show_modes(session, ui),
            _ => match self.user_commands.iter().find(|(n, _)| n == name) {
                Some((name, command)) => run_user_command(name, command, ui),
                None => CommandResult::Prompt(line.to_string()),
            },
        }
    }

    fn show_help(&self, session: &SessionState, ui: &mut dyn Ui) -> CommandResult {
        ui.print("[cyan]Built-in commands:[/cyan]");
        for (name, description) in BUILTIN_COMMANDS {
            ui.print(&format!("  {:<7} - {}", name, description));
        }
        if session.modes_enabled() {
            for (name, description) in MODE_COMMANDS {
                ui.print(&format!("  {:<7} - {}", name, description));
            }
            if session.registry().len() > 1 {
                ui.print("  [dim]Shift+Tab - Quick switch to next mode[/dim]");
            }
        }

        if !self.user_commands.is_empty() {
            ui.print("");
            ui.print("[cyan]Custom commands:[/cyan]");
            for (name, command) in &self.user_commands {
                ui.print(&format!("  {:<7} - {}", name, command.summary()));
            }
        }
        ui.print("");
        CommandResult::Handled
    }
}

fn run_user_command(name: &str, command: &SlashCommand, ui: &mut dyn Ui) -> CommandResult {
    let run = match command {
        SlashCommand::Prompt(text) => return CommandResult::Prompt(text.clone()),
        SlashCommand::Action { run, .. } => run,
    };

    match run() {
        Ok(Some(text)) if !text.trim().is_empty() => {
            if is_ui_markup(&text) {
                ui.print(&text);
                ui.print("");
                CommandResult::Handled
            } else {
                CommandResult::Prompt(text)
            }
        }
        Ok(_) => CommandResult::Handled,
        Err(e) => {
            let err = SessionError::UserCommand {
                command: name.to_string(),
                reason: format!("{:#}", e),
            };
            tracing::warn!(error = %err, "user command failed");
            ui.print(&format!("[red]{}[/red]", err));
            ui.print("");
            CommandResult::Handled
        }
    }
}

fn show_tools(session: &SessionState, ui: &mut dyn Ui) -> CommandResult {
    if session.modes_enabled() {
        ui.print(&format!(
            "[cyan]Available tools in {} mode:[/cyan]",
            session.current_mode().name()
        ));
    } else {
        ui.print("[cyan]Available tools:[/cyan]");
    }

    let tools = session.current_capabilities();
    if tools.is_empty() {
        ui.print("[dim]No tools configured[/dim]");
    }
    for tool in tools {
        ui.print(&format!("  {}", tool.name()));
    }
    ui.print("");
    CommandResult::Handled
}

fn show_modes(session: &SessionState, ui: &mut dyn Ui) -> CommandResult {
    ui.print("[cyan]Available modes:[/cyan]");
    let current = session.current_mode().name();
    for name in session.registry().all_names() {
        if name == current {
            ui.print(&format!("  {} [green](current)[/green]", name));
        } else {
            ui.print(&format!("  {}", name));
        }
    }
    ui.print("");
    CommandResult::Handled
}

async fn mode_command(args: &str, session: &mut SessionState, ui: &mut dyn Ui) -> CommandResult {
    if !args.is_empty() {
        let result = session.switch_mode(args).await;
        report_switch(session, result, ui);
        return CommandResult::Handled;
    }

    let current = session.current_mode().name().to_string();
    let choices: Vec<String> = session
        .registry()
        .all_names()
        .into_iter()
        .map(|name| {
            if name == current {
                format!("{} (current)", name)
            } else {
                name.to_string()
            }
        })
        .collect();

    match ui.choose_one("Select mode:", &choices) {
        Ok(Some(selected)) => {
            let target = selected.strip_suffix(" (current)").unwrap_or(&selected);
            if target == current {
                ui.print(&format!("[dim]Already in {} mode[/dim]", target));
                ui.print("");
            } else {
                let result = session.switch_mode(target).await;
                report_switch(session, result, ui);
            }
        }
        Ok(None) => {
            ui.print("[dim]Mode selection cancelled[/dim]");
            ui.print("");
        }
        Err(e) => {
            ui.print(&format!("[red]Mode selection failed: {:#}[/red]", e));
            ui.print("");
        }
    }
    CommandResult::Handled
}

/// Tell the user how a mode switch went. A failed switch leaves the session
/// in the mode it was in.
pub fn report_switch(
    session: &SessionState,
    result: Result<SwitchOutcome, SessionError>,
    ui: &mut dyn Ui,
) {
    match result {
        Ok(SwitchOutcome::Unchanged) => {
            ui.print(&format!(
                "[dim]Already in {} mode[/dim]",
                session.current_mode().name()
            ));
        }
        Ok(SwitchOutcome::Switched { from, to, replayed }) => {
            ui.print(&format!("[green]Switched from {} to {} mode[/green]", from, to));
            if session.debug() {
                ui.print(&format!(
                    "[magenta]Replayed {} user turn(s) into the new engine[/magenta]",
                    replayed
                ));
            }
        }
        Err(SessionError::UnknownMode { name, available }) => {
            ui.print(&format!("[red]Unknown mode: {}[/red]", name));
            ui.print(&format!("[dim]Available modes: {}[/dim]", available.join(", ")));
        }
        Err(SessionError::ModesDisabled) => {
            ui.print("[red]Modes are not configured for this session[/red]");
        }
        Err(e) => {
            tracing::warn!(error = %e, "mode switch failed");
            ui.print(&format!(
                "[red]Mode switch failed, still in {} mode: {}[/red]",
                session.current_mode().name(),
                e
            ));
        }
    }
    ui.print("");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::ConversationEngine;
    use crate::core::mode::{Mode, ModeRegistry};
    use crate::core::testing::{tool, ScriptedClient, ScriptedUi};
    use std::sync::Arc;

    fn session(client: &ScriptedClient, modes: Vec<Mode>) -> SessionState {
        let registry = ModeRegistry::new(modes, None).unwrap();
        let engine = ConversationEngine::new(Arc::new(client.clone()), "test-model");
        SessionState::new(registry, engine, None).unwrap()
    }

    fn dev_review_planning() -> Vec<Mode> {
        vec![
            Mode::new("development", vec![tool("edit_file"), tool("todo_write")]),
            Mode::new("review", vec![tool("read_file")]),
            Mode::new("planning", vec![]),
        ]
    }

    #[test]
    fn split_command_uses_first_whitespace_run() {
        assert_eq!(split_command("/mode   planning now"), Some(("/mode", "planning now")));
        assert_eq!(split_command("/help"), Some(("/help", "")));
        assert_eq!(split_command("hello /help"), None);
    }

    #[test]
    fn markup_detection() {
        assert!(is_ui_markup("[red]oops[/red]"));
        assert!(is_ui_markup("done [ok]"));
        assert!(!is_ui_markup("You are now a pirate."));
    }

    #[test]
    fn register_validates_names() {
        let mut dispatcher = SlashCommandDispatcher::new();
        dispatcher.register("thinking", SlashCommand::prompt("Think.")).unwrap();
        assert!(dispatcher.is_command("/thinking", false));
        assert!(dispatcher.register("/thinking", SlashCommand::prompt("x")).is_err());
        assert!(dispatcher.register("/help", SlashCommand::prompt("x")).is_err());
        assert!(dispatcher.register("/mode", SlashCommand::prompt("x")).is_err());
        assert!(dispatcher.register("/two words", SlashCommand::prompt("x")).is_err());
    }

    #[test]
    fn mode_commands_only_complete_when_modes_enabled() {
        let mut dispatcher = SlashCommandDispatcher::new();
        dispatcher.register("/role", SlashCommand::prompt("x")).unwrap();
        assert_eq!(
            dispatcher.completions(false),
            vec!["/quit", "/help", "/tools", "/debug", "/role"]
        );
        assert!(dispatcher.completions(true).contains(&"/modes".to_string()));
    }

    #[tokio::test]
    async fn callable_returning_plain_text_becomes_model_input() {
        let client = ScriptedClient::new();
        let mut session = session(&client, dev_review_planning());
        let mut ui = ScriptedUi::new();
        let mut dispatcher = SlashCommandDispatcher::new();
        dispatcher
            .register(
                "/role",
                SlashCommand::action("Set a role", || Ok(Some("You are now a pirate.".to_string()))),
            )
            .unwrap();

        let result = dispatcher.dispatch("/role", &mut session, &mut ui).await;
        assert_eq!(result, CommandResult::Prompt("You are now a pirate.".to_string()));
        assert!(ui.printed.is_empty());
    }

    #[tokio::test]
    async fn callable_returning_markup_is_printed() {
        let client = ScriptedClient::new();
        let mut session = session(&client, dev_review_planning());
        let mut ui = ScriptedUi::new();
        let mut dispatcher = SlashCommandDispatcher::new();
        dispatcher
            .register("/status", SlashCommand::action("Status", || Ok(Some("[green]ok[/green]".into()))))
            .unwrap();
        dispatcher
            .register("/noop", SlashCommand::action("Nothing", || Ok(None)))
            .unwrap();

        assert_eq!(
            dispatcher.dispatch("/status", &mut session, &mut ui).await,
            CommandResult::Handled
        );
        assert_eq!(ui.printed[0], "[green]ok[/green]");
        assert_eq!(
            dispatcher.dispatch("/noop", &mut session, &mut ui).await,
            CommandResult::Handled
        );
    }

    #[tokio::test]
    async fn failing_callable_is_reported_and_handled() {
        let client = ScriptedClient::new();
        let mut session = session(&client, dev_review_planning());
        let mut ui = ScriptedUi::new();
        let mut dispatcher = SlashCommandDispatcher::new();
        dispatcher
            .register(
                "/broken",
                SlashCommand::action("Fails", || Err(anyhow::anyhow!("no persona file"))),
            )
            .unwrap();

        let result = dispatcher.dispatch("/broken", &mut session, &mut ui).await;
        assert_eq!(result, CommandResult::Handled);
        assert!(ui.printed_text().contains("error executing command /broken: no persona file"));
    }

    #[tokio::test]
    async fn unknown_slash_lines_fall_through_to_the_model() {
        let client = ScriptedClient::new();
        let mut session = session(&client, vec![]);
        let mut ui = ScriptedUi::new();
        let dispatcher = SlashCommandDispatcher::new();

        assert_eq!(
            dispatcher.dispatch("/usr/bin is a path", &mut session, &mut ui).await,
            CommandResult::Prompt("/usr/bin is a path".to_string())
        );
        // Mode commands are plain text when modes are disabled.
        assert_eq!(
            dispatcher.dispatch("/mode planning", &mut session, &mut ui).await,
            CommandResult::Prompt("/mode planning".to_string())
        );
        assert_eq!(
            dispatcher.dispatch("/quit", &mut session, &mut ui).await,
            CommandResult::Quit
        );
    }

    #[tokio::test]
    async fn mode_with_argument_switches_directly() {
        let client = ScriptedClient::new();
        let mut session = session(&client, dev_review_planning());
        let mut ui = ScriptedUi::new();
        let dispatcher = SlashCommandDispatcher::new();

        dispatcher.dispatch("/mode review", &mut session, &mut ui).await;
        assert_eq!(session.current_mode().name(), "review");
        assert!(ui.printed_text().contains("Switched from development to review mode"));

        dispatcher.dispatch("/mode nonexistent", &mut session, &mut ui).await;
        assert_eq!(session.current_mode().name(), "review");
        assert!(ui.printed_text().contains("Unknown mode: nonexistent"));
        assert!(ui.printed_text().contains("Available modes: development, review, planning"));
    }

    #[tokio::test]
    async fn failed_switch_reports_the_mode_kept() {
        let client = ScriptedClient::new();
        let mut session = session(&client, dev_review_planning());
        let mut ui = ScriptedUi::new();

        client.set_missing_model(true);
        let result = session.switch_mode("review").await;
        report_switch(&session, result, &mut ui);
        assert!(ui
            .printed_text()
            .contains("Mode switch failed, still in development mode"));

        client.set_missing_model(false);
        session.set_debug(true);
        let result = session.switch_mode("development").await;
        report_switch(&session, result, &mut ui);
        assert!(ui.printed_text().contains("Already in development mode"));

        let result = session.advance_mode().await;
        report_switch(&session, result, &mut ui);
        assert!(ui.printed_text().contains("Switched from development to review mode"));
        assert!(ui
            .printed_text()
            .contains("Replayed 0 user turn(s) into the new engine"));
    }

    #[tokio::test]
    async fn mode_picker_annotates_current_mode() {
        let client = ScriptedClient::new();
        let mut session = session(&client, dev_review_planning());
        let mut ui = ScriptedUi::new();
        ui.push_pick(Some("review"));
        ui.push_pick(Some("review (current)"));
        let dispatcher = SlashCommandDispatcher::new();

        dispatcher.dispatch("/mode", &mut session, &mut ui).await;
        assert_eq!(
            ui.choices_offered[0],
            (
                "Select mode:".to_string(),
                vec![
                    "development (current)".to_string(),
                    "review".to_string(),
                    "planning".to_string()
                ]
            )
        );
        assert_eq!(session.current_mode().name(), "review");

        dispatcher.dispatch("/mode", &mut session, &mut ui).await;
        assert!(ui.printed_text().contains("Already in review mode"));
        assert_eq!(client.opened().len(), 2);
    }

    #[tokio::test]
    async fn tools_and_modes_listings_follow_current_mode() {
        let client = ScriptedClient::new();
        let mut session = session(&client, dev_review_planning());
        let mut ui = ScriptedUi::new();
        let dispatcher = SlashCommandDispatcher::new();

        dispatcher.dispatch("/tools", &mut session, &mut ui).await;
        assert_eq!(ui.printed[0], "[cyan]Available tools in development mode:[/cyan]");
        assert_eq!(ui.printed[1], "  edit_file");
        assert_eq!(ui.printed[2], "  todo_write");

        ui.printed.clear();
        dispatcher.dispatch("/modes", &mut session, &mut ui).await;
        assert_eq!(ui.printed[1], "  development [green](current)[/green]");
        assert_eq!(ui.printed[2], "  review");
    }

    #[tokio::test]
    async fn debug_toggles_session_flag() {
        let client = ScriptedClient::new();
        let mut session = session(&client, vec![]);
        let mut ui = ScriptedUi::new();
        let dispatcher = SlashCommandDispatcher::new();

        dispatcher.dispatch("/debug", &mut session, &mut ui).await;
        assert!(session.debug());
        dispatcher.dispatch("/debug", &mut session, &mut ui).await;
        assert!(!session.debug());
        assert!(ui.printed_text().contains("Debug mode disabled"));
    }

    #[tokio::test]
    async fn help_lists_custom_commands_with_previews() {
        let client = ScriptedClient::new();
        let mut session = session(&client, dev_review_planning());
        let mut ui = ScriptedUi::new();
        let mut dispatcher = SlashCommandDispatcher::new();
        dispatcher
            .register("/thinking", SlashCommand::prompt("Let me think through this step by step, carefully and slowly:"))
            .unwrap();

        dispatcher.dispatch("/help", &mut session, &mut ui).await;
        let text = ui.printed_text();
        assert!(text.contains("/modes"));
        assert!(text.contains("Shift+Tab"));
        assert!(text.contains("/thinking - Let me think through this step by step, carefully ..."));
    }
}

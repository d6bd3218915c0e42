use anyhow::Result;
use std::borrow::Cow::{self, Borrowed, Owned};
use std::io::{IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossterm::style::Stylize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{
    Cmd, ConditionalEventHandler, Context, Editor, Event, EventContext, EventHandler, Helper,
    KeyCode, KeyEvent, Modifiers, RepeatCount,
};

use super::markup;
use super::{Ui, UserInput};

const LEFT_PADDING: usize = 2;

/// Slash-command completion and hints for the input line.
#[derive(Clone, Default)]
struct InputHelper {
    commands: Vec<String>,
}

impl Helper for InputHelper {}

impl Completer for InputHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line = &line[..pos];
        if !line.starts_with('/') || line.contains(char::is_whitespace) {
            return Ok((0, vec![]));
        }
        let candidates = self
            .commands
            .iter()
            .filter(|cmd| cmd.starts_with(line))
            .map(|cmd| Pair {
                display: cmd.clone(),
                replacement: cmd.clone(),
            })
            .collect();
        Ok((0, candidates))
    }
}

impl Highlighter for InputHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        let rest = line.trim_start();
        let indent = &line[..line.len() - rest.len()];
        let command = rest.split_whitespace().next().unwrap_or("");
        if !command.is_empty() && self.commands.iter().any(|c| c == command) {
            Owned(format!("{}{}{}", indent, command.cyan(), &rest[command.len()..]))
        } else {
            Borrowed(line)
        }
    }

    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Owned(hint.dark_grey().to_string())
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

impl Hinter for InputHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        let line = &line[..pos];
        if !line.starts_with('/') || line.contains(' ') {
            return None;
        }
        self.commands
            .iter()
            .find(|cmd| cmd.starts_with(line) && cmd.len() > line.len())
            .map(|cmd| cmd[line.len()..].to_string())
    }
}

impl Validator for InputHelper {}

/// Shift+Tab accepts the line and flags a mode cycle request.
struct CycleModeHandler(Arc<AtomicBool>);

impl ConditionalEventHandler for CycleModeHandler {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        _ctx: &EventContext,
    ) -> Option<Cmd> {
        self.0.store(true, Ordering::SeqCst);
        Some(Cmd::AcceptLine)
    }
}

/// Line-oriented terminal UI on top of rustyline.
pub struct ConsoleUi {
    editor: Editor<InputHelper, DefaultHistory>,
    cycle_requested: Arc<AtomicBool>,
    at_line_start: bool,
    /// Markup renders as ANSI only when stdout is a terminal.
    styled: bool,
}

impl ConsoleUi {
    pub fn new() -> Result<Self> {
        let mut editor = Editor::new()?;
        editor.set_helper(Some(InputHelper::default()));

        let cycle_requested = Arc::new(AtomicBool::new(false));
        editor.bind_sequence(
            KeyEvent(KeyCode::BackTab, Modifiers::NONE),
            EventHandler::Conditional(Box::new(CycleModeHandler(cycle_requested.clone()))),
        );

        Ok(Self {
            editor,
            cycle_requested,
            at_line_start: true,
            styled: std::io::stdout().is_terminal(),
        })
    }

    fn read_raw(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl Ui for ConsoleUi {
    fn read_line(&mut self, prompt: &str, completions: &[String]) -> Result<UserInput> {
        if let Some(helper) = self.editor.helper_mut() {
            helper.commands = completions.to_vec();
        }

        let line = self.read_raw(prompt)?;
        if self.cycle_requested.swap(false, Ordering::SeqCst) {
            return Ok(UserInput::CycleMode);
        }
        match line {
            Some(line) => {
                if !line.trim().is_empty() {
                    let _ = self.editor.add_history_entry(line.as_str());
                }
                Ok(UserInput::Line(line))
            }
            None => Ok(UserInput::Interrupted),
        }
    }

    fn print(&mut self, text: &str) {
        if self.styled {
            println!("{}", markup::render(text));
        } else {
            println!("{}", markup::strip(text));
        }
    }

    fn choose_one(&mut self, prompt: &str, options: &[String]) -> Result<Option<String>> {
        self.print(&format!("[cyan]{}[/cyan]", prompt));
        for (i, option) in options.iter().enumerate() {
            self.print(&format!("  [bold]{}[/bold]) {}", i + 1, option));
        }

        let Some(answer) = self.read_raw(&format!("Choice [1-{}]: ", options.len()))? else {
            return Ok(None);
        };
        let answer = answer.trim();
        if answer.is_empty() {
            return Ok(None);
        }

        let picked = answer
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| options.get(i))
            .or_else(|| options.iter().find(|o| o.as_str() == answer));
        if picked.is_none() {
            self.print(&format!("[red]Not a valid choice: {}[/red]", answer));
        }
        Ok(picked.cloned())
    }

    fn stream_start(&mut self) {
        print!("{}", " ".repeat(LEFT_PADDING));
        self.at_line_start = false;
    }

    fn stream_fragment(&mut self, text: &str) {
        let padding = " ".repeat(LEFT_PADDING);
        let mut out = String::with_capacity(text.len());
        for ch in text.chars() {
            if self.at_line_start {
                out.push_str(&padding);
                self.at_line_start = false;
            }
            out.push(ch);
            if ch == '\n' {
                self.at_line_start = true;
            }
        }
        print!("{}", out);
        let _ = std::io::stdout().flush();
    }

    fn stream_end(&mut self) {
        if !self.at_line_start {
            println!();
        }
        self.at_line_start = true;
    }
}

pub mod console;
pub mod markup;

use anyhow::Result;

/// What the user did at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserInput {
    Line(String),
    /// Shift+Tab: move to the next mode.
    CycleMode,
    /// Ctrl-C or end of input. Ends the session.
    Interrupted,
}

/// Terminal collaborator. Text passed to `print` may carry `[style]...[/style]` markup.
pub trait Ui {
    fn read_line(&mut self, prompt: &str, completions: &[String]) -> Result<UserInput>;

    fn print(&mut self, text: &str);

    /// Let the user pick one option. `None` when the pick was cancelled.
    fn choose_one(&mut self, prompt: &str, options: &[String]) -> Result<Option<String>>;

    fn stream_start(&mut self);

    fn stream_fragment(&mut self, text: &str);

    fn stream_end(&mut self);
}

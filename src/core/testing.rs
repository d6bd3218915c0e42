//! Scripted collaborators for tests: a model client that echoes and records
//! every submission, a name-only tool, and a UI fed from a queue.

use futures_util::future::BoxFuture;
use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::core::engine::{Conversation, FragmentStream, Model, ModelClient};
use crate::core::Turn;
use crate::error::EngineError;
use crate::tools::{Tool, ToolExecutionResult, ToolRef};
use crate::ui::{Ui, UserInput};

struct NamedTool(String);

impl Tool for NamedTool {
    fn name(&self) -> &str {
        &self.0
    }

    fn definition(&self) -> Value {
        serde_json::json!({"type": "function", "function": {"name": self.0}})
    }

    fn execute(&self, _args: Value) -> BoxFuture<'_, ToolExecutionResult> {
        Box::pin(async { ToolExecutionResult::text(String::new()) })
    }
}

pub(crate) fn tool(name: &str) -> ToolRef {
    Arc::new(NamedTool(name.to_string()))
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Submission {
    pub conversation: usize,
    pub text: String,
    pub system_prompt: Option<String>,
}

#[derive(Default)]
struct Script {
    missing_model: bool,
    fail_on: Option<String>,
    hang_on: Option<String>,
    opened: Vec<Vec<String>>,
    submissions: Vec<Submission>,
}

/// Replies `echo: <text>` in two fragments. Shared state is visible through
/// every clone so tests can inspect what the session sent.
#[derive(Clone, Default)]
pub(crate) struct ScriptedClient {
    script: Arc<Mutex<Script>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_model(self) -> Self {
        self.script.lock().unwrap().missing_model = true;
        self
    }

    pub fn set_missing_model(&self, missing: bool) {
        self.script.lock().unwrap().missing_model = missing;
    }

    /// Make any submission of exactly `text` fail mid-stream.
    pub fn fail_on(&self, text: &str) {
        self.script.lock().unwrap().fail_on = Some(text.to_string());
    }

    /// Make any submission of exactly `text` stream nothing and never finish.
    pub fn hang_on(&self, text: &str) {
        self.script.lock().unwrap().hang_on = Some(text.to_string());
    }

    pub fn opened(&self) -> Vec<Vec<String>> {
        self.script.lock().unwrap().opened.clone()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.script.lock().unwrap().submissions.clone()
    }

    /// Texts submitted to the `index`-th opened conversation.
    pub fn texts_for(&self, index: usize) -> Vec<String> {
        self.submissions()
            .into_iter()
            .filter(|s| s.conversation == index)
            .map(|s| s.text)
            .collect()
    }
}

struct ScriptedModel {
    client: ScriptedClient,
}

impl ModelClient for ScriptedClient {
    fn resolve(&self, model_id: &str) -> Result<Arc<dyn Model>, EngineError> {
        if self.script.lock().unwrap().missing_model {
            return Err(EngineError::UnknownModel(model_id.to_string()));
        }
        Ok(Arc::new(ScriptedModel {
            client: self.clone(),
        }))
    }
}

impl Model for ScriptedModel {
    fn id(&self) -> &str {
        "scripted"
    }

    fn open(&self, capabilities: &[ToolRef]) -> Box<dyn Conversation> {
        let mut script = self.client.script.lock().unwrap();
        script
            .opened
            .push(capabilities.iter().map(|t| t.name().to_string()).collect());
        Box::new(ScriptedConversation {
            index: script.opened.len() - 1,
            client: self.client.clone(),
            turns: Arc::new(Mutex::new(Vec::new())),
        })
    }
}

struct ScriptedConversation {
    index: usize,
    client: ScriptedClient,
    turns: Arc<Mutex<Vec<Turn>>>,
}

impl Conversation for ScriptedConversation {
    fn submit(&mut self, text: &str, system_prompt: Option<&str>) -> FragmentStream {
        let (fail, hang) = {
            let mut script = self.client.script.lock().unwrap();
            script.submissions.push(Submission {
                conversation: self.index,
                text: text.to_string(),
                system_prompt: system_prompt.map(str::to_string),
            });
            (
                script.fail_on.as_deref() == Some(text),
                script.hang_on.as_deref() == Some(text),
            )
        };
        self.turns.lock().unwrap().push(Turn::user(text));

        if hang {
            return stream::pending().boxed();
        }
        if fail {
            return stream::iter(vec![
                Ok("partial".to_string()),
                Err(EngineError::Stream("scripted failure".to_string())),
            ])
            .boxed();
        }

        let reply = format!("echo: {}", text);
        let turns = self.turns.clone();
        let record = stream::once(async move {
            turns.lock().unwrap().push(Turn::assistant(reply));
        })
        .filter_map(|()| async { None::<Result<String, EngineError>> });

        stream::iter(vec![Ok("echo: ".to_string()), Ok(text.to_string())])
            .chain(record)
            .boxed()
    }

    fn turns(&self) -> Vec<Turn> {
        self.turns.lock().unwrap().clone()
    }
}

/// UI fed from queued inputs and picks, capturing everything written to it.
#[derive(Default)]
pub(crate) struct ScriptedUi {
    inputs: VecDeque<UserInput>,
    picks: VecDeque<Option<String>>,
    pub printed: Vec<String>,
    pub streamed: Vec<String>,
    pub choices_offered: Vec<(String, Vec<String>)>,
    pub prompts: Vec<String>,
}

impl ScriptedUi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lines(lines: &[&str]) -> Self {
        let mut ui = Self::new();
        for line in lines {
            ui.push_line(line);
        }
        ui
    }

    pub fn push_line(&mut self, line: &str) {
        self.inputs.push_back(UserInput::Line(line.to_string()));
    }

    pub fn push_input(&mut self, input: UserInput) {
        self.inputs.push_back(input);
    }

    pub fn push_pick(&mut self, pick: Option<&str>) {
        self.picks.push_back(pick.map(str::to_string));
    }

    pub fn printed_text(&self) -> String {
        self.printed.join("\n")
    }
}

impl Ui for ScriptedUi {
    fn read_line(&mut self, prompt: &str, _completions: &[String]) -> anyhow::Result<UserInput> {
        self.prompts.push(prompt.to_string());
        Ok(self.inputs.pop_front().unwrap_or(UserInput::Interrupted))
    }

    fn print(&mut self, text: &str) {
        self.printed.push(text.to_string());
    }

    fn choose_one(&mut self, prompt: &str, options: &[String]) -> anyhow::Result<Option<String>> {
        self.choices_offered
            .push((prompt.to_string(), options.to_vec()));
        Ok(self.picks.pop_front().flatten())
    }

    fn stream_start(&mut self) {
        self.streamed.push(String::new());
    }

    fn stream_fragment(&mut self, text: &str) {
        if let Some(last) = self.streamed.last_mut() {
            last.push_str(text);
        }
    }

    fn stream_end(&mut self) {}
}

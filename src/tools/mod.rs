pub mod edit_file;
pub mod read_file;
pub mod todo_write;
pub mod write_file;

use futures_util::future::BoxFuture;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::error::SessionError;

/// A capability the model may invoke. The session core only ever looks at `name()`;
/// the model client uses the definition and executes calls.
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Tool definition in OpenAI function calling format.
    fn definition(&self) -> Value;

    fn execute(&self, args: Value) -> BoxFuture<'_, ToolExecutionResult>;
}

pub type ToolRef = Arc<dyn Tool>;

/// Result from executing a tool, fed back to the model as a `tool` message.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolExecutionResult {
    pub result: String,
    pub is_error: bool,
}

impl ToolExecutionResult {
    pub fn text(result: String) -> Self {
        Self {
            result,
            is_error: false,
        }
    }

    pub fn error(message: impl std::fmt::Display) -> Self {
        Self {
            result: format!("Error: {}", message),
            is_error: true,
        }
    }
}

/// Directory the file tools operate in. Paths handed in by the model are
/// resolved against it and may not climb out of it.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn current_dir() -> Self {
        Self::new(std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    pub fn resolve(&self, path: &str) -> Result<PathBuf, String> {
        if path.trim().is_empty() {
            return Err("No path provided".to_string());
        }
        let candidate = Path::new(path);
        let relative = if candidate.is_absolute() {
            candidate
                .strip_prefix(&self.root)
                .map_err(|_| format!("Path is outside the workspace: {}", path))?
        } else {
            candidate
        };
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return Err(format!("Path is outside the workspace: {}", path));
        }
        Ok(self.root.join(relative))
    }
}

/// Every built-in tool, sharing one workspace. Modes pick from this list by name.
pub fn builtin_tools(workspace: &Workspace) -> Vec<ToolRef> {
    vec![
        Arc::new(read_file::ReadFile::new(workspace.clone())),
        Arc::new(write_file::WriteFile::new(workspace.clone())),
        Arc::new(edit_file::EditFile::new(workspace.clone())),
        Arc::new(todo_write::TodoWrite::default()),
    ]
}

/// Pick tools out of `catalog` by name, preserving the requested order.
pub fn select_tools(catalog: &[ToolRef], names: &[String]) -> Result<Vec<ToolRef>, SessionError> {
    names
        .iter()
        .map(|name| {
            catalog
                .iter()
                .find(|t| t.name() == name)
                .cloned()
                .ok_or_else(|| {
                    let known: Vec<&str> = catalog.iter().map(|t| t.name()).collect();
                    SessionError::Config(format!(
                        "unknown tool \"{}\" (available: {})",
                        name,
                        known.join(", ")
                    ))
                })
        })
        .collect()
}

pub(crate) fn str_arg<'a>(args: &'a Value, key: &str) -> &'a str {
    args.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

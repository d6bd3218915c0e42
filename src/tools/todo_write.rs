use super::{Tool, ToolExecutionResult};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub content: String,
    pub status: TodoStatus,
}

/// Task list the model maintains. The list is shared by every mode holding this
/// tool, so it survives mode switches.
#[derive(Default, Clone)]
pub struct TodoWrite {
    items: Arc<Mutex<Vec<TodoItem>>>,
}

impl TodoWrite {
    pub fn items(&self) -> Vec<TodoItem> {
        self.items.lock().map(|items| items.clone()).unwrap_or_default()
    }

    fn replace(&self, args: Value) -> ToolExecutionResult {
        let todos = match args.get("todos") {
            Some(v) => v.clone(),
            None => return ToolExecutionResult::error("No todos provided"),
        };
        let parsed: Vec<TodoItem> = match serde_json::from_value(todos) {
            Ok(items) => items,
            Err(e) => return ToolExecutionResult::error(format!("invalid todos: {}", e)),
        };

        let rendered = render(&parsed);
        match self.items.lock() {
            Ok(mut items) => *items = parsed,
            Err(e) => return ToolExecutionResult::error(format!("todo list unavailable: {}", e)),
        }
        ToolExecutionResult::text(rendered)
    }
}

fn render(items: &[TodoItem]) -> String {
    if items.is_empty() {
        return "Task list cleared.".to_string();
    }
    let done = items
        .iter()
        .filter(|t| t.status == TodoStatus::Completed)
        .count();
    let mut out = format!("Tasks ({}/{} done):", done, items.len());
    for item in items {
        let mark = match item.status {
            TodoStatus::Pending => "[ ]",
            TodoStatus::InProgress => "[~]",
            TodoStatus::Completed => "[x]",
        };
        out.push_str(&format!("\n{} {}", mark, item.content));
    }
    out
}

impl Tool for TodoWrite {
    fn name(&self) -> &str {
        "todo_write"
    }

    fn definition(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": "todo_write",
                "description": "Create or update a task list to track progress on multi-step work. Each call replaces the entire list.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "todos": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "content": {
                                        "type": "string",
                                        "description": "Description of the task"
                                    },
                                    "status": {
                                        "type": "string",
                                        "enum": ["pending", "in_progress", "completed"],
                                        "description": "Current status of the task"
                                    }
                                },
                                "required": ["content", "status"]
                            },
                            "description": "The complete list of tasks with their current status"
                        }
                    },
                    "required": ["todos"]
                }
            }
        })
    }

    fn execute(&self, args: Value) -> BoxFuture<'_, ToolExecutionResult> {
        let result = self.replace(args);
        Box::pin(async move { result })
    }
}

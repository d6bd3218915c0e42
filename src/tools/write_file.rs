use super::{str_arg, Tool, ToolExecutionResult, Workspace};
use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::fs;

pub struct WriteFile {
    workspace: Workspace,
}

impl WriteFile {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    async fn run(&self, args: Value) -> ToolExecutionResult {
        let path = match self.workspace.resolve(str_arg(&args, "path")) {
            Ok(p) => p,
            Err(e) => return ToolExecutionResult::error(e),
        };
        let content = str_arg(&args, "content");
        let is_new = !path.exists();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent).await {
                    return ToolExecutionResult::error(format!("creating directories: {}", e));
                }
            }
        }

        match fs::write(&path, content).await {
            Ok(_) => ToolExecutionResult::text(format!(
                "{} {} ({} bytes)",
                if is_new { "Created" } else { "Overwrote" },
                path.display(),
                content.len()
            )),
            Err(e) => ToolExecutionResult::error(format!("writing file: {}", e)),
        }
    }
}

impl Tool for WriteFile {
    fn name(&self) -> &str {
        "write_file"
    }

    fn definition(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": "write_file",
                "description": "Create or overwrite a file in the workspace. Parent directories are created. Replaces existing content entirely; use edit_file for partial changes.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "Path relative to the workspace root"
                        },
                        "content": {
                            "type": "string",
                            "description": "The full file content"
                        }
                    },
                    "required": ["path", "content"]
                }
            }
        })
    }

    fn execute(&self, args: Value) -> BoxFuture<'_, ToolExecutionResult> {
        Box::pin(self.run(args))
    }
}

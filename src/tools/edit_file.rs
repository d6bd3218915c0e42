use super::{str_arg, Tool, ToolExecutionResult, Workspace};
use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::fs;

pub struct EditFile {
    workspace: Workspace,
}

impl EditFile {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    async fn run(&self, args: Value) -> ToolExecutionResult {
        let path = match self.workspace.resolve(str_arg(&args, "path")) {
            Ok(p) => p,
            Err(e) => return ToolExecutionResult::error(e),
        };
        let old_str = str_arg(&args, "old_str");
        let new_str = str_arg(&args, "new_str");

        if old_str.is_empty() {
            return ToolExecutionResult::error("old_str must not be empty");
        }

        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ToolExecutionResult::error(format!("File not found: {}", path.display()))
            }
            Err(e) => return ToolExecutionResult::error(format!("reading file: {}", e)),
        };

        match content.matches(old_str).count() {
            0 => ToolExecutionResult::error(format!("old_str not found in {}", path.display())),
            1 => {
                let updated = content.replacen(old_str, new_str, 1);
                match fs::write(&path, updated).await {
                    Ok(_) => ToolExecutionResult::text(format!("Edited {}", path.display())),
                    Err(e) => ToolExecutionResult::error(format!("writing file: {}", e)),
                }
            }
            n => ToolExecutionResult::error(format!(
                "old_str found {} times in {}. It must be unique; add surrounding context.",
                n,
                path.display()
            )),
        }
    }
}

impl Tool for EditFile {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn definition(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": "edit_file",
                "description": "Replace an exact string in a workspace file. old_str must occur exactly once, whitespace included. Preferred over write_file for modifying existing files.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "Path relative to the workspace root"
                        },
                        "old_str": {
                            "type": "string",
                            "description": "The exact text to replace. Must be unique in the file."
                        },
                        "new_str": {
                            "type": "string",
                            "description": "The replacement text"
                        }
                    },
                    "required": ["path", "old_str", "new_str"]
                }
            }
        })
    }

    fn execute(&self, args: Value) -> BoxFuture<'_, ToolExecutionResult> {
        Box::pin(self.run(args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(content: &str) -> (TempDir, EditFile) {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("edit.py"), content).unwrap();
        let tool = EditFile::new(Workspace::new(tmp.path()));
        (tmp, tool)
    }

    #[tokio::test]
    async fn replaces_unique_occurrence() {
        let (tmp, tool) = setup("x = 1\ny = 2\n");
        let out = tool
            .execute(serde_json::json!({"path": "edit.py", "old_str": "y = 2", "new_str": "y = 3"}))
            .await;
        assert!(!out.is_error, "{}", out.result);
        let content = std::fs::read_to_string(tmp.path().join("edit.py")).unwrap();
        assert_eq!(content, "x = 1\ny = 3\n");
    }

    #[tokio::test]
    async fn rejects_ambiguous_match() {
        let (tmp, tool) = setup("a\na\n");
        let out = tool
            .execute(serde_json::json!({"path": "edit.py", "old_str": "a", "new_str": "b"}))
            .await;
        assert!(out.is_error);
        assert!(out.result.contains("2 times"));
        let content = std::fs::read_to_string(tmp.path().join("edit.py")).unwrap();
        assert_eq!(content, "a\na\n");
    }

    #[tokio::test]
    async fn reports_missing_text() {
        let (_tmp, tool) = setup("a\n");
        let out = tool
            .execute(serde_json::json!({"path": "edit.py", "old_str": "zzz", "new_str": "b"}))
            .await;
        assert!(out.result.contains("not found"));
    }
}

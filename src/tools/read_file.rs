use super::{str_arg, Tool, ToolExecutionResult, Workspace};
use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::fs;

const MAX_LINES: usize = 2000;

pub struct ReadFile {
    workspace: Workspace,
}

impl ReadFile {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    async fn run(&self, args: Value) -> ToolExecutionResult {
        let path = match self.workspace.resolve(str_arg(&args, "path")) {
            Ok(p) => p,
            Err(e) => return ToolExecutionResult::error(e),
        };

        if !path.exists() {
            return ToolExecutionResult::error(format!("File not found: {}", path.display()));
        }

        let text = match fs::read_to_string(&path).await {
            Ok(t) => t,
            Err(e) => return ToolExecutionResult::error(format!("reading file: {}", e)),
        };

        let lines: Vec<&str> = text.split('\n').collect();
        let start = args
            .get("start_line")
            .and_then(|v| v.as_u64())
            .map(|v| v.max(1) as usize)
            .unwrap_or(1)
            - 1;
        let end = args
            .get("end_line")
            .and_then(|v| v.as_u64())
            .map(|v| (v as usize).min(lines.len()))
            .unwrap_or(lines.len());

        if start >= end {
            return ToolExecutionResult::error(format!(
                "Empty line range {}..{} (file has {} lines)",
                start + 1,
                end,
                lines.len()
            ));
        }

        let shown = (end - start).min(MAX_LINES);
        let numbered = number_lines(&lines[start..start + shown], start);
        if shown < end - start {
            return ToolExecutionResult::text(format!(
                "{}\n...(range has {} lines, showing first {})",
                numbered,
                end - start,
                MAX_LINES
            ));
        }
        ToolExecutionResult::text(numbered)
    }
}

fn number_lines(lines: &[&str], offset: usize) -> String {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{}\t{}", offset + i + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

impl Tool for ReadFile {
    fn name(&self) -> &str {
        "read_file"
    }

    fn definition(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": "read_file",
                "description": "Read a file from the workspace with line numbers ('1\\tline content'). Output is capped at 2000 lines; use start_line/end_line for large files.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "Path relative to the workspace root"
                        },
                        "start_line": {
                            "type": "number",
                            "description": "First line to show (1-based). Optional."
                        },
                        "end_line": {
                            "type": "number",
                            "description": "Last line to show (1-based, inclusive). Optional."
                        }
                    },
                    "required": ["path"]
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

    #[tokio::test]
    async fn reads_numbered_lines() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "one\ntwo\nthree").unwrap();
        let tool = ReadFile::new(Workspace::new(tmp.path()));

        let out = tool.execute(serde_json::json!({"path": "a.txt"})).await;
        assert!(!out.is_error);
        assert_eq!(out.result, "1\tone\n2\ttwo\n3\tthree");
    }

    #[tokio::test]
    async fn reads_line_range() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "one\ntwo\nthree").unwrap();
        let tool = ReadFile::new(Workspace::new(tmp.path()));

        let out = tool
            .execute(serde_json::json!({"path": "a.txt", "start_line": 2, "end_line": 3}))
            .await;
        assert_eq!(out.result, "2\ttwo\n3\tthree");
    }

    #[tokio::test]
    async fn missing_file_is_an_error_result() {
        let tmp = TempDir::new().unwrap();
        let tool = ReadFile::new(Workspace::new(tmp.path()));

        let out = tool.execute(serde_json::json!({"path": "nope.txt"})).await;
        assert!(out.is_error);
        assert!(out.result.contains("File not found"));
    }
}

//! Built-in coding tools.
//!
//! Standard tools (`read_file`, `write_file`, `execute_command`,
//! `search_files`, `list_files`, `attempt_completion`) for interacting with
//! the local filesystem and shell. Each is constructed via [`AgentTool::new`]
//! and returned as `Arc<dyn Tool>`; `default_registry()` bundles them in a
//! stable registration order.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::SableError;

use super::registry::ToolRegistry;
use super::tool::{AgentTool, ParamType, Tool, ToolParameter};
use super::COMPLETION_TOOL;

const COMMAND_OUTPUT_MAX_BYTES: usize = 32_768;
const READ_FILE_MAX_BYTES: usize = 65_536;
const SEARCH_OUTPUT_MAX_BYTES: usize = 32_768;
const LIST_FILES_MAX_ENTRIES: usize = 500;
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

fn truncate_utf8(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut cutoff = max_bytes;
    while cutoff > 0 && !s.is_char_boundary(cutoff) {
        cutoff -= 1;
    }
    s[..cutoff].to_string()
}

/// Create the `read_file` tool — reads a file as UTF-8 text.
pub fn read_file_tool() -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        "read_file",
        "Read a file's contents as UTF-8 text",
        vec![ToolParameter::required(
            "path",
            ParamType::String,
            "Path to the file to read",
        )],
        |params| async move {
            let path = params.require("read_file", "path")?.to_string();
            let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
                SableError::ToolExecution {
                    tool_name: "read_file".into(),
                    message: format!("{path}: {e}"),
                }
            })?;

            if content.len() > READ_FILE_MAX_BYTES {
                let mut s = truncate_utf8(&content, READ_FILE_MAX_BYTES);
                s.push_str("\n... (truncated)");
                Ok(s)
            } else {
                Ok(content)
            }
        },
    ))
}

/// Create the `write_file` tool — writes content to a file, creating
/// parent directories as needed. Requires permission.
pub fn write_file_tool() -> Arc<dyn Tool> {
    Arc::new(
        AgentTool::new(
            "write_file",
            "Write content to a file, creating parent directories if needed",
            vec![
                ToolParameter::required("path", ParamType::String, "Path to the file to write"),
                ToolParameter::required("content", ParamType::String, "Content to write"),
            ],
            |params| async move {
                let path = params.require("write_file", "path")?.to_string();
                let content = params.require("write_file", "content")?.to_string();

                if let Some(parent) = Path::new(&path).parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await.map_err(|e| {
                            SableError::ToolExecution {
                                tool_name: "write_file".into(),
                                message: format!("{}: {e}", parent.display()),
                            }
                        })?;
                    }
                }

                tokio::fs::write(&path, content.as_bytes()).await.map_err(|e| {
                    SableError::ToolExecution {
                        tool_name: "write_file".into(),
                        message: format!("{path}: {e}"),
                    }
                })?;

                Ok(format!("Wrote {} bytes to {path}", content.len()))
            },
        )
        .with_permission(),
    )
}

/// Create the `execute_command` tool — runs a shell command via `sh -c`.
/// Requires permission. Captures stdout and stderr, applies a 30-second
/// timeout, and truncates output beyond 32 KB.
pub fn execute_command_tool() -> Arc<dyn Tool> {
    Arc::new(
        AgentTool::new(
            "execute_command",
            "Execute a shell command and return its output",
            vec![ToolParameter::required(
                "command",
                ParamType::String,
                "The shell command to execute",
            )],
            |params| async move {
                let command = params.require("execute_command", "command")?.to_string();

                let result = tokio::time::timeout(
                    COMMAND_TIMEOUT,
                    tokio::process::Command::new("sh")
                        .arg("-c")
                        .arg(&command)
                        .output(),
                )
                .await;

                let output = match result {
                    Ok(Ok(output)) => output,
                    Ok(Err(e)) => {
                        return Err(SableError::ToolExecution {
                            tool_name: "execute_command".into(),
                            message: e.to_string(),
                        });
                    }
                    Err(_) => {
                        return Err(SableError::ToolExecution {
                            tool_name: "execute_command".into(),
                            message: format!(
                                "command timed out after {}s",
                                COMMAND_TIMEOUT.as_secs()
                            ),
                        });
                    }
                };

                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                let mut combined = format!("{stdout}{stderr}");
                if combined.len() > COMMAND_OUTPUT_MAX_BYTES {
                    combined = truncate_utf8(&combined, COMMAND_OUTPUT_MAX_BYTES);
                    combined.push_str("\n... (truncated)");
                }

                match output.status.code() {
                    Some(0) | None => Ok(combined),
                    Some(code) => Ok(format!("{combined}\n(exit code {code})")),
                }
            },
        )
        .with_permission(),
    )
}

/// Create the `search_files` tool — regex search over files under a path.
pub fn search_files_tool() -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        "search_files",
        "Search file contents under a directory with a regex pattern",
        vec![
            ToolParameter::required("path", ParamType::String, "Directory to search"),
            ToolParameter::required("pattern", ParamType::String, "Regex pattern"),
        ],
        |params| async move {
            let root = params.require("search_files", "path")?.to_string();
            let pattern = params.require("search_files", "pattern")?.to_string();

            let regex = regex::Regex::new(&pattern).map_err(|e| SableError::ToolExecution {
                tool_name: "search_files".into(),
                message: format!("invalid pattern: {e}"),
            })?;

            let mut out = String::new();
            let mut stack = vec![std::path::PathBuf::from(&root)];
            while let Some(dir) = stack.pop() {
                let mut entries =
                    tokio::fs::read_dir(&dir)
                        .await
                        .map_err(|e| SableError::ToolExecution {
                            tool_name: "search_files".into(),
                            message: format!("{}: {e}", dir.display()),
                        })?;
                while let Ok(Some(entry)) = entries.next_entry().await {
                    let path = entry.path();
                    if path.is_dir() {
                        stack.push(path);
                        continue;
                    }
                    let Ok(content) = tokio::fs::read_to_string(&path).await else {
                        continue; // skip binary/unreadable files
                    };
                    for (lineno, line) in content.lines().enumerate() {
                        if regex.is_match(line) {
                            out.push_str(&format!("{}:{}: {line}\n", path.display(), lineno + 1));
                            if out.len() > SEARCH_OUTPUT_MAX_BYTES {
                                out = truncate_utf8(&out, SEARCH_OUTPUT_MAX_BYTES);
                                out.push_str("\n... (truncated)");
                                return Ok(out);
                            }
                        }
                    }
                }
            }

            if out.is_empty() {
                Ok("No matches found".into())
            } else {
                Ok(out)
            }
        },
    ))
}

/// Create the `list_files` tool — lists directory entries.
pub fn list_files_tool() -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        "list_files",
        "List the entries of a directory",
        vec![ToolParameter::required(
            "path",
            ParamType::String,
            "Directory to list",
        )],
        |params| async move {
            let path = params.require("list_files", "path")?.to_string();
            let mut entries =
                tokio::fs::read_dir(&path)
                    .await
                    .map_err(|e| SableError::ToolExecution {
                        tool_name: "list_files".into(),
                        message: format!("{path}: {e}"),
                    })?;

            let mut names = Vec::new();
            while let Ok(Some(entry)) = entries.next_entry().await {
                let suffix = if entry.path().is_dir() { "/" } else { "" };
                names.push(format!("{}{suffix}", entry.file_name().to_string_lossy()));
                if names.len() >= LIST_FILES_MAX_ENTRIES {
                    names.push("... (truncated)".into());
                    break;
                }
            }
            names.sort();
            Ok(names.join("\n"))
        },
    ))
}

/// Create the `attempt_completion` tool — the reserved completion signal.
///
/// Executing it ends the task; the result parameter is the final answer
/// shown to the user.
pub fn attempt_completion_tool() -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        COMPLETION_TOOL,
        "Present the final result of the task to the user",
        vec![ToolParameter::required(
            "result",
            ParamType::String,
            "The final result of the task",
        )],
        |params| async move {
            Ok(params
                .require(COMPLETION_TOOL, "result")?
                .to_string())
        },
    ))
}

/// All builtin tools in their canonical registration order.
pub fn default_registry() -> ToolRegistry {
    ToolRegistry::new(vec![
        read_file_tool(),
        write_file_tool(),
        execute_command_tool(),
        search_files_tool(),
        list_files_tool(),
        attempt_completion_tool(),
    ])
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Process execution tool.
//!
//! Never invokes a shell interpreter: the raw command is rejected if it
//! contains any shell metacharacter, then split lexically and spawned
//! directly. The primary verb must be on the YAML whitelist, the working
//! directory must be allow-listed, and an absolute execution timeout is
//! always enforced.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::domain::tool::{ArgMap, ParamSpec, ParamType, ToolDescriptor, ToolError, ToolHandler};
use crate::infrastructure::exec_policy::CommandWhitelist;

const SHELL_METACHARACTERS: &[char] = &[';', '|', '&', '>', '<', '`', '$', '(', ')'];
const MAX_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const OUTPUT_CAP: usize = 100_000;

pub struct RunTerminalTool {
    whitelist: Arc<CommandWhitelist>,
    allowed_cwds: Vec<PathBuf>,
    default_cwd: PathBuf,
}

impl RunTerminalTool {
    pub fn new(whitelist: Arc<CommandWhitelist>, allowed_cwds: Vec<PathBuf>) -> Self {
        let default_cwd = allowed_cwds
            .first()
            .cloned()
            .unwrap_or_else(std::env::temp_dir);
        Self {
            whitelist,
            allowed_cwds,
            default_cwd,
        }
    }

    fn resolve_cwd(&self, requested: Option<&str>) -> Result<PathBuf, ToolError> {
        match requested {
            None => Ok(self.default_cwd.clone()),
            Some(raw) => {
                let cwd = PathBuf::from(raw);
                let allowed = self.allowed_cwds.iter().any(|root| cwd.starts_with(root));
                if allowed {
                    Ok(cwd)
                } else {
                    Err(ToolError::PermissionDenied(format!(
                        "Working directory not permitted: {}",
                        raw
                    )))
                }
            }
        }
    }
}

#[async_trait]
impl ToolHandler for RunTerminalTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "run_terminal",
            "Execute a whitelisted shell command and return its output",
            "system",
        )
        .with_param(
            "command",
            ParamSpec::required(ParamType::String, "Command line to execute"),
        )
        .with_param(
            "timeout",
            ParamSpec::optional(ParamType::Integer, "Timeout in seconds (max 60)"),
        )
        .with_param(
            "cwd",
            ParamSpec::optional(ParamType::String, "Working directory (must be allow-listed)"),
        )
        .confirmed()
        .mutating()
    }

    async fn call(&self, args: ArgMap, cancel: CancellationToken) -> Result<Value, ToolError> {
        let command_line = args
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::Validation("Missing required parameter: command".into()))?;

        if let Some(bad) = command_line.chars().find(|c| SHELL_METACHARACTERS.contains(c)) {
            return Err(ToolError::PermissionDenied(format!(
                "Shell metacharacter '{}' not allowed",
                bad
            )));
        }

        let parts = split_lexically(command_line)
            .map_err(|e| ToolError::Validation(format!("Malformed command: {}", e)))?;
        let (verb, rest) = parts
            .split_first()
            .ok_or_else(|| ToolError::Validation("Empty command".into()))?;

        self.whitelist
            .check(verb, rest)
            .map_err(ToolError::PermissionDenied)?;

        let cwd = self.resolve_cwd(args.get("cwd").and_then(|v| v.as_str()))?;
        let timeout = args
            .get("timeout")
            .and_then(|v| v.as_int())
            .map(|secs| Duration::from_secs(secs.clamp(1, MAX_TIMEOUT.as_secs() as i64) as u64))
            .unwrap_or(DEFAULT_TIMEOUT);

        info!(command = %command_line, cwd = %cwd.display(), "Spawning process");

        let mut child = tokio::process::Command::new(verb);
        child
            .args(rest)
            .current_dir(&cwd)
            .kill_on_drop(true)
            .stdin(std::process::Stdio::null());

        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(ToolError::Cancelled),
            outcome = tokio::time::timeout(timeout, child.output()) => match outcome {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => return Err(ToolError::Handler(format!("Spawn failed: {}", e))),
                Err(_) => return Err(ToolError::Timeout),
            },
        };

        let exit_code = output.status.code().unwrap_or(-1);
        Ok(json!({
            "success": output.status.success(),
            "stdout": truncate(&String::from_utf8_lossy(&output.stdout)),
            "stderr": truncate(&String::from_utf8_lossy(&output.stderr)),
            "exit_code": exit_code,
            "command_executed": command_line,
        }))
    }
}

/// Split a command line into tokens, honoring single and double quotes.
/// No expansion of any kind is performed.
pub fn split_lexically(command: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut has_token = false;

    for c in command.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                has_token = true;
            }
            None if c.is_whitespace() => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            None => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if quote.is_some() {
        return Err("unterminated quote".to_string());
    }
    if has_token {
        tokens.push(current);
    }
    Ok(tokens)
}

fn truncate(text: &str) -> String {
    if text.len() <= OUTPUT_CAP {
        return text.to_string();
    }
    let mut cut = OUTPUT_CAP;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}… (output truncated)", &text[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tool::ArgValue;

    fn tool() -> RunTerminalTool {
        let whitelist = Arc::new(CommandWhitelist::load_or_default(
            None,
            &["rm".to_string(), "sudo".to_string()],
        ));
        RunTerminalTool::new(whitelist, vec![std::env::temp_dir()])
    }

    fn command_args(command: &str) -> ArgMap {
        let mut args = ArgMap::new();
        args.insert("command".into(), ArgValue::from(command));
        args
    }

    #[test]
    fn test_split_lexically() {
        assert_eq!(
            split_lexically("ls -la /tmp").unwrap(),
            vec!["ls", "-la", "/tmp"]
        );
        assert_eq!(
            split_lexically("echo \"hello world\"").unwrap(),
            vec!["echo", "hello world"]
        );
        assert_eq!(
            split_lexically("grep -n 'two words' file.txt").unwrap(),
            vec!["grep", "-n", "two words", "file.txt"]
        );
        assert!(split_lexically("echo \"open").is_err());
        assert!(split_lexically("   ").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_echo_runs() {
        let result = tool()
            .call(command_args("echo bonjour"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result["success"], true);
        assert_eq!(result["exit_code"], 0);
        assert!(result["stdout"].as_str().unwrap().contains("bonjour"));
    }

    #[tokio::test]
    async fn test_metacharacters_rejected() {
        for command in ["echo hi; rm -rf /", "ls | wc -l", "echo $(whoami)", "cat < /etc/passwd"] {
            let err = tool()
                .call(command_args(command), CancellationToken::new())
                .await
                .unwrap_err();
            assert!(
                matches!(err, ToolError::PermissionDenied(_)),
                "command: {}",
                command
            );
        }
    }

    #[tokio::test]
    async fn test_verb_not_whitelisted() {
        let err = tool()
            .call(command_args("curl http://example.com"), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Command 'curl' not permitted"
        );
    }

    #[tokio::test]
    async fn test_cwd_must_be_allow_listed() {
        let mut args = command_args("echo hi");
        args.insert("cwd".into(), ArgValue::from("/usr"));
        let err = tool().call(args, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_empty_command_is_validation_error() {
        let err = tool()
            .call(command_args("   "), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
    }

    #[tokio::test]
    async fn test_nonzero_exit_reported() {
        let result = tool()
            .call(command_args("cat /nonexistent-majordomo-file"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result["success"], false);
        assert_ne!(result["exit_code"], 0);
    }
}

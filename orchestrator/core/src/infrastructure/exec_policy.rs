// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Process-execution whitelist.
//!
//! A YAML document `{commands: {name: {description, allowed_args, cwd?}}}`
//! describing which command verbs the terminal tool may spawn. Unknown
//! top-level keys are ignored; command names that are not plain tokens or
//! that collide with the banned-verb set are rejected at load time with a
//! warning. An empty `allowed_args` list means no argument-level
//! restriction (the verb-level allow-list still applies).

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ExecPolicyError {
    #[error("Whitelist I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Whitelist parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub allowed_args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct WhitelistDocument {
    #[serde(default)]
    commands: BTreeMap<String, CommandSpec>,
}

/// The loaded whitelist.
#[derive(Debug, Clone)]
pub struct CommandWhitelist {
    commands: BTreeMap<String, CommandSpec>,
}

impl CommandWhitelist {
    /// Load from a YAML file, dropping invalid command names.
    pub fn load(path: &Path, banned: &[String]) -> Result<Self, ExecPolicyError> {
        let raw = std::fs::read_to_string(path)?;
        let document: WhitelistDocument = serde_yaml::from_str(&raw)?;
        Ok(Self::from_commands(document.commands, banned))
    }

    /// Load from a file when configured, otherwise the built-in defaults.
    pub fn load_or_default(path: Option<&Path>, banned: &[String]) -> Self {
        match path {
            Some(path) => match Self::load(path, banned) {
                Ok(whitelist) => {
                    info!(
                        path = %path.display(),
                        commands = whitelist.commands.len(),
                        "Command whitelist loaded"
                    );
                    whitelist
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Falling back to default whitelist");
                    Self::default_with_banned(banned)
                }
            },
            None => Self::default_with_banned(banned),
        }
    }

    fn from_commands(commands: BTreeMap<String, CommandSpec>, banned: &[String]) -> Self {
        let mut kept = BTreeMap::new();
        for (name, spec) in commands {
            if !is_plain_token(&name) {
                warn!(command = %name, "Rejecting whitelist entry: not a plain token");
                continue;
            }
            if banned.iter().any(|b| b == &name) {
                warn!(command = %name, "Rejecting whitelist entry: banned verb");
                continue;
            }
            kept.insert(name, spec);
        }
        Self { commands: kept }
    }

    fn default_with_banned(banned: &[String]) -> Self {
        let mut commands = BTreeMap::new();
        let entries: &[(&str, &str, &[&str])] = &[
            ("ls", "List files", &["-la", "-lh", "-R", "-a", "-l"]),
            ("pwd", "Print working directory", &[]),
            ("echo", "Print text", &[]),
            ("date", "Print date/time", &[]),
            ("whoami", "Print current user", &[]),
            ("hostname", "Print host name", &[]),
            ("find", "Find files", &["-name", "-type", "-maxdepth"]),
            ("cat", "Print file contents", &[]),
            ("grep", "Search in files", &["-r", "-i", "-n", "-v", "-E"]),
            ("head", "First lines of a file", &["-n"]),
            ("tail", "Last lines of a file", &["-n"]),
            ("wc", "Count lines/words", &["-l", "-w", "-c"]),
            ("df", "Disk usage", &["-h"]),
            ("uptime", "System uptime", &[]),
            ("uname", "Kernel information", &["-a"]),
        ];
        for (name, description, args) in entries {
            commands.insert(
                name.to_string(),
                CommandSpec {
                    description: description.to_string(),
                    allowed_args: args.iter().map(|s| s.to_string()).collect(),
                    cwd: None,
                },
            );
        }
        Self::from_commands(commands, banned)
    }

    pub fn commands(&self) -> &BTreeMap<String, CommandSpec> {
        &self.commands
    }

    /// Check a split command against the whitelist.
    ///
    /// Flag-shaped arguments must appear in `allowed_args` when that list is
    /// non-empty; positional arguments (paths, values) pass through.
    pub fn check(&self, command: &str, args: &[String]) -> Result<(), String> {
        let spec = self
            .commands
            .get(command)
            .ok_or_else(|| format!("Command '{}' not permitted", command))?;

        if !spec.allowed_args.is_empty() {
            for arg in args {
                if arg.starts_with('-') && !spec.allowed_args.contains(arg) {
                    return Err(format!(
                        "Argument '{}' not permitted for '{}'",
                        arg, command
                    ));
                }
            }
        }
        Ok(())
    }
}

fn is_plain_token(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn banned() -> Vec<String> {
        ["rm", "sudo", "kill"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_default_whitelist() {
        let whitelist = CommandWhitelist::load_or_default(None, &banned());
        assert!(whitelist.check("ls", &["-la".into()]).is_ok());
        assert!(whitelist.check("pwd", &[]).is_ok());
        assert!(whitelist.check("rm", &[]).is_err());
    }

    #[test]
    fn test_argument_restriction() {
        let whitelist = CommandWhitelist::load_or_default(None, &banned());
        assert!(whitelist.check("ls", &["--color=always".into()]).is_err());
        // Positional arguments are not flag-checked.
        assert!(whitelist.check("ls", &["/tmp".into()]).is_ok());
    }

    #[test]
    fn test_empty_allowed_args_means_unrestricted() {
        let whitelist = CommandWhitelist::load_or_default(None, &banned());
        assert!(whitelist.check("echo", &["-n".into(), "hi".into()]).is_ok());
    }

    #[test]
    fn test_load_from_yaml_ignores_unknown_top_level_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "version: 3\ncommands:\n  ls:\n    description: list\n    allowed_args: [\"-l\"]\n"
        )
        .unwrap();

        let whitelist = CommandWhitelist::load(file.path(), &banned()).unwrap();
        assert_eq!(whitelist.commands().len(), 1);
        assert!(whitelist.check("ls", &["-l".into()]).is_ok());
    }

    #[test]
    fn test_banned_and_malformed_names_rejected_at_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "commands:\n  rm:\n    description: nope\n  \"bad name\":\n    description: nope\n  ls:\n    description: ok\n"
        )
        .unwrap();

        let whitelist = CommandWhitelist::load(file.path(), &banned()).unwrap();
        assert_eq!(whitelist.commands().len(), 1);
        assert!(whitelist.commands().contains_key("ls"));
    }
}

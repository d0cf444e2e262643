// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Security policy and permission engine.
//!
//! A pure decision function from (principal, action, arguments) to a
//! [`PermissionVerdict`]. Three disjoint action classes are configured
//! statically; argument inspection runs first and dominates class
//! screening, so a normally confirmable action whose arguments trip a
//! banned pattern is denied outright. Unknown actions default to
//! requires-confirmation at medium risk.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Action classification, argument screening, risk assessment

use std::collections::HashSet;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::tool::ArgMap;

/// Ordered risk label assigned to every decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
    Critical,
}

/// The decision for a single action. Deny means no side effect may occur.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionVerdict {
    pub allow: bool,
    pub risk: RiskLevel,
    pub requires_confirmation: bool,
    pub reason: String,
}

impl PermissionVerdict {
    fn deny(risk: RiskLevel, reason: String) -> Self {
        Self {
            allow: false,
            risk,
            requires_confirmation: false,
            reason,
        }
    }

    fn allow(risk: RiskLevel, requires_confirmation: bool, reason: String) -> Self {
        Self {
            allow: true,
            risk,
            requires_confirmation,
            reason,
        }
    }
}

/// Static security policy: the three action classes plus the argument-level
/// screens (banned command verbs, protected directories, safe read
/// extensions).
#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    pub safe_actions: HashSet<String>,
    pub requires_confirmation: HashSet<String>,
    pub forbidden_actions: HashSet<String>,
    pub safe_file_extensions: HashSet<String>,
    pub protected_directories: Vec<String>,
    pub banned_commands: Vec<String>,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        let set = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<HashSet<_>>();
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        Self {
            safe_actions: set(&[
                "list_apps",
                "list_directory",
                "read_file",
                "find_files",
                "search_files",
                "get_file_info",
                "get_system_info",
                "get_running_apps",
                "learn_knowledge",
                "search",
                "current",
            ]),
            requires_confirmation: set(&[
                "open_app",
                "close_app",
                "execute_script",
                "run_terminal",
                "write_file",
                "minimize_app",
                "focus_app",
                "play",
                "pause",
                "skip",
                "volume",
            ]),
            forbidden_actions: set(&[
                "delete_file",
                "format_disk",
                "shutdown",
                "reboot",
                "kill_process",
                "modify_system",
            ]),
            safe_file_extensions: set(&[
                ".txt", ".md", ".json", ".yaml", ".yml", ".toml", ".ini", ".py", ".js", ".ts",
                ".java", ".c", ".cpp", ".h", ".go", ".rs", ".sh", ".bash", ".zsh", ".fish",
                ".html", ".css", ".scss", ".xml", ".svg", ".log", ".conf", ".config", ".env",
            ]),
            protected_directories: list(&[
                "/System",
                "/Library/System",
                "/private/var/db",
                "/etc",
                "/bin",
                "/sbin",
                "/usr/bin",
                "/usr/sbin",
            ]),
            banned_commands: list(&[
                "rm", "rmdir", "dd", "mkfs", "fdisk", "shutdown", "reboot", "halt", "kill",
                "killall", "pkill", "sudo", "su",
            ]),
        }
    }
}

/// The permission engine. Stateless apart from the compiled banned-verb
/// pattern; it never dispatches confirmations itself.
pub struct PermissionEngine {
    policy: SecurityPolicy,
    banned_pattern: Regex,
}

impl PermissionEngine {
    pub fn new(policy: SecurityPolicy) -> Self {
        // Word-boundary match: start-of-string, whitespace or a shell
        // separator on both sides, so "rm" matches but "transform" does not.
        // Verbs are escaped, so the alternation of literals always compiles.
        let alternation = policy
            .banned_commands
            .iter()
            .map(|verb| regex::escape(verb))
            .collect::<Vec<_>>()
            .join("|");
        let banned_pattern =
            Regex::new(&format!(r"(?:^|[\s;|&])({})(?:[\s;|&]|$)", alternation)).unwrap();
        Self {
            policy,
            banned_pattern,
        }
    }

    pub fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }

    /// Decide whether `principal` may run `action` with `args`.
    pub fn check(&self, principal: &str, action: &str, args: &ArgMap) -> PermissionVerdict {
        // Argument inspection first: it dominates action-class screening.
        if let Some(reason) = self.screen_arguments(action, args) {
            tracing::warn!(principal = %principal, action = %action, reason = %reason, "Argument screen denied action");
            return PermissionVerdict::deny(RiskLevel::Critical, reason);
        }

        if self.policy.forbidden_actions.contains(action) {
            return PermissionVerdict::deny(
                RiskLevel::Critical,
                format!("Action '{}' is forbidden", action),
            );
        }

        let risk = self.assess_risk(action, args);

        if self.policy.requires_confirmation.contains(action) {
            return PermissionVerdict::allow(
                risk,
                true,
                format!("Action '{}' requires user confirmation", action),
            );
        }

        if self.policy.safe_actions.contains(action) {
            return PermissionVerdict::allow(
                risk,
                false,
                "Safe action, no confirmation required".to_string(),
            );
        }

        // Unknown actions never slip through silently.
        PermissionVerdict::allow(
            RiskLevel::Medium,
            true,
            format!("Unknown action '{}', confirmation required", action),
        )
    }

    /// Scan a raw command string for banned verbs at word boundaries.
    pub fn contains_banned_verb(&self, command: &str) -> Option<String> {
        self.banned_pattern
            .captures(&command.to_ascii_lowercase())
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    fn screen_arguments(&self, action: &str, args: &ArgMap) -> Option<String> {
        match action {
            "read_file" | "write_file" | "get_file_info" => {
                let path = string_arg(args, &["path", "file_path"])?;
                self.screen_path(action, path)
            }
            "execute_script" | "run_terminal" => {
                let command = string_arg(args, &["command", "script"])?;
                self.contains_banned_verb(command)
                    .map(|verb| format!("Command '{}' not permitted", verb))
            }
            _ => None,
        }
    }

    fn screen_path(&self, action: &str, path: &str) -> Option<String> {
        if path.contains("..") {
            return Some("Path traversal detected".to_string());
        }
        for protected in &self.policy.protected_directories {
            if path.starts_with(protected.as_str()) {
                return Some(format!("Protected system directory: {}", protected));
            }
        }
        if action == "read_file" {
            if let Some(ext) = Path::new(path).extension() {
                let dotted = format!(".{}", ext.to_string_lossy().to_lowercase());
                if !self.policy.safe_file_extensions.contains(&dotted) {
                    return Some(format!("Extension '{}' not allowed for reading", dotted));
                }
            }
        }
        None
    }

    /// Risk is a monotone function of action class and argument sensitivity.
    fn assess_risk(&self, action: &str, args: &ArgMap) -> RiskLevel {
        if self.policy.forbidden_actions.contains(action) {
            return RiskLevel::Critical;
        }
        if matches!(action, "execute_script" | "run_terminal" | "close_app") {
            return RiskLevel::High;
        }
        if action == "open_app" {
            return RiskLevel::Low;
        }
        if action == "read_file" {
            if let Some(path) = string_arg(args, &["path", "file_path"]) {
                let sensitive = self
                    .policy
                    .protected_directories
                    .iter()
                    .any(|p| path.starts_with(p.as_str()));
                if sensitive {
                    return RiskLevel::Medium;
                }
            }
            return RiskLevel::Low;
        }
        if self.policy.requires_confirmation.contains(action) {
            return RiskLevel::Medium;
        }
        if action.starts_with("get_") || action.starts_with("list_") {
            return RiskLevel::Safe;
        }
        if self.policy.safe_actions.contains(action) {
            return RiskLevel::Safe;
        }
        RiskLevel::Medium
    }
}

impl Default for PermissionEngine {
    fn default() -> Self {
        Self::new(SecurityPolicy::default())
    }
}

fn string_arg<'a>(args: &'a ArgMap, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| args.get(*k).and_then(|v| v.as_str()))
}

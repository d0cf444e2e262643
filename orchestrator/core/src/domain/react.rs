// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Reason–act–observe vocabulary and the planner-output grammar.
//!
//! The planner is an external collaborator whose output is untrusted text.
//! This module turns that text into structured values with a total parse:
//! every well-formed response yields an [`Action`] or an answer, every
//! ill-formed one yields a diagnostic, and nothing panics.
//!
//! Grammar (section headers matched case-insensitively):
//!
//! ```text
//! Response   := Thought (Action | Answer)
//! Thought    := "Thought:" Text-until-(Action|Answer|EOF)
//! Action     := "Action:" Name "(" ArgList? ")"
//! ArgList    := Arg ("," Arg)*
//! Arg        := Name "=" (QuotedString | Bareword)
//! Answer     := "Answer:" Text-until-EOF
//! ```
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Action/Observation value objects and strict response parsing

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::tool::{ArgMap, ArgValue};

/// Outcome class of an executed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Success,
    Failure,
    Cancelled,
}

/// A structured request to invoke a tool, produced by the agent and
/// consumed exactly once by the invocation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub tool_name: String,
    pub arguments: ArgMap,
    /// The `Thought:` text that led to this action.
    pub reasoning: String,
}

impl Action {
    pub fn new(tool_name: &str, arguments: ArgMap) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            arguments,
            reasoning: String::new(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = self
            .arguments
            .iter()
            .map(|(k, v)| format!("{}={}", k, v.render()))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{}({})", self.tool_name, args)
    }
}

/// The outcome of an [`Action`], fed back to the agent.
///
/// Exactly one of `result`/`error` is set, matching `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub action: Action,
    pub status: ActionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Error-taxonomy name when `status` is not success (e.g. `"Timeout"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub duration: Duration,
}

impl Observation {
    pub fn success(action: Action, result: Value, duration: Duration) -> Self {
        Self {
            action,
            status: ActionStatus::Success,
            result: Some(result),
            error: None,
            error_kind: None,
            duration,
        }
    }

    pub fn failed(
        action: Action,
        status: ActionStatus,
        error: String,
        kind: &str,
        duration: Duration,
    ) -> Self {
        Self {
            action,
            status,
            result: None,
            error: Some(error),
            error_kind: Some(kind.to_string()),
            duration,
        }
    }

    /// Render for the planner prompt, mirroring how results are narrated.
    pub fn summary(&self) -> String {
        match self.status {
            ActionStatus::Success => {
                let rendered = self
                    .result
                    .as_ref()
                    .map(render_result)
                    .unwrap_or_else(|| "ok".to_string());
                format!("{}: {}", self.action.tool_name, rendered)
            }
            _ => format!(
                "{} failed: {}",
                self.action.tool_name,
                self.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}

fn render_result(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One full step of the reason/act/observe cycle, recorded in the run trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactStep {
    pub step: usize,
    pub thought: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation: Option<Observation>,
    /// Diagnostic fed back to the planner when its output was malformed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

/// Structured form of a planner response.
#[derive(Debug, Clone)]
pub enum PlannerReply {
    /// A final `Answer:` block terminates the run.
    Answer { thought: String, text: String },
    /// An `Action:` line to route through the invocation pipeline.
    Act { thought: String, action: Action },
    /// Output that matches neither production; consumes a step.
    Malformed { thought: String, diagnostic: String },
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("Malformed action call: {0}")]
    Malformed(String),
}

/// Parse a raw planner response. Total: never fails, never panics.
///
/// `Answer:` anywhere in the response terminates the run; otherwise the
/// first `Action:` line is decoded. Anything else is [`PlannerReply::Malformed`].
pub fn parse_planner_reply(raw: &str) -> PlannerReply {
    let thought = extract_thought(raw);

    if let Some(idx) = find_header(raw, "answer:") {
        let text = raw[idx + "answer:".len()..].trim().to_string();
        return PlannerReply::Answer { thought, text };
    }

    match find_header(raw, "action:") {
        Some(idx) => {
            let rest = &raw[idx + "action:".len()..];
            // The action call ends at the line break; arguments never span lines.
            let line = rest.lines().next().unwrap_or("").trim();
            match parse_action_call(line) {
                Ok((name, arguments)) => {
                    let mut action = Action::new(&name, arguments);
                    action.reasoning = thought.clone();
                    PlannerReply::Act { thought, action }
                }
                Err(e) => PlannerReply::Malformed {
                    thought,
                    diagnostic: e.to_string(),
                },
            }
        }
        None => PlannerReply::Malformed {
            thought,
            diagnostic: "Response contains neither an Action nor an Answer".to_string(),
        },
    }
}

/// Extract the `Thought:` text (may be empty) up to the next section header.
fn extract_thought(raw: &str) -> String {
    let Some(start) = find_header(raw, "thought:") else {
        return String::new();
    };
    let body = &raw[start + "thought:".len()..];
    let end = find_header(body, "action:")
        .into_iter()
        .chain(find_header(body, "answer:"))
        .min()
        .unwrap_or(body.len());
    body[..end].trim().to_string()
}

/// Case-insensitive search for a section header.
fn find_header(haystack: &str, header: &str) -> Option<usize> {
    let lower = haystack.to_ascii_lowercase();
    lower.find(header)
}

/// Parse a textual call of the form `name(k1="v1", k2=v2)`.
pub fn parse_action_call(call: &str) -> Result<(String, ArgMap), ParseError> {
    let call = call.trim();
    let open = call
        .find('(')
        .ok_or_else(|| ParseError::Malformed(format!("missing '(' in '{}'", call)))?;
    if !call.ends_with(')') {
        return Err(ParseError::Malformed(format!("missing ')' in '{}'", call)));
    }

    let name = call[..open].trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ParseError::Malformed(format!(
            "invalid tool name '{}'",
            name
        )));
    }

    let args_str = &call[open + 1..call.len() - 1];
    let arguments = parse_arguments(args_str)?;
    Ok((name.to_string(), arguments))
}

/// Parse the argument list of a textual call.
///
/// Whitespace-tolerant. Quoted strings keep their literal content; bare
/// `true`/`false` become booleans; bare decimal digits become integers;
/// any other bare token remains a string.
pub fn parse_arguments(args_str: &str) -> Result<ArgMap, ParseError> {
    let mut arguments = ArgMap::new();
    let mut chars = args_str.char_indices().peekable();

    loop {
        skip_whitespace(&mut chars);
        if chars.peek().is_none() {
            break;
        }

        let key = lex_identifier(args_str, &mut chars)?;
        skip_whitespace(&mut chars);
        match chars.next() {
            Some((_, '=')) => {}
            _ => {
                return Err(ParseError::Malformed(format!(
                    "expected '=' after parameter '{}'",
                    key
                )))
            }
        }
        skip_whitespace(&mut chars);

        let value = match chars.peek() {
            Some((_, quote @ ('"' | '\''))) => {
                let quote = *quote;
                chars.next();
                lex_quoted(&mut chars, quote)?
            }
            Some(_) => lex_bareword(&mut chars),
            None => {
                return Err(ParseError::Malformed(format!(
                    "missing value for parameter '{}'",
                    key
                )))
            }
        };

        arguments.insert(key, value);

        skip_whitespace(&mut chars);
        match chars.next() {
            Some((_, ',')) => continue,
            Some((_, c)) => {
                return Err(ParseError::Malformed(format!(
                    "unexpected character '{}' in argument list",
                    c
                )))
            }
            None => break,
        }
    }

    Ok(arguments)
}

fn skip_whitespace(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>) {
    while matches!(chars.peek(), Some((_, c)) if c.is_whitespace()) {
        chars.next();
    }
}

fn lex_identifier(
    source: &str,
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
) -> Result<String, ParseError> {
    let mut ident = String::new();
    while let Some((_, c)) = chars.peek() {
        if c.is_ascii_alphanumeric() || *c == '_' {
            ident.push(*c);
            chars.next();
        } else {
            break;
        }
    }
    if ident.is_empty() {
        return Err(ParseError::Malformed(format!(
            "expected parameter name in '{}'",
            source
        )));
    }
    Ok(ident)
}

fn lex_quoted(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    quote: char,
) -> Result<ArgValue, ParseError> {
    let mut content = String::new();
    for (_, c) in chars.by_ref() {
        if c == quote {
            return Ok(ArgValue::Str(content));
        }
        content.push(c);
    }
    Err(ParseError::Malformed("unterminated quoted string".into()))
}

fn lex_bareword(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>) -> ArgValue {
    let mut token = String::new();
    while let Some((_, c)) = chars.peek() {
        if *c == ',' || c.is_whitespace() {
            break;
        }
        token.push(*c);
        chars.next();
    }
    classify_bareword(&token)
}

fn classify_bareword(token: &str) -> ArgValue {
    match token.to_ascii_lowercase().as_str() {
        "true" => return ArgValue::Bool(true),
        "false" => return ArgValue::Bool(false),
        _ => {}
    }
    let digits = token.strip_prefix('-').unwrap_or(token);
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(n) = token.parse::<i64>() {
            return ArgValue::Int(n);
        }
    }
    ArgValue::Str(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_thought_and_action() {
        let raw = "Thought: I need to search.\nAction: search_files(query=\"report\", limit=10)";
        match parse_planner_reply(raw) {
            PlannerReply::Act { thought, action } => {
                assert_eq!(thought, "I need to search.");
                assert_eq!(action.tool_name, "search_files");
                assert_eq!(
                    action.arguments.get("query").unwrap().as_str(),
                    Some("report")
                );
                assert_eq!(action.arguments.get("limit").unwrap().as_int(), Some(10));
                assert_eq!(action.reasoning, "I need to search.");
            }
            other => panic!("expected Act, got {:?}", other),
        }
    }

    #[test]
    fn test_answer_terminates_even_with_action_present() {
        let raw = "Thought: done.\nAnswer: Paris is the capital.\nAction: search_files(query=\"x\")";
        match parse_planner_reply(raw) {
            PlannerReply::Answer { text, .. } => {
                assert!(text.starts_with("Paris is the capital."));
            }
            other => panic!("expected Answer, got {:?}", other),
        }
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let raw = "THOUGHT: ok\nANSWER: fine";
        match parse_planner_reply(raw) {
            PlannerReply::Answer { thought, text } => {
                assert_eq!(thought, "ok");
                assert_eq!(text, "fine");
            }
            other => panic!("expected Answer, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_thought_is_allowed() {
        let raw = "Action: list_directory(path=\"/tmp\")";
        match parse_planner_reply(raw) {
            PlannerReply::Act { thought, action } => {
                assert!(thought.is_empty());
                assert_eq!(action.tool_name, "list_directory");
            }
            other => panic!("expected Act, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_output_is_diagnosed_not_fatal() {
        for raw in [
            "I will just ramble without structure",
            "Thought: hm\nAction: broken(((",
            "Thought: hm\nAction: name(k=)",
            "Action: (no_name=1)",
        ] {
            match parse_planner_reply(raw) {
                PlannerReply::Malformed { diagnostic, .. } => {
                    assert!(!diagnostic.is_empty(), "raw: {}", raw)
                }
                other => panic!("expected Malformed for {:?}, got {:?}", raw, other),
            }
        }
    }

    #[test]
    fn test_argument_type_coercion() {
        let (_, args) =
            parse_action_call("run(cmd=\"ls -la\", fast=true, count=3, label=v2)").unwrap();
        assert_eq!(args.get("cmd").unwrap().as_str(), Some("ls -la"));
        assert_eq!(args.get("fast").unwrap().as_bool(), Some(true));
        assert_eq!(args.get("count").unwrap().as_int(), Some(3));
        assert_eq!(args.get("label").unwrap().as_str(), Some("v2"));
    }

    #[test]
    fn test_single_quoted_strings() {
        let (_, args) = parse_action_call("note(text='hello, world')").unwrap();
        assert_eq!(args.get("text").unwrap().as_str(), Some("hello, world"));
    }

    #[test]
    fn test_whitespace_tolerance() {
        let (name, args) = parse_action_call("  search_files ( query = \"a b\" ,  limit = 5 ) ")
            .expect("whitespace-tolerant parse");
        assert_eq!(name, "search_files");
        assert_eq!(args.get("limit").unwrap().as_int(), Some(5));
    }

    #[test]
    fn test_empty_argument_list() {
        let (name, args) = parse_action_call("get_system_info()").unwrap();
        assert_eq!(name, "get_system_info");
        assert!(args.is_empty());
    }

    #[test]
    fn test_unterminated_quote_is_malformed() {
        let err = parse_action_call("read_file(path=\"/tmp/x").unwrap_err();
        assert!(matches!(err, ParseError::Malformed(_)));
    }

    #[test]
    fn test_quoted_content_is_literal() {
        let (_, args) = parse_action_call("echo(text=\"true\")").unwrap();
        // Quoting suppresses coercion.
        assert_eq!(args.get("text").unwrap().as_str(), Some("true"));
    }

    #[test]
    fn test_negative_integers_parse() {
        let (_, args) = parse_action_call("adjust(delta=-5)").unwrap();
        assert_eq!(args.get("delta").unwrap().as_int(), Some(-5));
    }

    #[test]
    fn test_action_display_round_trips_through_parser() {
        let mut args = ArgMap::new();
        args.insert("path".into(), ArgValue::from("/tmp/x"));
        args.insert("limit".into(), ArgValue::from(3));
        let action = Action::new("read_file", args);

        let (name, parsed) = parse_action_call(&action.to_string()).unwrap();
        assert_eq!(name, "read_file");
        assert_eq!(parsed, action.arguments);
    }

    #[test]
    fn test_observation_summary() {
        let action = Action::new("read_file", ArgMap::new());
        let ok = Observation::success(
            action.clone(),
            serde_json::json!("42 lines"),
            Duration::from_millis(5),
        );
        assert_eq!(ok.summary(), "read_file: 42 lines");

        let bad = Observation::failed(
            action,
            ActionStatus::Failure,
            "boom".into(),
            "HandlerError",
            Duration::from_millis(5),
        );
        assert!(bad.summary().contains("failed: boom"));
    }
}

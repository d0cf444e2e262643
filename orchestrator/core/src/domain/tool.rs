// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Tool contracts
//!
//! Defines the uniform contract every capability exposes to the orchestrator:
//! a descriptor (name, parameter schema, confirmation/mutation flags) and an
//! async handler invoked with a validated argument map.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Tool descriptors, argument values, and the invocation error taxonomy

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain::audit::AuditStatus;
use crate::domain::react::ActionStatus;

/// A scalar argument value produced by the planner-output grammar.
///
/// The closed set mirrors the coercion rules: quoted text stays a string,
/// bare `true`/`false` become booleans, bare decimal digits become integers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl ArgValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ArgValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Render the value the way it appeared in a textual call.
    pub fn render(&self) -> String {
        match self {
            ArgValue::Bool(b) => b.to_string(),
            ArgValue::Int(n) => n.to_string(),
            ArgValue::Str(s) => format!("\"{}\"", s),
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Bool(b) => write!(f, "{}", b),
            ArgValue::Int(n) => write!(f, "{}", n),
            ArgValue::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        ArgValue::Str(s.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        ArgValue::Str(s)
    }
}

impl From<i64> for ArgValue {
    fn from(n: i64) -> Self {
        ArgValue::Int(n)
    }
}

impl From<bool> for ArgValue {
    fn from(b: bool) -> Self {
        ArgValue::Bool(b)
    }
}

/// Argument map for a tool call. Ordered so listings and digests are
/// deterministic.
pub type ArgMap = BTreeMap<String, ArgValue>;

/// Declared type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Boolean,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::String => write!(f, "string"),
            ParamType::Integer => write!(f, "integer"),
            ParamType::Boolean => write!(f, "boolean"),
        }
    }
}

/// Schema entry for a single tool parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

impl ParamSpec {
    pub fn required(param_type: ParamType, description: &str) -> Self {
        Self {
            param_type,
            required: true,
            description: description.to_string(),
        }
    }

    pub fn optional(param_type: ParamType, description: &str) -> Self {
        Self {
            param_type,
            required: false,
            description: description.to_string(),
        }
    }
}

/// Immutable description of a registered capability.
///
/// The parameter schema is a `BTreeMap` so `describe()` output is
/// byte-identical across registrations of the same catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: BTreeMap<String, ParamSpec>,
    pub category: String,
    /// The broker is always consulted before this handler runs.
    pub requires_confirmation: bool,
    /// Whether invoking the handler can mutate externally observable state.
    pub mutates: bool,
}

impl ToolDescriptor {
    pub fn new(name: &str, description: &str, category: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters: BTreeMap::new(),
            category: category.to_string(),
            requires_confirmation: false,
            mutates: false,
        }
    }

    pub fn with_param(mut self, name: &str, spec: ParamSpec) -> Self {
        self.parameters.insert(name.to_string(), spec);
        self
    }

    pub fn confirmed(mut self) -> Self {
        self.requires_confirmation = true;
        self
    }

    pub fn mutating(mut self) -> Self {
        self.mutates = true;
        self
    }

    /// One-line signature used in the planner catalog, e.g.
    /// `read_file(path: string, encoding: string)`.
    pub fn signature(&self) -> String {
        let params = self
            .parameters
            .iter()
            .map(|(name, spec)| format!("{}: {}", name, spec.param_type))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({})", self.name, params)
    }
}

/// Errors raised along the invocation path.
///
/// Every variant maps to an [`ActionStatus`] for the observation fed back to
/// the agent and an [`AuditStatus`] for the audit record.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool '{0}' not found")]
    UnknownTool(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    PermissionDenied(String),

    #[error("Confirmation rejected by user")]
    ConfirmationRejected,

    #[error("Confirmation timed out")]
    ConfirmationTimeout,

    #[error("Tool handler failed: {0}")]
    Handler(String),

    #[error("Remote service unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolError {
    /// Taxonomy name surfaced in API error bodies (`{error, kind}`).
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::UnknownTool(_) => "UnknownTool",
            ToolError::Validation(_) => "ValidationError",
            ToolError::PermissionDenied(_) => "PermissionDenied",
            ToolError::ConfirmationRejected => "ConfirmationRejected",
            ToolError::ConfirmationTimeout => "ConfirmationTimeout",
            ToolError::Handler(_) => "HandlerError",
            ToolError::RemoteUnavailable(_) => "RemoteUnavailable",
            ToolError::Timeout => "Timeout",
            ToolError::Cancelled => "Cancelled",
            ToolError::Internal(_) => "Internal",
        }
    }

    /// Observation status fed back to the agent.
    pub fn action_status(&self) -> ActionStatus {
        match self {
            ToolError::ConfirmationRejected
            | ToolError::ConfirmationTimeout
            | ToolError::Cancelled => ActionStatus::Cancelled,
            _ => ActionStatus::Failure,
        }
    }

    /// Status recorded in the audit log. Rejected confirmations and policy
    /// denials count as `denied`; expiries and cancellations as `cancelled`.
    pub fn audit_status(&self) -> AuditStatus {
        match self {
            ToolError::PermissionDenied(_) | ToolError::ConfirmationRejected => AuditStatus::Denied,
            ToolError::ConfirmationTimeout | ToolError::Cancelled => AuditStatus::Cancelled,
            _ => AuditStatus::Error,
        }
    }
}

/// Validate an argument map against a descriptor's schema.
///
/// Unknown keys are rejected, required keys enforced, and string literals
/// coerced to booleans (`"true"`/`"false"`, case-insensitive) or decimal
/// integers where the schema asks for them. Returns the coerced map.
pub fn validate_args(descriptor: &ToolDescriptor, args: &ArgMap) -> Result<ArgMap, ToolError> {
    for key in args.keys() {
        if !descriptor.parameters.contains_key(key) {
            return Err(ToolError::Validation(format!(
                "Unknown parameter '{}' for tool '{}'",
                key, descriptor.name
            )));
        }
    }

    let mut coerced = ArgMap::new();
    for (name, spec) in &descriptor.parameters {
        match args.get(name) {
            Some(value) => {
                coerced.insert(name.clone(), coerce(name, spec.param_type, value)?);
            }
            None if spec.required => {
                return Err(ToolError::Validation(format!(
                    "Missing required parameter: {}",
                    name
                )));
            }
            None => {}
        }
    }
    Ok(coerced)
}

fn coerce(name: &str, expected: ParamType, value: &ArgValue) -> Result<ArgValue, ToolError> {
    let mismatch = || {
        ToolError::Validation(format!(
            "Parameter '{}' expects {}, got '{}'",
            name, expected, value
        ))
    };

    match (expected, value) {
        (ParamType::String, ArgValue::Str(_)) => Ok(value.clone()),
        // Scalars flatten into strings without loss.
        (ParamType::String, ArgValue::Int(n)) => Ok(ArgValue::Str(n.to_string())),
        (ParamType::String, ArgValue::Bool(b)) => Ok(ArgValue::Str(b.to_string())),
        (ParamType::Integer, ArgValue::Int(_)) => Ok(value.clone()),
        (ParamType::Integer, ArgValue::Str(s)) => s
            .trim()
            .parse::<i64>()
            .map(ArgValue::Int)
            .map_err(|_| mismatch()),
        (ParamType::Boolean, ArgValue::Bool(_)) => Ok(value.clone()),
        (ParamType::Boolean, ArgValue::Str(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(ArgValue::Bool(true)),
            "false" => Ok(ArgValue::Bool(false)),
            _ => Err(mismatch()),
        },
        _ => Err(mismatch()),
    }
}

/// The contract every capability implements.
///
/// Handlers receive an argument map already validated against their schema.
/// Handlers that can observe cancellation must propagate the token into
/// long-running work; the registry additionally enforces the deadline.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    async fn call(&self, args: ArgMap, cancel: CancellationToken) -> Result<Value, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new("read_file", "Read the contents of a file", "files")
            .with_param("path", ParamSpec::required(ParamType::String, "Path to read"))
            .with_param(
                "limit",
                ParamSpec::optional(ParamType::Integer, "Maximum bytes"),
            )
            .with_param(
                "show_hidden",
                ParamSpec::optional(ParamType::Boolean, "Include hidden entries"),
            )
    }

    #[test]
    fn test_validate_accepts_wellformed_args() {
        let mut args = ArgMap::new();
        args.insert("path".into(), ArgValue::from("/tmp/a.txt"));
        args.insert("limit".into(), ArgValue::from(10));

        let out = validate_args(&descriptor(), &args).unwrap();
        assert_eq!(out.get("path").unwrap().as_str(), Some("/tmp/a.txt"));
        assert_eq!(out.get("limit").unwrap().as_int(), Some(10));
    }

    #[test]
    fn test_validate_rejects_unknown_key() {
        let mut args = ArgMap::new();
        args.insert("path".into(), ArgValue::from("/tmp/a.txt"));
        args.insert("bogus".into(), ArgValue::from("x"));

        let err = validate_args(&descriptor(), &args).unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_validate_enforces_required_key() {
        let args = ArgMap::new();
        let err = validate_args(&descriptor(), &args).unwrap_err();
        assert!(err.to_string().contains("path"));
    }

    #[test]
    fn test_string_coercion_to_int_and_bool() {
        let mut args = ArgMap::new();
        args.insert("path".into(), ArgValue::from("/tmp/a.txt"));
        args.insert("limit".into(), ArgValue::from("42"));
        args.insert("show_hidden".into(), ArgValue::from("TRUE"));

        let out = validate_args(&descriptor(), &args).unwrap();
        assert_eq!(out.get("limit").unwrap().as_int(), Some(42));
        assert_eq!(out.get("show_hidden").unwrap().as_bool(), Some(true));
    }

    #[test]
    fn test_coercion_failure_names_offending_field() {
        let mut args = ArgMap::new();
        args.insert("path".into(), ArgValue::from("/tmp/a.txt"));
        args.insert("limit".into(), ArgValue::from("not-a-number"));

        let err = validate_args(&descriptor(), &args).unwrap_err();
        assert!(err.to_string().contains("limit"));
    }

    #[test]
    fn test_signature_is_deterministic() {
        let sig = descriptor().signature();
        assert_eq!(
            sig,
            "read_file(limit: integer, path: string, show_hidden: boolean)"
        );
    }

    #[test]
    fn test_error_status_mappings() {
        assert_eq!(
            ToolError::PermissionDenied("no".into()).audit_status(),
            AuditStatus::Denied
        );
        assert_eq!(
            ToolError::ConfirmationTimeout.action_status(),
            ActionStatus::Cancelled
        );
        assert_eq!(
            ToolError::RemoteUnavailable("down".into()).audit_status(),
            AuditStatus::Error
        );
        assert_eq!(ToolError::Timeout.kind(), "Timeout");
    }
}

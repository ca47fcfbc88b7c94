//! Messages exchanged with the worker process.
//!
//! The parent writes one [`Submission`] as JSON to the worker's stdin and
//! closes it. The worker writes exactly one [`WorkerReport`] to stdout,
//! framed by marker lines so that stray output cannot be mistaken for a
//! report.

use crate::ast::NodeKind;
use crate::config::ResourceLimits;
use crate::errors::{Result, RuntimeFailure, SandboxError};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub const REPORT_BEGIN: &str = "DATASANDBOX_REPORT_BEGIN";
pub const REPORT_END: &str = "DATASANDBOX_REPORT_END";

/// One unit of work for the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub source: String,
    pub context: BTreeMap<String, Value>,
    pub limits: ResourceLimits,
}

impl Submission {
    pub fn new(
        source: impl Into<String>,
        context: BTreeMap<String, Value>,
        limits: ResourceLimits,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            context,
            limits,
        }
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Every top-level name the code assigned, by name
    pub bindings: BTreeMap<String, Value>,
    /// Everything printed, in program order
    pub stdout: String,
    /// Value of a top-level `return`, if one ran
    pub returned: Option<Value>,
}

impl ExecutionResult {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }
}

/// The single message a worker sends back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerReport {
    Completed { result: ExecutionResult },
    Rejected { kind: NodeKind, line: usize },
    SyntaxError { message: String, line: usize },
    Failed { error: RuntimeFailure, stdout: String },
    Interrupted,
    MemoryExhausted,
    /// The submission itself could not be decoded
    Malformed { message: String },
}

impl WorkerReport {
    /// Map the report onto the caller's result type.
    pub fn into_result(self) -> Result<ExecutionResult> {
        match self {
            WorkerReport::Completed { result } => Ok(result),
            WorkerReport::Rejected { kind, line } => {
                Err(SandboxError::DisallowedSyntax { kind, line })
            }
            WorkerReport::SyntaxError { message, line } => {
                Err(SandboxError::SyntaxError { message, line })
            }
            WorkerReport::Failed { error, .. } => Err(SandboxError::Runtime(error)),
            WorkerReport::Interrupted => Err(SandboxError::Timeout),
            WorkerReport::MemoryExhausted => Err(SandboxError::MemoryLimitExceeded),
            WorkerReport::Malformed { message } => Err(SandboxError::Protocol(message)),
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            WorkerReport::Completed { .. } => "completed",
            WorkerReport::Rejected { .. } => "rejected",
            WorkerReport::SyntaxError { .. } => "syntax_error",
            WorkerReport::Failed { .. } => "failed",
            WorkerReport::Interrupted => "interrupted",
            WorkerReport::MemoryExhausted => "memory_exhausted",
            WorkerReport::Malformed { .. } => "malformed",
        }
    }
}

/// Serialize a report between marker lines.
pub fn frame_report(report: &WorkerReport) -> Result<String> {
    let body = serde_json::to_string(report)?;
    Ok(format!("{}\n{}\n{}\n", REPORT_BEGIN, body, REPORT_END))
}

/// Extract the framed report from worker stdout.
///
/// `Ok(None)` means no complete frame was written, which is how a worker
/// killed mid-run looks.
pub fn parse_report(output: &str) -> Result<Option<WorkerReport>> {
    let Some(start) = output.find(REPORT_BEGIN) else {
        return Ok(None);
    };
    let body_start = start + REPORT_BEGIN.len();
    let Some(len) = output[body_start..].find(REPORT_END) else {
        return Ok(None);
    };
    let body = output[body_start..body_start + len].trim();
    serde_json::from_str(body)
        .map(Some)
        .map_err(|e| SandboxError::Protocol(format!("undecodable report: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_and_parse() {
        let mut result = ExecutionResult::default();
        result.bindings.insert("x".to_string(), Value::Int(1));
        result.stdout = "ok\n".to_string();
        let report = WorkerReport::Completed { result };

        let framed = frame_report(&report).unwrap();
        assert!(framed.starts_with(REPORT_BEGIN));
        let noisy = format!("stray\n{}", framed);
        assert_eq!(parse_report(&noisy).unwrap(), Some(report));
    }

    #[test]
    fn test_missing_or_truncated_frame() {
        assert_eq!(parse_report("").unwrap(), None);
        let truncated = format!("{}\n{{\"status\":", REPORT_BEGIN);
        assert_eq!(parse_report(&truncated).unwrap(), None);
    }

    #[test]
    fn test_garbage_frame_is_protocol_error() {
        let garbage = format!("{}\nnot json\n{}\n", REPORT_BEGIN, REPORT_END);
        assert!(matches!(
            parse_report(&garbage),
            Err(SandboxError::Protocol(_))
        ));
    }

    #[test]
    fn test_report_mapping() {
        let rejected = WorkerReport::Rejected {
            kind: NodeKind::Import,
            line: 1,
        };
        assert!(matches!(
            rejected.into_result(),
            Err(SandboxError::DisallowedSyntax {
                kind: NodeKind::Import,
                line: 1
            })
        ));
        assert!(matches!(
            WorkerReport::Interrupted.into_result(),
            Err(SandboxError::Timeout)
        ));
        assert!(matches!(
            WorkerReport::MemoryExhausted.into_result(),
            Err(SandboxError::MemoryLimitExceeded)
        ));
    }

    #[test]
    fn test_status_tag() {
        let json = serde_json::to_value(WorkerReport::Interrupted).unwrap();
        assert_eq!(json["status"], "interrupted");
    }
}

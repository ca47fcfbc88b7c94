//! The worker side of a run.
//!
//! Everything here executes inside the resource-limited child process. The
//! parent only ever sees the framed report this module writes.

use crate::analyzer::analyze;
use crate::compile::compile;
use crate::errors::{Result, SandboxError};
use crate::interp::{ExceptionKind, Interpreter, Outcome, RunLimits};
use crate::interrupt::{Alarm, Interrupt};
use crate::protocol::{frame_report, Submission, WorkerReport};
use std::io::{Read, Write};
use tracing::{debug, info, warn};

/// Limits for the evaluator's own accounting. Half of the address space is
/// left for the process itself so that the evaluator reports `MemoryError`
/// before the allocator aborts.
fn run_limits(submission: &Submission) -> RunLimits {
    let limits = &submission.limits;
    RunLimits {
        memory_bytes: (limits.memory_bytes() / 2) as usize,
        output_bytes: limits.max_output_bytes / 2,
    }
}

/// Validate, compile and evaluate one submission.
pub fn evaluate(submission: Submission, interrupt: Interrupt) -> WorkerReport {
    let id = submission.id;
    let tree = match analyze(&submission.source) {
        Ok(tree) => tree,
        Err(err) => return rejection(err),
    };
    let program = match compile(tree) {
        Ok(program) => program,
        Err(err) => return rejection(err),
    };

    let limits = run_limits(&submission);
    debug!(%id, memory_bytes = limits.memory_bytes, "evaluating");
    match Interpreter::new(submission.context, interrupt, limits).run(&program) {
        Outcome::Completed(result) => {
            info!(%id, bindings = result.bindings.len(), "[WORKER] completed");
            WorkerReport::Completed { result }
        }
        Outcome::Raised { exception, .. } if exception.kind == ExceptionKind::MemoryError => {
            warn!(%id, "[WORKER] memory ceiling hit: {}", exception.message);
            WorkerReport::MemoryExhausted
        }
        Outcome::Raised { exception, stdout } => {
            info!(%id, "[WORKER] raised {}", exception.kind);
            WorkerReport::Failed {
                error: exception.into_failure(),
                stdout,
            }
        }
        Outcome::Interrupted => {
            warn!(%id, "[WORKER] interrupted at deadline");
            WorkerReport::Interrupted
        }
    }
}

fn rejection(err: SandboxError) -> WorkerReport {
    match err {
        SandboxError::DisallowedSyntax { kind, line } => WorkerReport::Rejected { kind, line },
        SandboxError::SyntaxError { message, line } => WorkerReport::SyntaxError { message, line },
        other => WorkerReport::Malformed {
            message: other.to_string(),
        },
    }
}

/// Read one submission from `input`, run it and write one framed report to
/// `output`.
pub fn serve<R: Read, W: Write>(mut input: R, mut output: W) -> Result<WorkerReport> {
    let mut raw = String::new();
    input.read_to_string(&mut raw)?;

    let report = match serde_json::from_str::<Submission>(&raw) {
        Ok(submission) => {
            // The alarm starts before parsing so the deadline covers the
            // whole run.
            let alarm = Alarm::start(submission.limits.timeout())?;
            evaluate(submission, alarm.interrupt())
        }
        Err(e) => {
            warn!("[WORKER] undecodable submission: {}", e);
            WorkerReport::Malformed {
                message: e.to_string(),
            }
        }
    };

    output.write_all(frame_report(&report)?.as_bytes())?;
    output.flush()?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeKind;
    use crate::config::ResourceLimits;
    use crate::protocol::parse_report;
    use crate::value::Value;
    use std::collections::BTreeMap;

    fn submit(source: &str) -> Submission {
        Submission::new(source, BTreeMap::new(), ResourceLimits::default())
    }

    #[test]
    fn test_evaluate_completed() {
        let report = evaluate(submit("x = 1\nprint('ok')"), Interrupt::new());
        let WorkerReport::Completed { result } = report else {
            panic!("expected completion, got {:?}", report);
        };
        assert_eq!(result.bindings.get("x"), Some(&Value::Int(1)));
        assert_eq!(result.stdout, "ok\n");
    }

    #[test]
    fn test_evaluate_rejected() {
        let report = evaluate(submit("import os"), Interrupt::new());
        assert_eq!(
            report,
            WorkerReport::Rejected {
                kind: NodeKind::Import,
                line: 1
            }
        );
    }

    #[test]
    fn test_evaluate_syntax_error() {
        let report = evaluate(submit("x = (1"), Interrupt::new());
        assert!(matches!(report, WorkerReport::SyntaxError { .. }));
    }

    #[test]
    fn test_evaluate_runtime_failure_keeps_stdout() {
        let report = evaluate(submit("print('a')\nexec('print(1)')"), Interrupt::new());
        let WorkerReport::Failed { error, stdout } = report else {
            panic!("expected failure, got {:?}", report);
        };
        assert_eq!(error.kind, "NameError");
        assert_eq!(error.line, Some(2));
        assert_eq!(stdout, "a\n");
    }

    #[test]
    fn test_evaluate_interrupted() {
        let interrupt = Interrupt::new();
        interrupt.trigger();
        let report = evaluate(submit("total = sum(range(10**15))"), interrupt);
        assert_eq!(report, WorkerReport::Interrupted);
    }

    #[test]
    fn test_evaluate_memory_exhausted() {
        let limits = ResourceLimits::default().with_memory_mb(16);
        let submission = Submission::new("xs = [0] * 10**9", BTreeMap::new(), limits);
        assert_eq!(
            evaluate(submission, Interrupt::new()),
            WorkerReport::MemoryExhausted
        );
    }

    #[test]
    fn test_serve_round_trip() {
        let submission = submit("y = 2 + 3");
        let input = serde_json::to_vec(&submission).unwrap();
        let mut output = Vec::new();
        let report = serve(input.as_slice(), &mut output).unwrap();

        let written = String::from_utf8(output).unwrap();
        assert_eq!(parse_report(&written).unwrap(), Some(report.clone()));
        let result = report.into_result().unwrap();
        assert_eq!(result.get("y"), Some(&Value::Int(5)));
    }

    #[test]
    fn test_serve_malformed_input() {
        let mut output = Vec::new();
        let report = serve(&b"{not json"[..], &mut output).unwrap();
        assert!(matches!(report, WorkerReport::Malformed { .. }));
        assert!(!output.is_empty());
    }
}

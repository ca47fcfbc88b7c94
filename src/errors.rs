use crate::ast::NodeKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SandboxError>;

/// An exception raised by accepted code inside the worker.
///
/// Crosses the process boundary as part of the report, so it only carries
/// plain data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeFailure {
    /// Exception class, e.g. `NameError`
    pub kind: String,
    pub message: String,
    /// Line of the statement that raised, when known
    pub line: Option<usize>,
}

impl std::fmt::Display for RuntimeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(line) = self.line {
            write!(f, " (line {})", line)?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Worker executable not found")]
    WorkerNotFound,

    #[error("Syntax error on line {line}: {message}")]
    SyntaxError { message: String, line: usize },

    #[error("Disallowed syntax: {kind} (line {line})")]
    DisallowedSyntax { kind: NodeKind, line: usize },

    #[error("Runtime error during execution: {0}")]
    Runtime(RuntimeFailure),

    #[error("Execution timeout exceeded")]
    Timeout,

    #[error("Memory limit exceeded")]
    MemoryLimitExceeded,

    #[error("CPU time limit exceeded")]
    CpuLimitExceeded,

    #[error("Worker terminated without reporting (exit code {code:?}, signal {signal:?})")]
    AbnormalTermination {
        code: Option<i32>,
        signal: Option<i32>,
        stderr: String,
    },

    #[error("Malformed worker report: {0}")]
    Protocol(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Rendering failed: {0}")]
    Render(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl SandboxError {
    /// Whether a code-generation loop can usefully retry with different code.
    ///
    /// Rejections and runtime exceptions depend on the submitted text; limit
    /// violations and infrastructure failures do not.
    pub fn is_retryable_with_new_code(&self) -> bool {
        matches!(
            self,
            SandboxError::SyntaxError { .. }
                | SandboxError::DisallowedSyntax { .. }
                | SandboxError::Runtime(_)
        )
    }

    /// Message for an end user. Detail is only included in debug mode.
    pub fn user_message(&self, debug: bool) -> String {
        if debug {
            match self {
                SandboxError::AbnormalTermination { stderr, .. } if !stderr.is_empty() => {
                    format!("Execution failed: {}\n{}", self, stderr.trim_end())
                }
                _ => format!("Execution failed: {}", self),
            }
        } else {
            match self {
                SandboxError::SyntaxError { .. } | SandboxError::DisallowedSyntax { .. } => {
                    "The generated code uses syntax that is not allowed.".to_string()
                }
                SandboxError::Timeout | SandboxError::CpuLimitExceeded => {
                    "The code took too long to run.".to_string()
                }
                SandboxError::MemoryLimitExceeded => "The code used too much memory.".to_string(),
                _ => "Execution failed.".to_string(),
            }
        }
    }
}

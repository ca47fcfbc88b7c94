use crate::errors::RuntimeFailure;
use crate::value::Value;
use std::fmt;

/// Exception classes accepted code can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    NameError,
    TypeError,
    ValueError,
    KeyError,
    IndexError,
    AttributeError,
    ZeroDivisionError,
    OverflowError,
    MemoryError,
    NotImplementedError,
    RecursionError,
    SyntaxError,
}

impl ExceptionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ExceptionKind::NameError => "NameError",
            ExceptionKind::TypeError => "TypeError",
            ExceptionKind::ValueError => "ValueError",
            ExceptionKind::KeyError => "KeyError",
            ExceptionKind::IndexError => "IndexError",
            ExceptionKind::AttributeError => "AttributeError",
            ExceptionKind::ZeroDivisionError => "ZeroDivisionError",
            ExceptionKind::OverflowError => "OverflowError",
            ExceptionKind::MemoryError => "MemoryError",
            ExceptionKind::NotImplementedError => "NotImplementedError",
            ExceptionKind::RecursionError => "RecursionError",
            ExceptionKind::SyntaxError => "SyntaxError",
        }
    }
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An exception raised while evaluating accepted code.
#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
    pub kind: ExceptionKind,
    pub message: String,
    pub line: Option<usize>,
}

impl Exception {
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::TypeError, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::ValueError, message)
    }

    pub fn key_error(key: &Value) -> Self {
        Self::new(ExceptionKind::KeyError, key.repr())
    }

    pub fn index_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::IndexError, message)
    }

    pub fn no_attribute(value: &Value, attr: &str) -> Self {
        Self::new(
            ExceptionKind::AttributeError,
            format!("'{}' object has no attribute '{}'", value.type_name(), attr),
        )
    }

    pub fn overflow() -> Self {
        Self::new(ExceptionKind::OverflowError, "integer overflow")
    }

    pub fn memory(requested: usize) -> Self {
        Self::new(
            ExceptionKind::MemoryError,
            format!("allocation of {} bytes exceeds the memory limit", requested),
        )
    }

    /// Attach the line of the statement being executed, keeping an earlier
    /// more precise one.
    pub fn at_line(mut self, line: usize) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }

    pub fn into_failure(self) -> RuntimeFailure {
        RuntimeFailure {
            kind: self.kind.name().to_string(),
            message: self.message,
            line: self.line,
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Non-local exits out of statement execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Raise(Exception),
    /// Top-level `return`
    Return(Value),
    /// The wall-clock alarm fired
    Interrupted,
}

impl From<Exception> for Signal {
    fn from(e: Exception) -> Self {
        Signal::Raise(e)
    }
}

pub type Flow<T> = Result<T, Signal>;

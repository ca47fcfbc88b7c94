//! Run short data-manipulation snippets against an in-memory dataset.
//!
//! Submissions use a Python-compatible syntax. Every submission is checked
//! against a fixed allowlist of syntax, then evaluated in a separate
//! `datasandbox-worker` process with CPU, memory and wall clock limits. The
//! names the code binds come back as an [`ExecutionResult`], which
//! [`artifacts::classify`] sorts into tables, images, figures and text.
//!
//! ```rust,no_run
//! use datasandbox::{Sandbox, RunOptions, SandboxConfig, Value};
//! use std::collections::BTreeMap;
//!
//! # async fn demo() -> datasandbox::Result<()> {
//! let sandbox = Sandbox::new(SandboxConfig::from_env()?)?;
//! let mut context = BTreeMap::new();
//! context.insert("n".to_string(), Value::Int(20));
//! let result = sandbox
//!     .run("total = sum(range(n))", &context, RunOptions::default())
//!     .await?;
//! assert_eq!(result.get("total"), Some(&Value::Int(190)));
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod artifacts;
pub mod ast;
pub mod builtins;
pub mod cache;
pub mod compile;
pub mod config;
pub mod engine;
pub mod errors;
pub mod figure;
pub mod frame;
pub mod interp;
pub mod interrupt;
pub mod namespace;
pub mod parser;
pub mod process;
pub mod protocol;
pub mod sandbox;
pub mod value;
pub mod worker;

pub use analyzer::{analyze, ValidatedTree};
pub use artifacts::{classify, Artifacts};
pub use ast::NodeKind;
pub use cache::ResultCache;
pub use config::{LimitProfile, ResourceLimits, SandboxConfig};
pub use engine::{EngineCapabilities, ExecutionEngine};
pub use errors::{Result, RuntimeFailure, SandboxError};
pub use figure::{Figure, FigureRenderer, Image, ImageFormat, SvgRenderer};
pub use frame::{Series, Table};
pub use process::ProcessEngine;
pub use protocol::ExecutionResult;
pub use sandbox::{RunOptions, Sandbox};
pub use value::{Library, Value};

use std::collections::BTreeMap;
use std::time::Duration;

/// Run `code` once with limits from the environment and the given wall
/// clock ceiling. No cache is used.
pub async fn run(
    code: &str,
    context: &BTreeMap<String, Value>,
    timeout: Duration,
) -> Result<ExecutionResult> {
    let sandbox = Sandbox::new(SandboxConfig::from_env()?.with_cache_capacity(0))?;
    sandbox
        .run(code, context, RunOptions::default().with_timeout(timeout))
        .await
}

/// A context holding `pd`, `plt` and `math` plus the given entries.
pub fn context_with_libraries(
    entries: impl IntoIterator<Item = (String, Value)>,
) -> BTreeMap<String, Value> {
    Library::standard_context().into_iter().chain(entries).collect()
}

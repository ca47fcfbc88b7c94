use crate::analyzer::{analyze, ValidatedTree};
use crate::config::ResourceLimits;
use crate::errors::Result;
use crate::protocol::ExecutionResult;
use crate::value::Value;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Capabilities of an execution engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineCapabilities {
    /// Engine name
    pub name: String,
    /// How runs are isolated from the host
    pub isolation: String,
    /// Library handles a caller may place in the context
    pub libraries: Vec<String>,
    /// Maximum memory in MB
    pub max_memory_mb: usize,
    /// Maximum CPU time in seconds
    pub max_cpu_secs: u64,
}

/// Trait for engines that run validated submissions
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Check code against the allowlist without running it
    async fn validate(&self, code: &str) -> Result<ValidatedTree> {
        analyze(code)
    }

    /// Run a validated tree against `context`
    async fn execute(
        &self,
        tree: &ValidatedTree,
        context: &BTreeMap<String, Value>,
        limits: &ResourceLimits,
    ) -> Result<ExecutionResult>;

    /// Get engine capabilities
    fn capabilities(&self) -> EngineCapabilities;
}

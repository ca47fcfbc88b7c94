use crate::analyzer::ValidatedTree;
use crate::cache::{CacheKey, ResultCache};
use crate::config::{LimitProfile, ResourceLimits, SandboxConfig};
use crate::engine::{EngineCapabilities, ExecutionEngine};
use crate::errors::Result;
use crate::process::ProcessEngine;
use crate::protocol::ExecutionResult;
use crate::value::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Per-call options for [`Sandbox::run`]
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Overrides the configured wall clock ceiling
    pub timeout: Option<Duration>,
    /// Consult and fill the result cache, when one is attached
    pub use_cache: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            use_cache: true,
        }
    }
}

impl RunOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }
}

/// Validates submissions and runs them on an engine.
///
/// Each [`run`](Sandbox::run) is independent; concurrent calls spawn
/// separate workers.
pub struct Sandbox {
    engine: Box<dyn ExecutionEngine>,
    limits: ResourceLimits,
    cache: Option<Arc<ResultCache>>,
}

impl Sandbox {
    /// Create a process-backed sandbox from `config`
    pub fn new(config: SandboxConfig) -> Result<Self> {
        let engine = ProcessEngine::from_config(&config)?;
        let cache =
            (config.cache_capacity > 0).then(|| Arc::new(ResultCache::new(config.cache_capacity)));
        info!(
            "[SANDBOX] ready: timeout={}s memory={}MB cache={}",
            config.limits.timeout_secs, config.limits.memory_mb, config.cache_capacity
        );
        Ok(Self {
            engine: Box::new(engine),
            limits: config.limits,
            cache,
        })
    }

    /// Create with settings from the environment
    pub fn from_env() -> Result<Self> {
        Self::new(SandboxConfig::from_env()?)
    }

    /// Create from a limit profile
    pub fn from_profile(profile: LimitProfile) -> Result<Self> {
        debug!("using profile {:?}: {}", profile, profile.description());
        Self::new(SandboxConfig::from_profile(profile))
    }

    /// Create over any engine
    pub fn with_engine(engine: Box<dyn ExecutionEngine>, limits: ResourceLimits) -> Self {
        Self {
            engine,
            limits,
            cache: None,
        }
    }

    /// Attach a shared result cache
    pub fn with_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    pub fn capabilities(&self) -> EngineCapabilities {
        self.engine.capabilities()
    }

    /// Check code against the allowlist without running it
    pub async fn analyze(&self, code: &str) -> Result<ValidatedTree> {
        self.engine.validate(code).await
    }

    /// Validate and run `code` against `context`.
    ///
    /// Rejected code never reaches the engine. Only completed runs are
    /// cached.
    pub async fn run(
        &self,
        code: &str,
        context: &BTreeMap<String, Value>,
        options: RunOptions,
    ) -> Result<ExecutionResult> {
        let tree = self.engine.validate(code).await?;

        let limits = match options.timeout {
            Some(timeout) => self.limits.clone().with_timeout(timeout),
            None => self.limits.clone(),
        };

        let cache = self.cache.as_ref().filter(|_| options.use_cache);
        let key = match cache {
            Some(_) => Some(CacheKey::new(code, context, &limits)?),
            None => None,
        };
        if let (Some(cache), Some(key)) = (cache, &key) {
            if let Some(hit) = cache.get(key) {
                info!("[SANDBOX] served from cache");
                return Ok(hit);
            }
        }

        info!(
            "[SANDBOX] executing {} bytes with timeout {}s",
            code.len(),
            limits.timeout_secs
        );
        let result = self.engine.execute(&tree, context, &limits).await?;

        if let (Some(cache), Some(key)) = (cache, key) {
            cache.insert(key, result.clone());
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SandboxError;
    use crate::ast::NodeKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Engine that answers every run with the source's length.
    struct CountingEngine {
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ExecutionEngine for CountingEngine {
        async fn execute(
            &self,
            tree: &ValidatedTree,
            _context: &BTreeMap<String, Value>,
            limits: &ResourceLimits,
        ) -> Result<ExecutionResult> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let mut result = ExecutionResult::default();
            result
                .bindings
                .insert("len".into(), Value::Int(tree.source().len() as i64));
            result
                .bindings
                .insert("timeout".into(), Value::Float(limits.timeout_secs));
            Ok(result)
        }

        fn capabilities(&self) -> EngineCapabilities {
            EngineCapabilities {
                name: "counting".into(),
                isolation: "none".into(),
                libraries: vec![],
                max_memory_mb: 0,
                max_cpu_secs: 0,
            }
        }
    }

    fn sandbox() -> (Sandbox, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let engine = CountingEngine { runs: runs.clone() };
        (
            Sandbox::with_engine(Box::new(engine), ResourceLimits::default()),
            runs,
        )
    }

    #[tokio::test]
    async fn test_rejected_code_never_executes() {
        let (sandbox, runs) = sandbox();
        let err = sandbox
            .run("import os", &BTreeMap::new(), RunOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SandboxError::DisallowedSyntax {
                kind: NodeKind::Import,
                ..
            }
        ));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timeout_override() {
        let (sandbox, _) = sandbox();
        let options = RunOptions::default().with_timeout(Duration::from_secs(2));
        let result = sandbox.run("x = 1", &BTreeMap::new(), options).await.unwrap();
        assert_eq!(result.get("timeout"), Some(&Value::Float(2.0)));
    }

    #[tokio::test]
    async fn test_cache_hits_skip_engine() {
        let (sandbox, runs) = sandbox();
        let sandbox = sandbox.with_cache(Arc::new(ResultCache::new(4)));
        let context = BTreeMap::new();

        let first = sandbox.run("x = 1", &context, RunOptions::default()).await.unwrap();
        let second = sandbox.run("x = 1", &context, RunOptions::default()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        sandbox
            .run("x = 1", &context, RunOptions::default().without_cache())
            .await
            .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_analyze_is_idempotent() {
        let (sandbox, _) = sandbox();
        let code = "y = [v * 2 for v in range(3)]";
        let first = tokio_test::block_on(sandbox.analyze(code)).unwrap();
        let second = tokio_test::block_on(sandbox.analyze(code)).unwrap();
        assert_eq!(first.module(), second.module());
    }
}

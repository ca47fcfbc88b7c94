use crate::errors::{Result, SandboxError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Name of the worker executable looked up next to the host binary and on
/// `PATH`.
pub const WORKER_BINARY: &str = "datasandbox-worker";

/// Longest wall clock ceiling accepted, one day.
pub const MAX_TIMEOUT_SECS: f64 = 86_400.0;

/// Preset limit profiles
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LimitProfile {
    /// Larger tables and slower charts; for trusted notebooks
    Relaxed,

    /// Interactive question answering
    #[default]
    Standard,

    /// Untrusted generated code on a shared host
    Strict,
}

impl LimitProfile {
    /// Get resource limits for this profile
    pub fn resource_limits(&self) -> ResourceLimits {
        match self {
            LimitProfile::Relaxed => ResourceLimits {
                timeout_secs: 30.0,
                cpu_secs: 30,
                memory_mb: 1024,
                max_output_bytes: 64 * 1024 * 1024,
            },
            LimitProfile::Standard => ResourceLimits::default(),
            LimitProfile::Strict => ResourceLimits {
                timeout_secs: 2.0,
                cpu_secs: 2,
                memory_mb: 128,
                max_output_bytes: 4 * 1024 * 1024,
            },
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            LimitProfile::Relaxed => "Generous limits for trusted code",
            LimitProfile::Standard => "Interactive limits (5 s, 200 MB)",
            LimitProfile::Strict => "Tight limits for untrusted code on shared hosts",
        }
    }
}

/// Resource limits applied to one worker process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Wall clock ceiling in seconds
    pub timeout_secs: f64,
    /// CPU time ceiling in seconds (RLIMIT_CPU soft limit)
    pub cpu_secs: u64,
    /// Address space ceiling in MB (RLIMIT_AS)
    pub memory_mb: usize,
    /// Largest report the parent will read back
    pub max_output_bytes: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            timeout_secs: 5.0,
            cpu_secs: 5,
            memory_mb: 200,
            max_output_bytes: 16 * 1024 * 1024,
        }
    }
}

impl ResourceLimits {
    /// Set the wall clock ceiling. The CPU ceiling is raised when needed so
    /// the timeout stays the limit that fires first.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs_f64();
        let floor = (self.timeout_secs.ceil() as u64).saturating_add(1);
        if self.cpu_secs < floor {
            self.cpu_secs = floor;
        }
        self
    }

    pub fn with_memory_mb(mut self, memory_mb: usize) -> Self {
        self.memory_mb = memory_mb;
        self
    }

    pub fn with_cpu_secs(mut self, cpu_secs: u64) -> Self {
        self.cpu_secs = cpu_secs;
        self
    }

    pub fn with_max_output_bytes(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = max_output_bytes;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs.max(0.0)).unwrap_or(Duration::MAX)
    }

    pub fn memory_bytes(&self) -> u64 {
        self.memory_mb as u64 * 1024 * 1024
    }

    pub fn validate(&self) -> Result<()> {
        if !self.timeout_secs.is_finite() || self.timeout_secs <= 0.0 {
            return Err(SandboxError::Config(format!(
                "timeout_secs must be positive, got {}",
                self.timeout_secs
            )));
        }
        if self.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(SandboxError::Config(format!(
                "timeout_secs must be at most {}, got {}",
                MAX_TIMEOUT_SECS, self.timeout_secs
            )));
        }
        if self.cpu_secs == 0 {
            return Err(SandboxError::Config("cpu_secs must be positive".into()));
        }
        if self.memory_mb < 16 {
            return Err(SandboxError::Config(format!(
                "memory_mb must be at least 16, got {}",
                self.memory_mb
            )));
        }
        if self.max_output_bytes == 0 {
            return Err(SandboxError::Config(
                "max_output_bytes must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration for a [`Sandbox`](crate::Sandbox)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Limits applied to every run
    pub limits: ResourceLimits,
    /// Explicit worker executable; discovered when unset
    pub worker_path: Option<PathBuf>,
    /// Result cache capacity; no cache when 0
    pub cache_capacity: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            limits: ResourceLimits::default(),
            worker_path: None,
            cache_capacity: 0,
        }
    }
}

impl SandboxConfig {
    /// Create config from a limit profile
    pub fn from_profile(profile: LimitProfile) -> Self {
        Self {
            limits: profile.resource_limits(),
            ..Default::default()
        }
    }

    /// Defaults overlaid with the process environment
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.overlay(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load a JSON config file. Missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: SandboxConfig = serde_json::from_str(&text)?;
        config.limits.validate()?;
        debug!("loaded sandbox config from {}", path.display());
        Ok(config)
    }

    /// Apply `DATASANDBOX_*` settings read through `lookup`.
    pub fn overlay<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DATASANDBOX_TIMEOUT_SECS") {
            let secs = parse_setting::<f64>("DATASANDBOX_TIMEOUT_SECS", &v)?;
            if !secs.is_finite() || secs <= 0.0 || secs > MAX_TIMEOUT_SECS {
                return Err(SandboxError::Config(format!(
                    "DATASANDBOX_TIMEOUT_SECS must be in (0, {}], got {}",
                    MAX_TIMEOUT_SECS, v
                )));
            }
            self.limits = self.limits.clone().with_timeout(Duration::from_secs_f64(secs));
        }
        if let Some(v) = lookup("DATASANDBOX_CPU_SECS") {
            self.limits.cpu_secs = parse_setting("DATASANDBOX_CPU_SECS", &v)?;
        }
        // SAFE_EXEC_MEM_MB is the older name; the prefixed one wins.
        if let Some(v) = lookup("SAFE_EXEC_MEM_MB") {
            self.limits.memory_mb = parse_setting("SAFE_EXEC_MEM_MB", &v)?;
        }
        if let Some(v) = lookup("DATASANDBOX_MEM_MB") {
            self.limits.memory_mb = parse_setting("DATASANDBOX_MEM_MB", &v)?;
        }
        if let Some(v) = lookup("DATASANDBOX_WORKER") {
            if !v.trim().is_empty() {
                self.worker_path = Some(PathBuf::from(v.trim()));
            }
        }
        if let Some(v) = lookup("DATASANDBOX_CACHE_CAPACITY") {
            self.cache_capacity = parse_setting("DATASANDBOX_CACHE_CAPACITY", &v)?;
        }
        self.limits.validate()
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_worker_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.worker_path = Some(path.into());
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Locate the worker executable: explicit path, then a sibling of the
    /// current executable (or of its parent directory, for test binaries
    /// under `deps/`), then `PATH`.
    pub fn resolve_worker(&self) -> Result<PathBuf> {
        if let Some(path) = &self.worker_path {
            if path.is_file() {
                return Ok(path.clone());
            }
            return Err(SandboxError::WorkerNotFound);
        }

        if let Ok(exe) = std::env::current_exe() {
            let dirs = exe.parent().into_iter().chain(exe.parent().and_then(Path::parent));
            for dir in dirs {
                let candidate = dir.join(worker_file_name());
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
        }

        which::which(WORKER_BINARY).map_err(|_| SandboxError::WorkerNotFound)
    }
}

fn worker_file_name() -> String {
    format!("{}{}", WORKER_BINARY, std::env::consts::EXE_SUFFIX)
}

fn parse_setting<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SandboxError::Config(format!("invalid value for {}: {:?}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_limits() {
        let limits = ResourceLimits::default();
        assert_eq!(limits.timeout_secs, 5.0);
        assert_eq!(limits.cpu_secs, 5);
        assert_eq!(limits.memory_mb, 200);
        assert!(limits.validate().is_ok());
    }

    #[test]
    fn test_with_timeout_raises_cpu() {
        let limits = ResourceLimits::default().with_timeout(Duration::from_secs(10));
        assert_eq!(limits.timeout_secs, 10.0);
        assert_eq!(limits.cpu_secs, 11);

        let short = ResourceLimits::default().with_timeout(Duration::from_millis(1500));
        assert_eq!(short.cpu_secs, 5);
    }

    #[test]
    fn test_profiles() {
        let strict = LimitProfile::Strict.resource_limits();
        let relaxed = LimitProfile::Relaxed.resource_limits();
        assert!(strict.memory_mb < relaxed.memory_mb);
        assert_eq!(LimitProfile::default().resource_limits(), ResourceLimits::default());
        assert_eq!(
            serde_json::to_string(&LimitProfile::Strict).unwrap(),
            "\"strict\""
        );
    }

    #[test]
    fn test_overlay_env() {
        let mut config = SandboxConfig::default();
        config
            .overlay(lookup_from(&[
                ("DATASANDBOX_TIMEOUT_SECS", "2.5"),
                ("SAFE_EXEC_MEM_MB", "300"),
                ("DATASANDBOX_CACHE_CAPACITY", "8"),
                ("DATASANDBOX_WORKER", "/opt/bin/datasandbox-worker"),
            ]))
            .unwrap();
        assert_eq!(config.limits.timeout_secs, 2.5);
        assert_eq!(config.limits.memory_mb, 300);
        assert_eq!(config.cache_capacity, 8);
        assert_eq!(
            config.worker_path,
            Some(PathBuf::from("/opt/bin/datasandbox-worker"))
        );
    }

    #[test]
    fn test_overlay_prefixed_memory_wins() {
        let mut config = SandboxConfig::default();
        config
            .overlay(lookup_from(&[
                ("SAFE_EXEC_MEM_MB", "300"),
                ("DATASANDBOX_MEM_MB", "400"),
            ]))
            .unwrap();
        assert_eq!(config.limits.memory_mb, 400);
    }

    #[test]
    fn test_overlay_rejects_garbage() {
        let mut config = SandboxConfig::default();
        let err = config
            .overlay(lookup_from(&[("DATASANDBOX_CPU_SECS", "lots")]))
            .unwrap_err();
        assert!(matches!(err, SandboxError::Config(_)));

        let err = config
            .overlay(lookup_from(&[("DATASANDBOX_TIMEOUT_SECS", "-1")]))
            .unwrap_err();
        assert!(matches!(err, SandboxError::Config(_)));
    }

    #[test]
    fn test_huge_timeout_is_rejected() {
        let mut config = SandboxConfig::default();
        let err = config
            .overlay(lookup_from(&[("DATASANDBOX_TIMEOUT_SECS", "1e30")]))
            .unwrap_err();
        assert!(matches!(err, SandboxError::Config(_)));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"limits": {{"timeout_secs": 1e30}}}}"#).unwrap();
        assert!(matches!(
            SandboxConfig::from_file(file.path()),
            Err(SandboxError::Config(_))
        ));

        let limits = ResourceLimits {
            timeout_secs: 1e30,
            ..Default::default()
        };
        assert!(limits.validate().is_err());
        assert_eq!(limits.timeout(), Duration::MAX);
        let day = ResourceLimits::default().with_timeout(Duration::from_secs(86_400));
        assert!(day.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"limits": {{"timeout_secs": 3.0, "memory_mb": 256}}, "cache_capacity": 4}}"#
        )
        .unwrap();
        let config = SandboxConfig::from_file(file.path()).unwrap();
        assert_eq!(config.limits.timeout_secs, 3.0);
        assert_eq!(config.limits.memory_mb, 256);
        assert_eq!(config.limits.cpu_secs, 5);
        assert_eq!(config.cache_capacity, 4);
        assert!(config.worker_path.is_none());
    }

    #[test]
    fn test_from_file_invalid_limits() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"limits": {{"memory_mb": 1}}}}"#).unwrap();
        assert!(matches!(
            SandboxConfig::from_file(file.path()),
            Err(SandboxError::Config(_))
        ));
    }

    #[test]
    fn test_explicit_worker_must_exist() {
        let config = SandboxConfig::default().with_worker_path("/nonexistent/datasandbox-worker");
        assert!(matches!(
            config.resolve_worker(),
            Err(SandboxError::WorkerNotFound)
        ));

        let file = tempfile::NamedTempFile::new().unwrap();
        let config = SandboxConfig::default().with_worker_path(file.path());
        assert_eq!(config.resolve_worker().unwrap(), file.path());
    }
}

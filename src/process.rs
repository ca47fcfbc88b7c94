use crate::analyzer::ValidatedTree;
use crate::config::{ResourceLimits, SandboxConfig};
use crate::engine::{EngineCapabilities, ExecutionEngine};
use crate::errors::{Result, SandboxError};
use crate::protocol::{parse_report, ExecutionResult, Submission};
use crate::value::{Library, Value};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Time the worker gets after its own alarm to write the interrupted report
/// before the parent kills it.
const REPORT_GRACE: Duration = Duration::from_millis(250);

/// Stderr kept for diagnostics
const STDERR_CAP: u64 = 64 * 1024;

/// Runs every submission in a fresh `datasandbox-worker` process.
pub struct ProcessEngine {
    worker_path: PathBuf,
    limits: ResourceLimits,
}

impl ProcessEngine {
    /// Create an engine using the discovered worker and default limits
    pub fn new() -> Result<Self> {
        Self::from_config(&SandboxConfig::default())
    }

    pub fn from_config(config: &SandboxConfig) -> Result<Self> {
        let worker_path = config.resolve_worker()?;
        debug!("using worker {}", worker_path.display());
        Ok(Self {
            worker_path,
            limits: config.limits.clone(),
        })
    }

    /// Create with explicit worker path
    pub fn with_worker_path(worker_path: PathBuf) -> Result<Self> {
        if !worker_path.is_file() {
            return Err(SandboxError::WorkerNotFound);
        }
        Ok(Self {
            worker_path,
            limits: ResourceLimits::default(),
        })
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn worker_path(&self) -> &Path {
        &self.worker_path
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Apply resource limits to the command
    #[cfg(unix)]
    fn apply_resource_limits(cmd: &mut Command, limits: &ResourceLimits) {
        let cpu_secs = limits.cpu_secs;
        #[cfg(not(target_os = "macos"))]
        let memory_bytes = limits.memory_bytes();

        fn set(resource: libc::c_int, soft: u64, hard: u64) -> std::io::Result<()> {
            let rlimit = libc::rlimit {
                rlim_cur: soft as libc::rlim_t,
                rlim_max: hard as libc::rlim_t,
            };
            // The resource constant's type differs between libc targets.
            if unsafe { libc::setrlimit(resource as _, &rlimit) } != 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        }

        unsafe {
            cmd.pre_exec(move || {
                // Own process group so a timeout can kill everything at once
                if libc::setpgid(0, 0) != 0 {
                    return Err(std::io::Error::last_os_error());
                }

                // SIGXCPU at the soft limit, SIGKILL one second later
                set(libc::RLIMIT_CPU as libc::c_int, cpu_secs, cpu_secs + 1)?;

                // macOS doesn't enforce RLIMIT_AS
                #[cfg(not(target_os = "macos"))]
                set(libc::RLIMIT_AS as libc::c_int, memory_bytes, memory_bytes)?;

                set(libc::RLIMIT_CORE as libc::c_int, 0, 0)?;
                set(libc::RLIMIT_FSIZE as libc::c_int, 0, 0)?;
                Ok(())
            });
        }
    }

    #[cfg(not(unix))]
    fn apply_resource_limits(_cmd: &mut Command, _limits: &ResourceLimits) {
        // Only the wall clock timeout applies here.
    }

    fn command(&self, limits: &ResourceLimits) -> Command {
        let mut cmd = Command::new(&self.worker_path);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_clear()
            .kill_on_drop(true);
        if let Ok(filter) = std::env::var("RUST_LOG") {
            cmd.env("RUST_LOG", filter);
        }
        Self::apply_resource_limits(&mut cmd, limits);
        cmd
    }

    /// Ship `submission` to a fresh worker and wait for its report.
    pub async fn run_submission(&self, submission: Submission) -> Result<ExecutionResult> {
        let limits = submission.limits.clone();
        limits.validate()?;
        let id = submission.id;
        let payload = serde_json::to_vec(&submission)?;

        let started = Instant::now();
        let mut child = self.command(&limits).spawn()?;
        let pid = child.id();
        info!(%id, pid, "[SANDBOX] spawned worker");

        let mut stdin = take_pipe(child.stdin.take(), "stdin")?;
        let mut stdout = take_pipe(child.stdout.take(), "stdout")?;
        let mut stderr = take_pipe(child.stderr.take(), "stderr")?;

        let write = async move {
            // A worker that dies before reading is classified by its exit
            // status, not by the broken pipe.
            let written = match stdin.write_all(&payload).await {
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!(%id, "worker closed stdin early");
                    Ok(())
                }
                other => other,
            };
            // EOF for the worker
            drop(stdin);
            written
        };
        let cap = limits.max_output_bytes as u64;
        let run = async {
            let (written, out, err, status) = tokio::join!(
                write,
                read_capped(&mut stdout, cap),
                read_capped(&mut stderr, STDERR_CAP),
                child.wait()
            );
            written?;
            Ok::<_, std::io::Error>((out?, err?, status?))
        };

        let deadline = limits.timeout() + REPORT_GRACE;
        let outcome = tokio::time::timeout(deadline, run).await;
        let (out, err, status) = match outcome {
            Ok(result) => result?,
            Err(_) => {
                warn!(%id, ?deadline, "[SANDBOX] deadline passed, killing worker");
                kill_and_reap(&mut child, pid).await;
                return Err(SandboxError::Timeout);
            }
        };

        let stderr_text = String::from_utf8_lossy(&err.bytes).into_owned();
        if out.truncated {
            warn!(%id, cap, "[SANDBOX] worker output exceeded cap");
            return Err(SandboxError::Protocol(format!(
                "worker output exceeded {} bytes",
                cap
            )));
        }

        let stdout_text = String::from_utf8_lossy(&out.bytes);
        match parse_report(&stdout_text)? {
            Some(report) => {
                info!(%id, status = report.status(), "[SANDBOX] worker reported");
                report.into_result()
            }
            None => Err(classify_exit(
                status,
                stderr_text,
                started.elapsed(),
                limits.cpu_secs,
            )),
        }
    }
}

#[async_trait]
impl ExecutionEngine for ProcessEngine {
    async fn execute(
        &self,
        tree: &ValidatedTree,
        context: &BTreeMap<String, Value>,
        limits: &ResourceLimits,
    ) -> Result<ExecutionResult> {
        let submission = Submission::new(tree.source(), context.clone(), limits.clone());
        self.run_submission(submission).await
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            name: "Process worker".to_string(),
            isolation: "separate process with rlimits".to_string(),
            libraries: [Library::Frames, Library::Charts, Library::Math]
                .iter()
                .map(|lib| lib.module_name().to_string())
                .collect(),
            max_memory_mb: self.limits.memory_mb,
            max_cpu_secs: self.limits.cpu_secs,
        }
    }
}

fn take_pipe<T>(pipe: Option<T>, name: &str) -> Result<T> {
    pipe.ok_or_else(|| SandboxError::Protocol(format!("worker {} was not piped", name)))
}

struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

/// Read up to `cap` bytes and drain the rest so the writer never blocks.
async fn read_capped<R: AsyncRead + Unpin>(reader: &mut R, cap: u64) -> std::io::Result<Captured> {
    let mut bytes = Vec::new();
    (&mut *reader).take(cap).read_to_end(&mut bytes).await?;
    let rest = tokio::io::copy(reader, &mut tokio::io::sink()).await?;
    Ok(Captured {
        bytes,
        truncated: rest > 0,
    })
}

async fn kill_and_reap(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;
        if let Some(pid) = pid {
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                debug!(pid, "killpg failed: {}", e);
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;

    if let Err(e) = child.start_kill() {
        debug!("start_kill failed: {}", e);
    }
    match child.wait().await {
        Ok(status) => debug!("reaped worker: {}", status),
        Err(e) => warn!("failed to reap worker: {}", e),
    }
}

/// Classify a worker that exited without writing a report.
///
/// SIGKILL is only blamed on the hard CPU limit when the worker ran long
/// enough to reach it. CPU time never exceeds wall time, so an earlier kill
/// came from somewhere else, such as the OOM killer.
fn classify_exit(
    status: ExitStatus,
    stderr: String,
    elapsed: Duration,
    cpu_secs: u64,
) -> SandboxError {
    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    };
    #[cfg(not(unix))]
    let signal: Option<i32> = None;
    #[cfg(not(unix))]
    let _ = (elapsed, cpu_secs);

    #[cfg(unix)]
    {
        let Some(sig) = signal else {
            return SandboxError::AbnormalTermination {
                code: status.code(),
                signal,
                stderr,
            };
        };
        let name = nix::sys::signal::Signal::try_from(sig)
            .map(|s| s.as_str())
            .unwrap_or("unknown");
        warn!(signal = sig, name, "[SANDBOX] worker died without a report");
        if sig == libc::SIGXCPU {
            return SandboxError::CpuLimitExceeded;
        }
        if sig == libc::SIGKILL && elapsed >= Duration::from_secs(cpu_secs) {
            return SandboxError::CpuLimitExceeded;
        }
        if sig == libc::SIGABRT && stderr.contains("memory allocation of") {
            return SandboxError::MemoryLimitExceeded;
        }
    }

    SandboxError::AbnormalTermination {
        code: status.code(),
        signal,
        stderr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_worker() {
        let result = ProcessEngine::with_worker_path(PathBuf::from("/nonexistent/worker"));
        assert!(matches!(result, Err(SandboxError::WorkerNotFound)));
    }

    #[tokio::test]
    async fn test_read_capped_drains() {
        let data = vec![b'x'; 100];
        let mut reader = data.as_slice();
        let captured = read_capped(&mut reader, 10).await.unwrap();
        assert_eq!(captured.bytes.len(), 10);
        assert!(captured.truncated);

        let mut reader = &data[..5];
        let captured = read_capped(&mut reader, 10).await.unwrap();
        assert_eq!(captured.bytes.len(), 5);
        assert!(!captured.truncated);
    }

    #[cfg(unix)]
    #[test]
    fn test_classify_exit() {
        use std::os::unix::process::ExitStatusExt;

        let quick = Duration::from_millis(300);
        let xcpu = ExitStatus::from_raw(libc::SIGXCPU);
        assert!(matches!(
            classify_exit(xcpu, String::new(), quick, 5),
            SandboxError::CpuLimitExceeded
        ));

        let abort = ExitStatus::from_raw(libc::SIGABRT);
        assert!(matches!(
            classify_exit(abort, "memory allocation of 4096 bytes failed".to_string(), quick, 5),
            SandboxError::MemoryLimitExceeded
        ));

        let segv = ExitStatus::from_raw(libc::SIGSEGV);
        assert!(matches!(
            classify_exit(segv, String::new(), quick, 5),
            SandboxError::AbnormalTermination {
                signal: Some(s),
                ..
            } if s == libc::SIGSEGV
        ));

        // exit(3) is encoded as 3 << 8
        let exited = ExitStatus::from_raw(3 << 8);
        assert!(matches!(
            classify_exit(exited, "boom".to_string(), quick, 5),
            SandboxError::AbnormalTermination { code: Some(3), signal: None, .. }
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_classify_sigkill() {
        use std::os::unix::process::ExitStatusExt;

        let kill = ExitStatus::from_raw(libc::SIGKILL);
        assert!(matches!(
            classify_exit(kill, String::new(), Duration::from_secs(6), 5),
            SandboxError::CpuLimitExceeded
        ));
        // Killed well before the CPU ceiling could be reached.
        assert!(matches!(
            classify_exit(kill, String::new(), Duration::from_millis(800), 5),
            SandboxError::AbnormalTermination {
                signal: Some(s),
                ..
            } if s == libc::SIGKILL
        ));
    }
}

//! Local-process isolation backend
//!
//! Fallback for hosts without a container engine: runs the code in a spawned
//! child process with rlimit-based resource enforcement applied between fork
//! and exec. Weaker isolation than a container (no filesystem or network
//! namespace), but the same contract: hard wall-clock deadline, forced
//! termination, scratch-directory lifecycle, and raw outcome reporting. The
//! CPU-time rlimit is a second ceiling independent of the wall-clock
//! deadline, so multi-process fork bombs cannot outlive it.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::scratch::ScratchDir;
use super::{IsolationBackend, RawRunResult};
use crate::core_types::{ExecutionEnvironment, ExecutionLanguage, ResourceLimits};
use crate::errors::BackendError;

#[derive(Default)]
pub struct LocalProcessBackend;

impl LocalProcessBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl IsolationBackend for LocalProcessBackend {
    async fn run(
        &self,
        code: &str,
        env: &ExecutionEnvironment,
        limits: &ResourceLimits,
        cancel: CancellationToken,
    ) -> Result<RawRunResult, BackendError> {
        let scratch = ScratchDir::for_execution(env, code).await?;

        let interpreter = env.language.interpreter();
        let mut cmd = Command::new(interpreter[0]);
        cmd.args(&interpreter[1..]);
        cmd.arg(scratch.script_path());
        cmd.current_dir(scratch.path());
        cmd.env_clear();
        cmd.env(
            "PATH",
            std::env::var("PATH").unwrap_or_else(|_| "/usr/local/bin:/usr/bin:/bin".to_string()),
        );
        cmd.envs(&env.env_vars);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        #[cfg(unix)]
        {
            let limits = *limits;
            unsafe {
                cmd.pre_exec(move || apply_rlimits(&limits));
            }
        }

        #[cfg(unix)]
        let cpu_before = children_cpu_seconds();

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|e| BackendError::Spawn(e.to_string()))?;

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            String::from_utf8_lossy(&buf).into_owned()
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            String::from_utf8_lossy(&buf).into_owned()
        });

        // The wait future borrows the child, so the kill happens after the
        // race resolves, not inside an arm body.
        let waited = tokio::select! {
            res = tokio::time::timeout(limits.timeout(), child.wait()) => Some(res),
            _ = cancel.cancelled() => None,
        };
        let status = match waited {
            Some(Ok(status)) => status?,
            Some(Err(_elapsed)) => {
                log::warn!(
                    "Local execution exceeded {}s; killing child",
                    limits.max_execution_time_s
                );
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(BackendError::Timeout);
            }
            None => {
                log::info!("Local execution cancelled; killing child");
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(BackendError::Cancelled);
            }
        };
        let duration = started.elapsed();

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        // Killed-by-signal has no code; report the conventional -1.
        let exit_code = status.code().map(i64::from).unwrap_or(-1);

        #[cfg(unix)]
        let (memory_peak_mb, cpu_usage_percent) = {
            // ru_maxrss covers every child this process has reaped, so
            // concurrent executions can over-report each other's peaks.
            let memory = children_max_rss_mb().unwrap_or(0.0);
            let cpu_delta = children_cpu_seconds()
                .zip(cpu_before)
                .map(|(after, before)| (after - before).max(0.0))
                .unwrap_or(0.0);
            let wall = duration.as_secs_f64().max(f64::EPSILON);
            (memory, cpu_delta / wall * 100.0)
        };
        #[cfg(not(unix))]
        let (memory_peak_mb, cpu_usage_percent) = (0.0, 0.0);

        let (files_created, files_modified) = scratch.changed_files();

        Ok(RawRunResult {
            stdout,
            stderr,
            exit_code,
            duration,
            memory_peak_mb,
            cpu_usage_percent,
            files_created,
            files_modified,
        })
    }

    async fn is_available(&self) -> bool {
        // Always usable as a fallback; a missing interpreter surfaces as a
        // spawn failure on the run itself.
        true
    }

    async fn install_dependencies(
        &self,
        _language: ExecutionLanguage,
        _packages: &[String],
    ) -> Result<(), BackendError> {
        Err(BackendError::Unsupported(
            "dependency installation requires the container backend".to_string(),
        ))
    }

    fn name(&self) -> &'static str {
        "local-process"
    }
}

/// Applied between fork and exec in the child.
#[cfg(unix)]
fn apply_rlimits(limits: &ResourceLimits) -> std::io::Result<()> {
    unsafe {
        let cpu = libc::rlimit {
            rlim_cur: limits.max_execution_time_s as libc::rlim_t,
            rlim_max: limits.max_execution_time_s as libc::rlim_t,
        };
        if libc::setrlimit(libc::RLIMIT_CPU, &cpu) != 0 {
            return Err(std::io::Error::last_os_error());
        }

        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            let mem_bytes = limits.max_memory_mb.saturating_mul(1024 * 1024);
            let address_space = libc::rlimit {
                rlim_cur: mem_bytes as libc::rlim_t,
                rlim_max: mem_bytes as libc::rlim_t,
            };
            if libc::setrlimit(libc::RLIMIT_AS, &address_space) != 0 {
                return Err(std::io::Error::last_os_error());
            }
        }

        let nofile = libc::rlimit {
            rlim_cur: limits.max_file_descriptors as libc::rlim_t,
            rlim_max: limits.max_file_descriptors as libc::rlim_t,
        };
        if libc::setrlimit(libc::RLIMIT_NOFILE, &nofile) != 0 {
            return Err(std::io::Error::last_os_error());
        }

        #[cfg(any(target_os = "linux", target_os = "android", target_os = "macos"))]
        {
            let nproc = libc::rlimit {
                rlim_cur: limits.max_processes as libc::rlim_t,
                rlim_max: limits.max_processes as libc::rlim_t,
            };
            if libc::setrlimit(libc::RLIMIT_NPROC, &nproc) != 0 {
                return Err(std::io::Error::last_os_error());
            }
        }

        let core = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        if libc::setrlimit(libc::RLIMIT_CORE, &core) != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(unix)]
fn children_rusage() -> Option<libc::rusage> {
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::getrusage(libc::RUSAGE_CHILDREN, &mut usage) };
    if rc == 0 {
        Some(usage)
    } else {
        None
    }
}

#[cfg(unix)]
fn children_max_rss_mb() -> Option<f64> {
    let usage = children_rusage()?;
    // ru_maxrss is kilobytes on Linux, bytes on macOS.
    #[cfg(target_os = "macos")]
    let mb = usage.ru_maxrss as f64 / (1024.0 * 1024.0);
    #[cfg(not(target_os = "macos"))]
    let mb = usage.ru_maxrss as f64 / 1024.0;
    Some(mb)
}

#[cfg(unix)]
fn children_cpu_seconds() -> Option<f64> {
    let usage = children_rusage()?;
    let user = usage.ru_utime.tv_sec as f64 + usage.ru_utime.tv_usec as f64 / 1e6;
    let system = usage.ru_stime.tv_sec as f64 + usage.ru_stime.tv_usec as f64 / 1e6;
    Some(user + system)
}

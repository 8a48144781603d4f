//! Isolation backends for sandboxed code execution.
//!
//! Provides the pluggable mechanisms that actually run one code unit under
//! enforced resource limits: a Docker container backend, and a local-process
//! backend with rlimit enforcement for hosts without a container engine.
//! Backends report raw outcomes only; mapping to execution statuses is the
//! orchestrator's job.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::core_types::{ExecutionEnvironment, ExecutionLanguage, ResourceLimits};
use crate::errors::BackendError;

/// Raw process output from one backend run, before status mapping.
#[derive(Debug, Clone, Default)]
pub struct RawRunResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
    pub duration: Duration,
    pub memory_peak_mb: f64,
    pub cpu_usage_percent: f64,
    pub files_created: Vec<PathBuf>,
    pub files_modified: Vec<PathBuf>,
}

#[async_trait]
pub trait IsolationBackend: Send + Sync {
    /// Execute one code unit under the given environment and limits.
    ///
    /// Timeouts and cancellation are reported as `BackendError::Timeout` and
    /// `BackendError::Cancelled`; the underlying process or container is
    /// force-terminated and the scratch directory reclaimed in either case.
    async fn run(
        &self,
        code: &str,
        env: &ExecutionEnvironment,
        limits: &ResourceLimits,
        cancel: CancellationToken,
    ) -> Result<RawRunResult, BackendError>;

    async fn is_available(&self) -> bool;

    /// Install packages for a language, where the backend supports it.
    async fn install_dependencies(
        &self,
        language: ExecutionLanguage,
        packages: &[String],
    ) -> Result<(), BackendError>;

    fn name(&self) -> &'static str;
}

pub mod docker;
pub mod local;
pub mod scratch;

pub use docker::DockerBackend;
pub use local::LocalProcessBackend;

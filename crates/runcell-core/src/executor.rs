//! Execution orchestration: validation, dispatch, tracking, and history
//!
//! The `CodeExecutor` ties the engine together. Every submission passes the
//! dangerous-pattern gate, runs on the selected isolation backend, and comes
//! back as a fully analyzed `ExecutionResult`. The executor is the only
//! component that assigns execution statuses: backends report raw outcomes,
//! and every failure mode - rejection, infrastructure error, runtime
//! failure, timeout, cancellation - is converted into a well-formed result
//! rather than an error. The active-execution registry and the bounded
//! history buffer are the only shared mutable state, each behind its own
//! lock held only for short, non-await critical sections.

use chrono::Utc;
use futures_util::future::join_all;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::analyzer::ResultAnalyzer;
use crate::config::{BackendKind, ExecutorConfig};
use crate::core_types::{
    CodeValidationResult, ErrorAnalysis, ExecutionEnvironment, ExecutionLanguage,
    ExecutionRequest, ExecutionResult, ExecutionStatistics, ExecutionStatus, ResourceLimits,
    RiskLevel,
};
use crate::errors::{BackendError, ExecutorError};
use crate::executors::{DockerBackend, IsolationBackend, LocalProcessBackend, RawRunResult};
use crate::validation::DangerousPatternDetector;

/// Scoped working directory shared by a group of executions.
///
/// Pass `request(...)` results (or set `working_directory` yourself) to run
/// several code units against the same files. The directory is removed when
/// the context drops, success or failure.
pub struct ExecutionContext {
    dir: TempDir,
}

impl ExecutionContext {
    fn create() -> Result<Self, ExecutorError> {
        let dir = tempfile::Builder::new()
            .prefix("runcell-ctx-")
            .tempdir()
            .map_err(|e| ExecutorError::IoError(e.to_string()))?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// An `ExecutionRequest` bound to this context's working directory.
    pub fn request(
        &self,
        code: impl Into<String>,
        language: ExecutionLanguage,
    ) -> ExecutionRequest {
        let mut request = ExecutionRequest::new(code, language);
        request.working_directory = Some(self.dir.path().to_path_buf());
        request
    }
}

pub struct CodeExecutor {
    config: ExecutorConfig,
    detector: DangerousPatternDetector,
    analyzer: ResultAnalyzer,
    backend: Arc<dyn IsolationBackend>,
    active: Mutex<HashMap<String, CancellationToken>>,
    history: Mutex<VecDeque<ExecutionResult>>,
}

impl CodeExecutor {
    /// Build an executor, selecting the isolation backend per the config:
    /// Docker when the daemon answers, the local-process fallback otherwise.
    ///
    /// Fails fast on malformed configuration; nothing else in the engine
    /// returns an error to the caller.
    pub async fn new(config: ExecutorConfig) -> Result<Self, ExecutorError> {
        config.validate()?;
        let backend = select_backend(&config).await?;
        Ok(Self::assemble(config, backend))
    }

    /// Build an executor around a caller-supplied backend.
    pub fn with_backend(
        config: ExecutorConfig,
        backend: Arc<dyn IsolationBackend>,
    ) -> Result<Self, ExecutorError> {
        config.validate()?;
        Ok(Self::assemble(config, backend))
    }

    fn assemble(config: ExecutorConfig, backend: Arc<dyn IsolationBackend>) -> Self {
        let detector = DangerousPatternDetector::new(config.security_level);
        let analyzer = ResultAnalyzer::new(config.scoring);
        let capacity = config.history_capacity;
        Self {
            config,
            detector,
            analyzer,
            backend,
            active: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Validate and execute one code fragment with default limits.
    pub async fn execute(&self, code: &str, language: ExecutionLanguage) -> ExecutionResult {
        self.execute_request(ExecutionRequest::new(code, language))
            .await
    }

    /// Validate and execute one request. Never returns an error: every
    /// failure mode is folded into the returned result.
    pub async fn execute_request(&self, request: ExecutionRequest) -> ExecutionResult {
        let execution_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();

        let validation = self.detector.validate(&request.code, request.language);
        if !validation.is_safe {
            log::info!(
                "Execution {} blocked by safety gate: risk {} under security level {:?}",
                execution_id,
                validation.risk_level.as_str(),
                self.detector.security_level()
            );
            let result = self.rejection_result(execution_id, started_at, &validation);
            self.record(result.clone());
            return result;
        }

        let limits = request.limits.unwrap_or(self.config.default_limits);
        if let Err(e) = limits.validate() {
            log::warn!("Rejecting execution {}: {}", execution_id, e);
            let result = self.failed_before_dispatch(execution_id, started_at, e.to_string());
            self.record(result.clone());
            return result;
        }

        if !request.dependencies.is_empty() {
            if let Err(e) = self
                .backend
                .install_dependencies(request.language, &request.dependencies)
                .await
            {
                log::warn!("Dependency installation failed for {}: {}", execution_id, e);
                let result = self.failed_before_dispatch(execution_id, started_at, e.to_string());
                self.record(result.clone());
                return result;
            }
        }

        let mut env = ExecutionEnvironment::new(request.language);
        env.working_directory = request.working_directory.clone();
        env.env_vars = request.env_vars.clone();
        env.dependencies = request.dependencies.clone();
        env.container_image = request.container_image.clone();

        let cancel = CancellationToken::new();
        self.active
            .lock()
            .unwrap()
            .insert(execution_id.clone(), cancel.clone());
        log::info!(
            "Dispatching execution {} ({} on {})",
            execution_id,
            request.language.as_str(),
            self.backend.name()
        );

        let raw = self
            .backend
            .run(&request.code, &env, &limits, cancel)
            .await;

        self.active.lock().unwrap().remove(&execution_id);

        let result = self.finish(execution_id, started_at, raw, &limits);
        self.record(result.clone());
        result
    }

    /// Run all requests concurrently. The output always has the same length
    /// and order as the input; per-request failures become `Failed` results
    /// in place.
    pub async fn execute_batch(&self, requests: Vec<ExecutionRequest>) -> Vec<ExecutionResult> {
        log::info!("Executing batch of {} request(s)", requests.len());
        let futures = requests
            .into_iter()
            .map(|request| self.execute_request(request));
        join_all(futures).await
    }

    /// Cancel a running execution. Returns false when the id is unknown or
    /// already terminal; true means the cancellation was delivered and the
    /// execution will surface as `Killed`.
    pub fn kill_execution(&self, execution_id: &str) -> bool {
        let active = self.active.lock().unwrap();
        match active.get(execution_id) {
            Some(token) => {
                log::info!("Killing execution {}", execution_id);
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Ids of executions currently in flight.
    pub fn active_executions(&self) -> Vec<String> {
        self.active.lock().unwrap().keys().cloned().collect()
    }

    /// Most-recent-first slice of the bounded history.
    pub fn history(&self, limit: usize) -> Vec<ExecutionResult> {
        let history = self.history.lock().unwrap();
        history.iter().rev().take(limit).cloned().collect()
    }

    /// Aggregates over the whole history buffer; zeros when empty.
    pub fn statistics(&self) -> ExecutionStatistics {
        let history = self.history.lock().unwrap();
        let total = history.len();
        if total == 0 {
            return ExecutionStatistics::default();
        }
        let completed = history
            .iter()
            .filter(|r| r.status == ExecutionStatus::Completed)
            .count();
        let time_sum: f64 = history.iter().map(|r| r.execution_time_s).sum();
        let memory_sum: f64 = history.iter().map(|r| r.memory_peak_mb).sum();
        ExecutionStatistics {
            total,
            success_rate: completed as f64 / total as f64,
            avg_time: time_sum / total as f64,
            avg_memory: memory_sum / total as f64,
        }
    }

    /// A dedicated working directory for a group of executions, removed on
    /// drop regardless of how the group went.
    pub fn execution_context(&self) -> Result<ExecutionContext, ExecutorError> {
        ExecutionContext::create()
    }

    /// Install packages for a language via the backend, where supported.
    pub async fn install_dependencies(
        &self,
        language: ExecutionLanguage,
        packages: &[String],
    ) -> Result<(), ExecutorError> {
        self.backend
            .install_dependencies(language, packages)
            .await
            .map_err(|e| ExecutorError::InternalError(e.to_string()))
    }

    // Map a raw backend outcome onto the canonical status machine and run
    // the analyzer. This is the only place statuses are assigned.
    fn finish(
        &self,
        execution_id: String,
        started_at: chrono::DateTime<Utc>,
        raw: Result<RawRunResult, BackendError>,
        limits: &ResourceLimits,
    ) -> ExecutionResult {
        let mut result = match raw {
            Ok(raw) => {
                let status = if raw.exit_code == 0 {
                    ExecutionStatus::Completed
                } else {
                    ExecutionStatus::Failed
                };
                ExecutionResult {
                    execution_id,
                    status,
                    exit_code: Some(raw.exit_code),
                    stdout: raw.stdout,
                    stderr: raw.stderr,
                    execution_time_s: raw.duration.as_secs_f64(),
                    memory_peak_mb: raw.memory_peak_mb,
                    cpu_usage_percent: raw.cpu_usage_percent,
                    files_created: raw.files_created,
                    files_modified: raw.files_modified,
                    started_at,
                    error_analysis: None,
                    performance_profile: None,
                }
            }
            Err(BackendError::Timeout) => ExecutionResult {
                execution_id,
                status: ExecutionStatus::Timeout,
                exit_code: None,
                stdout: String::new(),
                stderr: format!(
                    "Execution exceeded the {}s time limit and was terminated",
                    limits.max_execution_time_s
                ),
                execution_time_s: limits.max_execution_time_s as f64,
                memory_peak_mb: 0.0,
                cpu_usage_percent: 0.0,
                files_created: Vec::new(),
                files_modified: Vec::new(),
                started_at,
                error_analysis: None,
                performance_profile: None,
            },
            Err(BackendError::Cancelled) => ExecutionResult {
                execution_id,
                status: ExecutionStatus::Killed,
                exit_code: None,
                stdout: String::new(),
                stderr: "Execution was killed by request".to_string(),
                execution_time_s: (Utc::now() - started_at).num_milliseconds() as f64 / 1000.0,
                memory_peak_mb: 0.0,
                cpu_usage_percent: 0.0,
                files_created: Vec::new(),
                files_modified: Vec::new(),
                started_at,
                error_analysis: None,
                performance_profile: None,
            },
            Err(e) => {
                log::error!("Backend failure for execution {}: {}", execution_id, e);
                ExecutionResult {
                    execution_id,
                    status: ExecutionStatus::Failed,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: e.to_string(),
                    execution_time_s: (Utc::now() - started_at).num_milliseconds() as f64 / 1000.0,
                    memory_peak_mb: 0.0,
                    cpu_usage_percent: 0.0,
                    files_created: Vec::new(),
                    files_modified: Vec::new(),
                    started_at,
                    error_analysis: None,
                    performance_profile: None,
                }
            }
        };

        let (error_analysis, profile) = self.analyzer.analyze(&result);
        result.error_analysis = error_analysis;
        result.performance_profile = Some(profile);
        result
    }

    // Failed result for a request that never reached a backend.
    fn failed_before_dispatch(
        &self,
        execution_id: String,
        started_at: chrono::DateTime<Utc>,
        stderr: String,
    ) -> ExecutionResult {
        let mut result = ExecutionResult {
            execution_id,
            status: ExecutionStatus::Failed,
            exit_code: None,
            stdout: String::new(),
            stderr,
            execution_time_s: 0.0,
            memory_peak_mb: 0.0,
            cpu_usage_percent: 0.0,
            files_created: Vec::new(),
            files_modified: Vec::new(),
            started_at,
            error_analysis: None,
            performance_profile: None,
        };
        let (error_analysis, profile) = self.analyzer.analyze(&result);
        result.error_analysis = error_analysis;
        result.performance_profile = Some(profile);
        result
    }

    // Synthetic Failed result for code the safety gate refused. No backend
    // is touched and no time is charged.
    fn rejection_result(
        &self,
        execution_id: String,
        started_at: chrono::DateTime<Utc>,
        validation: &CodeValidationResult,
    ) -> ExecutionResult {
        let severity = match validation.risk_level {
            RiskLevel::Critical | RiskLevel::High => "high",
            RiskLevel::Medium => "medium",
            RiskLevel::Low => "low",
        };
        let mut result = ExecutionResult {
            execution_id,
            status: ExecutionStatus::Failed,
            exit_code: None,
            stdout: String::new(),
            stderr: format!(
                "Blocked by dangerous-pattern detector: {}",
                validation.detected_patterns.join("; ")
            ),
            execution_time_s: 0.0,
            memory_peak_mb: 0.0,
            cpu_usage_percent: 0.0,
            files_created: Vec::new(),
            files_modified: Vec::new(),
            started_at,
            error_analysis: Some(ErrorAnalysis {
                error_type: "validation_rejection".to_string(),
                likely_cause: format!(
                    "Code risk level '{}' is not permitted at the configured security level",
                    validation.risk_level.as_str()
                ),
                suggestions: validation.recommendations.clone(),
                severity: severity.to_string(),
            }),
            performance_profile: None,
        };
        let (_, profile) = self.analyzer.analyze(&result);
        result.performance_profile = Some(profile);
        result
    }

    fn record(&self, result: ExecutionResult) {
        let mut history = self.history.lock().unwrap();
        if history.len() >= self.config.history_capacity {
            history.pop_front();
        }
        history.push_back(result);
    }
}

async fn select_backend(
    config: &ExecutorConfig,
) -> Result<Arc<dyn IsolationBackend>, ExecutorError> {
    match config.backend {
        BackendKind::Docker => {
            let backend = DockerBackend::new()
                .map_err(|e| ExecutorError::NoBackendAvailable(e.to_string()))?;
            if !backend.is_available().await {
                return Err(ExecutorError::NoBackendAvailable(
                    "Docker daemon did not respond to ping".to_string(),
                ));
            }
            Ok(Arc::new(backend))
        }
        BackendKind::LocalProcess => Ok(Arc::new(LocalProcessBackend::new())),
        BackendKind::Auto => {
            if let Ok(backend) = DockerBackend::new() {
                if backend.is_available().await {
                    log::info!("Using the Docker isolation backend");
                    return Ok(Arc::new(backend));
                }
            }
            log::info!("Docker unavailable; using the local-process backend");
            Ok(Arc::new(LocalProcessBackend::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{ExecutionEnvironment, SecurityLevel};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    // Scripted backend for orchestration tests: behavior is keyed off the
    // submitted code so concurrent requests stay deterministic.
    struct MockBackend {
        calls: AtomicUsize,
    }

    impl MockBackend {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl IsolationBackend for MockBackend {
        async fn run(
            &self,
            code: &str,
            _env: &ExecutionEnvironment,
            _limits: &ResourceLimits,
            cancel: CancellationToken,
        ) -> Result<RawRunResult, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if code.contains("@hang") {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(30)) => {}
                    _ = cancel.cancelled() => return Err(BackendError::Cancelled),
                }
            }
            if code.contains("@timeout") {
                return Err(BackendError::Timeout);
            }
            if code.contains("@infra") {
                return Err(BackendError::Unavailable("daemon gone".to_string()));
            }
            let exit_code = if code.contains("@fail") { 1 } else { 0 };
            Ok(RawRunResult {
                stdout: code.to_string(),
                stderr: String::new(),
                exit_code,
                duration: Duration::from_millis(10),
                memory_peak_mb: 5.0,
                cpu_usage_percent: 1.0,
                files_created: Vec::new(),
                files_modified: Vec::new(),
            })
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn install_dependencies(
            &self,
            _language: ExecutionLanguage,
            _packages: &[String],
        ) -> Result<(), BackendError> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "mock"
        }
    }

    fn executor_with(backend: Arc<MockBackend>, config: ExecutorConfig) -> CodeExecutor {
        CodeExecutor::with_backend(config, backend).unwrap()
    }

    fn default_executor(backend: Arc<MockBackend>) -> CodeExecutor {
        executor_with(backend, ExecutorConfig::default())
    }

    #[tokio::test]
    async fn dangerous_code_is_rejected_without_touching_the_backend() {
        let backend = MockBackend::new();
        let executor = default_executor(backend.clone());
        let result = executor
            .execute("import os; os.system('rm -rf /')", ExecutionLanguage::Python)
            .await;

        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.execution_time_s, 0.0);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        let analysis = result.error_analysis.unwrap();
        assert_eq!(analysis.error_type, "validation_rejection");
        assert!(result.stderr.contains("system_calls"));
        // Rejections are recorded in history too.
        assert_eq!(executor.history(10).len(), 1);
    }

    #[tokio::test]
    async fn clean_exit_maps_to_completed() {
        let executor = default_executor(MockBackend::new());
        let result = executor.execute("print('hi')", ExecutionLanguage::Python).await;
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.exit_code, Some(0));
        assert!(result.error_analysis.is_none());
        assert!(result.performance_profile.is_some());
    }

    #[tokio::test]
    async fn nonzero_exit_maps_to_failed() {
        let executor = default_executor(MockBackend::new());
        let result = executor.execute("x = 1 # @fail", ExecutionLanguage::Python).await;
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.exit_code, Some(1));
        assert!(result.error_analysis.is_some());
    }

    #[tokio::test]
    async fn backend_timeout_maps_to_timeout_status() {
        let executor = default_executor(MockBackend::new());
        let result = executor.execute("x = 1 # @timeout", ExecutionLanguage::Python).await;
        assert_eq!(result.status, ExecutionStatus::Timeout);
        assert_eq!(result.error_analysis.unwrap().error_type, "timeout");
    }

    #[tokio::test]
    async fn infrastructure_error_maps_to_failed_with_cause() {
        let executor = default_executor(MockBackend::new());
        let result = executor.execute("x = 1 # @infra", ExecutionLanguage::Python).await;
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(result.stderr.contains("daemon gone"));
    }

    #[tokio::test]
    async fn batch_preserves_length_and_order_under_failure() {
        let executor = default_executor(MockBackend::new());
        let requests = vec![
            ExecutionRequest::new("a = 1", ExecutionLanguage::Python),
            ExecutionRequest::new("b = 2 # @infra", ExecutionLanguage::Python),
            ExecutionRequest::new("c = 3 # @fail", ExecutionLanguage::Python),
            ExecutionRequest::new("d = 4", ExecutionLanguage::Python),
        ];
        let results = executor.execute_batch(requests).await;
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].status, ExecutionStatus::Completed);
        assert!(results[0].stdout.contains("a = 1"));
        assert_eq!(results[1].status, ExecutionStatus::Failed);
        assert_eq!(results[2].status, ExecutionStatus::Failed);
        assert_eq!(results[3].status, ExecutionStatus::Completed);
        assert!(results[3].stdout.contains("d = 4"));
    }

    #[tokio::test]
    async fn kill_running_execution_yields_killed_status() {
        let executor = Arc::new(default_executor(MockBackend::new()));
        let runner = executor.clone();
        let task = tokio::spawn(async move {
            runner.execute("loop() # @hang", ExecutionLanguage::Python).await
        });

        // Wait for the execution to land in the registry.
        let mut active = Vec::new();
        for _ in 0..100 {
            active = executor.active_executions();
            if !active.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(active.len(), 1);

        assert!(executor.kill_execution(&active[0]));
        let result = task.await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Killed);
        assert!(executor.active_executions().is_empty());
        // The id is terminal now; a second kill is a no-op.
        assert!(!executor.kill_execution(&active[0]));
    }

    #[tokio::test]
    async fn kill_unknown_execution_returns_false() {
        let executor = default_executor(MockBackend::new());
        assert!(!executor.kill_execution("no-such-id"));
    }

    #[tokio::test]
    async fn history_is_bounded_fifo() {
        let config = ExecutorConfig {
            history_capacity: 3,
            ..Default::default()
        };
        let executor = executor_with(MockBackend::new(), config);
        for i in 0..5 {
            executor
                .execute(&format!("x = {}", i), ExecutionLanguage::Python)
                .await;
        }
        let history = executor.history(10);
        assert_eq!(history.len(), 3);
        // Most recent first; the two oldest were evicted.
        assert!(history[0].stdout.contains("x = 4"));
        assert!(history[2].stdout.contains("x = 2"));
    }

    #[tokio::test]
    async fn statistics_aggregate_history() {
        let executor = default_executor(MockBackend::new());
        assert_eq!(executor.statistics().total, 0);
        assert_eq!(executor.statistics().success_rate, 0.0);

        executor.execute("a = 1", ExecutionLanguage::Python).await;
        executor.execute("b = 2 # @fail", ExecutionLanguage::Python).await;
        let stats = executor.statistics();
        assert_eq!(stats.total, 2);
        assert!((stats.success_rate - 0.5).abs() < 1e-9);
        assert!(stats.avg_time > 0.0);
    }

    #[tokio::test]
    async fn invalid_per_call_limits_become_failed_results() {
        let executor = default_executor(MockBackend::new());
        let request = ExecutionRequest::new("x = 1", ExecutionLanguage::Python).with_limits(
            ResourceLimits {
                max_memory_mb: 0,
                ..Default::default()
            },
        );
        let result = executor.execute_request(request).await;
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(result.stderr.contains("max_memory_mb"));
    }

    #[tokio::test]
    async fn maximum_security_rejects_medium_risk() {
        let config = ExecutorConfig {
            security_level: SecurityLevel::Maximum,
            ..Default::default()
        };
        let backend = MockBackend::new();
        let executor = executor_with(backend.clone(), config);
        let result = executor
            .execute("os.environ['X'] = '1'", ExecutionLanguage::Python)
            .await;
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn execution_context_directory_is_removed_on_drop() {
        let executor = default_executor(MockBackend::new());
        let context = executor.execution_context().unwrap();
        let path = context.path().to_path_buf();
        assert!(path.exists());
        let request = context.request("x = 1", ExecutionLanguage::Python);
        assert_eq!(request.working_directory.as_deref(), Some(path.as_path()));
        drop(context);
        assert!(!path.exists());
    }

    // End-to-end coverage through the real local-process backend.
    #[cfg(unix)]
    mod local_backend {
        use super::*;
        use crate::config::BackendKind;

        async fn local_executor() -> CodeExecutor {
            let config = ExecutorConfig {
                backend: BackendKind::LocalProcess,
                ..Default::default()
            };
            CodeExecutor::new(config).await.unwrap()
        }

        #[tokio::test]
        async fn bash_echo_completes() {
            let executor = local_executor().await;
            let result = executor.execute("echo hi", ExecutionLanguage::Bash).await;
            assert_eq!(result.status, ExecutionStatus::Completed);
            assert_eq!(result.exit_code, Some(0));
            assert!(result.stdout.contains("hi"));
        }

        #[tokio::test]
        async fn python_hello_completes_when_python_is_present() {
            if std::process::Command::new("python3")
                .arg("--version")
                .output()
                .is_err()
            {
                return;
            }
            let executor = local_executor().await;
            let result = executor.execute("print('hi')", ExecutionLanguage::Python).await;
            assert_eq!(result.status, ExecutionStatus::Completed);
            assert_eq!(result.exit_code, Some(0));
            assert!(result.stdout.contains("hi"));
        }

        #[tokio::test]
        async fn long_sleep_times_out_and_leaves_registry_empty() {
            let executor = local_executor().await;
            let request = ExecutionRequest::new("sleep 60", ExecutionLanguage::Bash)
                .with_limits(ResourceLimits {
                    max_execution_time_s: 2,
                    ..Default::default()
                });
            let started = std::time::Instant::now();
            let result = executor.execute_request(request).await;
            assert_eq!(result.status, ExecutionStatus::Timeout);
            assert!(started.elapsed().as_secs() < 10);
            assert!(executor.active_executions().is_empty());
        }

        #[tokio::test]
        async fn batch_of_trivial_snippets_preserves_order() {
            let executor = local_executor().await;
            let requests: Vec<_> = (0..5)
                .map(|i| ExecutionRequest::new(format!("echo cell-{}", i), ExecutionLanguage::Bash))
                .collect();
            let results = executor.execute_batch(requests).await;
            assert_eq!(results.len(), 5);
            for (i, result) in results.iter().enumerate() {
                assert_eq!(result.status, ExecutionStatus::Completed);
                assert!(result.stdout.contains(&format!("cell-{}", i)));
            }
        }

        #[tokio::test]
        async fn context_groups_share_a_working_directory() {
            let executor = local_executor().await;
            let context = executor.execution_context().unwrap();
            let write = context.request("echo shared > note.txt", ExecutionLanguage::Bash);
            let read = context.request("cat note.txt", ExecutionLanguage::Bash);

            let result = executor.execute_request(write).await;
            assert_eq!(result.status, ExecutionStatus::Completed);
            assert_eq!(
                result.files_created,
                vec![std::path::PathBuf::from("note.txt")]
            );

            let result = executor.execute_request(read).await;
            assert_eq!(result.status, ExecutionStatus::Completed);
            assert!(result.stdout.contains("shared"));
        }
    }
}

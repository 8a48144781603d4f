//! Sandboxed code-execution engine for agent frameworks.
//!
//! This crate provides the infrastructure for running untrusted code
//! fragments (typically produced by LLM agents) under resource and security
//! constraints, returning structured results instead of letting the code run
//! freely in the host process.
//!
//! # Architecture Overview
//!
//! The engine is organized around a few subsystems:
//!
//! - **Validation gate**: static dangerous-pattern detection with a
//!   configurable security level that decides what may run at all
//! - **Isolation backends**: pluggable execution mechanisms - Docker
//!   containers with hard resource ceilings, or local child processes with
//!   rlimit enforcement for hosts without a container engine
//! - **Result analysis**: error classification and performance profiling of
//!   every finished execution
//! - **Orchestration**: the `CodeExecutor`, which owns validation, dispatch,
//!   cancellation, the active-execution registry, and a bounded history
//!   buffer with aggregate statistics
//! - **Configuration system**: serde-based config with environment-grade
//!   defaults, loadable from YAML
//!
//! ```no_run
//! use runcell_core::{CodeExecutor, ExecutorConfig, ExecutionLanguage};
//!
//! # async fn run() {
//! let executor = CodeExecutor::new(ExecutorConfig::default()).await.unwrap();
//! let result = executor.execute("print('hi')", ExecutionLanguage::Python).await;
//! assert_eq!(result.stdout.trim(), "hi");
//! # }
//! ```

pub mod analyzer;
pub mod config;
pub mod core_types;
pub mod errors;
pub mod executor;
pub mod executors;
pub mod validation;

pub use analyzer::ResultAnalyzer;
pub use config::{BackendKind, ExecutorConfig, ScoringConfig};
pub use core_types::{
    CodeValidationResult, ErrorAnalysis, ExecutionEnvironment, ExecutionLanguage,
    ExecutionRequest, ExecutionResult, ExecutionStatistics, ExecutionStatus, PerformanceProfile,
    ResourceLimits, RiskLevel, SecurityLevel,
};
pub use errors::{BackendError, ExecutorError};
pub use executor::{CodeExecutor, ExecutionContext};
pub use executors::{DockerBackend, IsolationBackend, LocalProcessBackend, RawRunResult};
pub use validation::DangerousPatternDetector;

//! Core type definitions for the execution engine contract
//!
//! This module defines the data structures exchanged between callers, the
//! orchestrator, and the isolation backends. Value objects are validated at
//! construction and never mutated afterwards; the orchestrator is the only
//! component that assigns an `ExecutionStatus` to a result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::ExecutorError;

/// Languages the engine knows how to run.
///
/// The language determines the default container image, the interpreter
/// invocation, and the on-disk file extension. TypeScript runs under Deno so
/// no transpilation step is needed inside the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionLanguage {
    Python,
    NodeJs,
    Bash,
    JavaScript,
    TypeScript,
}

impl ExecutionLanguage {
    pub fn container_image(&self) -> &'static str {
        match self {
            ExecutionLanguage::Python => "python:3.11-slim",
            ExecutionLanguage::NodeJs | ExecutionLanguage::JavaScript => "node:20-slim",
            ExecutionLanguage::TypeScript => "denoland/deno:alpine",
            ExecutionLanguage::Bash => "bash:5.2",
        }
    }

    /// Interpreter argv prefix; the script path is appended as the last
    /// argument by the backend.
    pub fn interpreter(&self) -> &'static [&'static str] {
        match self {
            ExecutionLanguage::Python => &["python3"],
            ExecutionLanguage::NodeJs | ExecutionLanguage::JavaScript => &["node"],
            ExecutionLanguage::TypeScript => &["deno", "run", "--quiet"],
            ExecutionLanguage::Bash => &["bash"],
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            ExecutionLanguage::Python => "py",
            ExecutionLanguage::NodeJs | ExecutionLanguage::JavaScript => "js",
            ExecutionLanguage::TypeScript => "ts",
            ExecutionLanguage::Bash => "sh",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionLanguage::Python => "python",
            ExecutionLanguage::NodeJs => "nodejs",
            ExecutionLanguage::Bash => "bash",
            ExecutionLanguage::JavaScript => "javascript",
            ExecutionLanguage::TypeScript => "typescript",
        }
    }
}

/// Operator-configured strictness threshold, ordered by strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    Low,
    Medium,
    High,
    Maximum,
}

/// Detector classification of how dangerous a code fragment appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

/// Resource ceilings applied to one execution. All fields must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub max_memory_mb: u64,
    pub max_cpu_percent: u64,
    pub max_execution_time_s: u64,
    pub max_disk_mb: u64,
    pub max_processes: u64,
    pub max_file_descriptors: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_memory_mb: 512,
            max_cpu_percent: 50,
            max_execution_time_s: 30,
            max_disk_mb: 100,
            max_processes: 10,
            max_file_descriptors: 64,
        }
    }
}

impl ResourceLimits {
    pub fn validate(&self) -> Result<(), ExecutorError> {
        let fields = [
            ("max_memory_mb", self.max_memory_mb),
            ("max_cpu_percent", self.max_cpu_percent),
            ("max_execution_time_s", self.max_execution_time_s),
            ("max_disk_mb", self.max_disk_mb),
            ("max_processes", self.max_processes),
            ("max_file_descriptors", self.max_file_descriptors),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(ExecutorError::InvalidLimits(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.max_execution_time_s)
    }
}

/// Execution context for one code unit. Created per request, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEnvironment {
    pub language: ExecutionLanguage,
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub container_image: Option<String>,
    #[serde(default = "default_network_isolated")]
    pub network_isolated: bool,
}

fn default_network_isolated() -> bool {
    true
}

impl ExecutionEnvironment {
    pub fn new(language: ExecutionLanguage) -> Self {
        Self {
            language,
            working_directory: None,
            env_vars: HashMap::new(),
            dependencies: Vec::new(),
            container_image: None,
            network_isolated: true,
        }
    }

    pub fn with_working_directory(mut self, dir: PathBuf) -> Self {
        self.working_directory = Some(dir);
        self
    }

    pub fn with_env_vars(mut self, env_vars: HashMap<String, String>) -> Self {
        self.env_vars = env_vars;
        self
    }

    pub fn with_container_image(mut self, image: String) -> Self {
        self.container_image = Some(image);
        self
    }

    /// Image to run in: the explicit override, or the language default.
    pub fn image(&self) -> &str {
        self.container_image
            .as_deref()
            .unwrap_or_else(|| self.language.container_image())
    }
}

/// One submitted unit of work: code plus optional per-call overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub code: String,
    pub language: ExecutionLanguage,
    #[serde(default)]
    pub limits: Option<ResourceLimits>,
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub container_image: Option<String>,
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>, language: ExecutionLanguage) -> Self {
        Self {
            code: code.into(),
            language,
            limits: None,
            env_vars: HashMap::new(),
            dependencies: Vec::new(),
            container_image: None,
            working_directory: None,
        }
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = Some(limits);
        self
    }
}

/// Outcome of the pre-execution safety gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeValidationResult {
    pub is_safe: bool,
    pub risk_level: RiskLevel,
    pub detected_patterns: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Lifecycle of one execution. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
    Killed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed
                | ExecutionStatus::Failed
                | ExecutionStatus::Timeout
                | ExecutionStatus::Killed
        )
    }
}

/// Classification of a non-successful result, derived from stderr.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorAnalysis {
    pub error_type: String,
    pub likely_cause: String,
    pub suggestions: Vec<String>,
    pub severity: String,
}

/// Derived time/memory categorization and efficiency score for one result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceProfile {
    pub time_category: String,
    pub memory_category: String,
    pub efficiency_score: f64,
    pub bottlenecks: Vec<String>,
    pub optimizations: Vec<String>,
}

/// Final record of one execution. Created once by the orchestrator and never
/// mutated after completion; retained read-only in the history buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub exit_code: Option<i64>,
    pub stdout: String,
    pub stderr: String,
    pub execution_time_s: f64,
    pub memory_peak_mb: f64,
    pub cpu_usage_percent: f64,
    pub files_created: Vec<PathBuf>,
    pub files_modified: Vec<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub error_analysis: Option<ErrorAnalysis>,
    pub performance_profile: Option<PerformanceProfile>,
}

/// Aggregates over the history buffer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionStatistics {
    pub total: usize,
    pub success_rate: f64,
    pub avg_time: f64,
    pub avg_memory: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_are_valid() {
        assert!(ResourceLimits::default().validate().is_ok());
    }

    #[test]
    fn zero_limit_is_rejected() {
        let limits = ResourceLimits {
            max_memory_mb: 0,
            ..Default::default()
        };
        let err = limits.validate().unwrap_err();
        assert!(err.to_string().contains("max_memory_mb"));

        let limits = ResourceLimits {
            max_execution_time_s: 0,
            ..Default::default()
        };
        assert!(limits.validate().is_err());
    }

    #[test]
    fn security_levels_are_ordered_by_strictness() {
        assert!(SecurityLevel::Low < SecurityLevel::Medium);
        assert!(SecurityLevel::Medium < SecurityLevel::High);
        assert!(SecurityLevel::High < SecurityLevel::Maximum);
    }

    #[test]
    fn risk_levels_are_ordered() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Timeout.is_terminal());
        assert!(ExecutionStatus::Killed.is_terminal());
    }

    #[test]
    fn requests_deserialize_from_agent_json() {
        let request: ExecutionRequest = serde_json::from_str(
            r#"{"code": "print('hi')", "language": "python", "env_vars": {"MODE": "test"}}"#,
        )
        .unwrap();
        assert_eq!(request.language, ExecutionLanguage::Python);
        assert!(request.limits.is_none());
        assert_eq!(request.env_vars.get("MODE").map(String::as_str), Some("test"));
    }

    #[test]
    fn results_serialize_to_json() {
        let result = ExecutionResult {
            execution_id: "id".to_string(),
            status: ExecutionStatus::Completed,
            exit_code: Some(0),
            stdout: "hi\n".to_string(),
            stderr: String::new(),
            execution_time_s: 0.2,
            memory_peak_mb: 4.0,
            cpu_usage_percent: 1.5,
            files_created: vec![],
            files_modified: vec![],
            started_at: Utc::now(),
            error_analysis: None,
            performance_profile: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["exit_code"], 0);
    }

    #[test]
    fn environment_image_prefers_override() {
        let env = ExecutionEnvironment::new(ExecutionLanguage::Python)
            .with_container_image("python:3.12".to_string());
        assert_eq!(env.image(), "python:3.12");

        let env = ExecutionEnvironment::new(ExecutionLanguage::Python);
        assert_eq!(env.image(), "python:3.11-slim");
    }
}

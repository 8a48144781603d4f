//! Post-processing of raw execution output
//!
//! Turns a finished execution into an error classification (for anything
//! that did not complete) and a performance profile (for everything). The
//! classifier is a fixed, ordered list of stderr checks where the first
//! match wins; the profile scores time, memory, and success against the
//! configurable bounds in [`ScoringConfig`].

use crate::config::ScoringConfig;
use crate::core_types::{ErrorAnalysis, ExecutionResult, ExecutionStatus, PerformanceProfile};

pub struct ResultAnalyzer {
    scoring: ScoringConfig,
}

impl ResultAnalyzer {
    pub fn new(scoring: ScoringConfig) -> Self {
        Self { scoring }
    }

    pub fn analyze(
        &self,
        result: &ExecutionResult,
    ) -> (Option<ErrorAnalysis>, PerformanceProfile) {
        let error_analysis = if result.status == ExecutionStatus::Completed {
            None
        } else {
            Some(self.classify_error(result))
        };
        (error_analysis, self.profile(result))
    }

    fn classify_error(&self, result: &ExecutionResult) -> ErrorAnalysis {
        if result.status == ExecutionStatus::Timeout {
            return ErrorAnalysis {
                error_type: "timeout".to_string(),
                likely_cause: "The code ran longer than the configured time limit".to_string(),
                suggestions: vec![
                    "Reduce the amount of work per execution".to_string(),
                    "Raise max_execution_time_s if the workload is legitimate".to_string(),
                ],
                severity: "medium".to_string(),
            };
        }

        // Ordered substring checks; first match wins.
        let checks: &[(&str, &[&str], &str, &[&str], &str)] = &[
            (
                "syntax_error",
                &["SyntaxError", "invalid syntax", "Unexpected token", "unexpected EOF"],
                "The code is not syntactically valid",
                &["Fix the syntax error reported in stderr before re-running"],
                "low",
            ),
            (
                "name_error",
                &["NameError", "is not defined", "ReferenceError"],
                "The code references a name that does not exist",
                &["Define the variable or function before use", "Check for typos"],
                "low",
            ),
            (
                "import_error",
                &[
                    "ImportError",
                    "ModuleNotFoundError",
                    "Cannot find module",
                    "MODULE_NOT_FOUND",
                ],
                "A required module is not available in the sandbox",
                &[
                    "Declare the package as a dependency so it can be installed",
                    "Use only the standard library when no dependencies are declared",
                ],
                "medium",
            ),
            (
                "permission_error",
                &["PermissionError", "Permission denied", "EACCES", "EPERM"],
                "The code attempted an operation the sandbox forbids",
                &["Stay inside the provided working directory", "Avoid privileged operations"],
                "high",
            ),
            (
                "timeout",
                &["timed out", "TimeoutError"],
                "An operation inside the code timed out",
                &["Remove blocking waits on unavailable resources"],
                "medium",
            ),
        ];

        for (error_type, needles, cause, suggestions, severity) in checks {
            if needles.iter().any(|n| result.stderr.contains(n)) {
                return ErrorAnalysis {
                    error_type: error_type.to_string(),
                    likely_cause: cause.to_string(),
                    suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
                    severity: severity.to_string(),
                };
            }
        }

        ErrorAnalysis {
            error_type: "unknown".to_string(),
            likely_cause: "The execution failed for an unrecognized reason".to_string(),
            suggestions: vec!["Inspect stdout and stderr for details".to_string()],
            severity: "medium".to_string(),
        }
    }

    fn profile(&self, result: &ExecutionResult) -> PerformanceProfile {
        let s = &self.scoring;
        let time = result.execution_time_s;
        let memory = result.memory_peak_mb;

        let time_category = if time < s.fast_threshold_s {
            "fast"
        } else if time > s.slow_threshold_s {
            "slow"
        } else {
            "normal"
        };
        let memory_category = if memory < s.light_memory_mb {
            "light"
        } else if memory > s.heavy_memory_mb {
            "heavy"
        } else {
            "normal"
        };

        let time_score = (1.0 - time / s.time_norm_s).max(0.0);
        let memory_score = (1.0 - memory / s.memory_norm_mb).max(0.0);
        let success_score = if result.status == ExecutionStatus::Completed {
            1.0
        } else {
            0.0
        };
        let efficiency_score = (time_score + memory_score + success_score) / 3.0;

        let mut bottlenecks = Vec::new();
        let mut optimizations = Vec::new();
        if time_category == "slow" {
            bottlenecks.push(format!(
                "Wall-clock time {:.1}s exceeds the {:.0}s slow threshold",
                time, s.slow_threshold_s
            ));
            optimizations.push("Profile the hot path and reduce per-iteration work".to_string());
        }
        if memory_category == "heavy" {
            bottlenecks.push(format!(
                "Peak memory {:.0}MB exceeds the {:.0}MB heavy threshold",
                memory, s.heavy_memory_mb
            ));
            optimizations.push("Stream data instead of materializing it in memory".to_string());
        }

        PerformanceProfile {
            time_category: time_category.to_string(),
            memory_category: memory_category.to_string(),
            efficiency_score,
            bottlenecks,
            optimizations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn result(status: ExecutionStatus, stderr: &str, time: f64, memory: f64) -> ExecutionResult {
        ExecutionResult {
            execution_id: "test".to_string(),
            status,
            exit_code: Some(if status == ExecutionStatus::Completed { 0 } else { 1 }),
            stdout: String::new(),
            stderr: stderr.to_string(),
            execution_time_s: time,
            memory_peak_mb: memory,
            cpu_usage_percent: 0.0,
            files_created: vec![],
            files_modified: vec![],
            started_at: Utc::now(),
            error_analysis: None,
            performance_profile: None,
        }
    }

    fn analyzer() -> ResultAnalyzer {
        ResultAnalyzer::new(ScoringConfig::default())
    }

    #[test]
    fn completed_result_has_no_error_analysis() {
        let (error, profile) =
            analyzer().analyze(&result(ExecutionStatus::Completed, "", 0.1, 10.0));
        assert!(error.is_none());
        assert_eq!(profile.time_category, "fast");
        assert_eq!(profile.memory_category, "light");
    }

    #[test]
    fn syntax_error_wins_over_later_checks() {
        // Contains both a syntax marker and a name marker; syntax is checked first.
        let stderr = "SyntaxError: invalid syntax\nNameError: x is not defined";
        let (error, _) = analyzer().analyze(&result(ExecutionStatus::Failed, stderr, 0.1, 1.0));
        assert_eq!(error.unwrap().error_type, "syntax_error");
    }

    #[test]
    fn classifies_common_failures() {
        let cases = [
            ("NameError: name 'x' is not defined", "name_error"),
            ("ModuleNotFoundError: No module named 'numpy'", "import_error"),
            ("PermissionError: [Errno 13] Permission denied", "permission_error"),
            ("something exploded", "unknown"),
        ];
        for (stderr, expected) in cases {
            let (error, _) = analyzer().analyze(&result(ExecutionStatus::Failed, stderr, 0.1, 1.0));
            assert_eq!(error.unwrap().error_type, expected, "stderr: {}", stderr);
        }
    }

    #[test]
    fn timeout_status_classifies_as_timeout_regardless_of_stderr() {
        let (error, _) = analyzer().analyze(&result(ExecutionStatus::Timeout, "", 30.0, 1.0));
        assert_eq!(error.unwrap().error_type, "timeout");
    }

    #[test]
    fn efficiency_score_arithmetic() {
        // 15s of 30s norm -> 0.5; 128MB of 256MB norm -> 0.5; completed -> 1.0.
        let (_, profile) =
            analyzer().analyze(&result(ExecutionStatus::Completed, "", 15.0, 128.0));
        assert!((profile.efficiency_score - (0.5 + 0.5 + 1.0) / 3.0).abs() < 1e-9);
    }

    #[test]
    fn score_floors_at_zero_for_runaway_usage() {
        let (_, profile) = analyzer().analyze(&result(ExecutionStatus::Failed, "", 120.0, 1024.0));
        assert!((profile.efficiency_score - 0.0).abs() < 1e-9);
        assert_eq!(profile.time_category, "slow");
        assert_eq!(profile.memory_category, "heavy");
        assert_eq!(profile.bottlenecks.len(), 2);
        assert_eq!(profile.optimizations.len(), 2);
    }
}

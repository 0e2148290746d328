//! Execution Harness: benchmark candidate source against one input.
//!
//! Every call goes through the same pipeline:
//! 1. Static parse with tree-sitter. Source that does not parse is rejected as
//!    `Syntax Error: ...` without starting a process.
//! 2. Entry-point resolution (see [`entry`]). Nothing callable yields
//!    `No function found in code.`
//! 3. A fresh interpreter process runs the entry point `repetitions` times under
//!    memory/CPU limits and a wall-clock timeout, then reports the average time and
//!    whether the last result matched the expectation.
//!
//! Failures are values, not errors: every outcome is a [`BenchmarkResult`].

mod entry;
mod runner;

pub use entry::DEFAULT_ENTRY;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::python::PythonModule;
use runner::{DriverReport, DriverRequest};

/// Time recorded for a submission that did not complete. Strictly worse than any
/// real measurement because the wall-clock timeout is capped below it.
pub const DID_NOT_COMPLETE_SECS: f64 = 999.0;

/// Upper bound for the per-benchmark wall-clock timeout.
const MAX_TIMEOUT_SECS: u64 = 900;

/// Harness configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Interpreter used to run candidates
    pub python_bin: String,
    /// Invocations averaged into one timing
    pub repetitions: u32,
    /// Wall-clock limit per benchmark, including interpreter start-up
    pub timeout_secs: u64,
    /// Address-space limit for the candidate process (0 = unlimited)
    pub memory_limit_mb: u64,
    /// CPU-time limit for the candidate process (0 = unlimited)
    pub cpu_limit_secs: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            python_bin: std::env::var("ARENA_PYTHON").unwrap_or_else(|_| "python3".to_string()),
            repetitions: 100,
            timeout_secs: 10,
            memory_limit_mb: 512,
            cpu_limit_secs: 10,
        }
    }
}

impl HarnessConfig {
    /// Timeout actually applied, clamped to `1..=MAX_TIMEOUT_SECS`.
    pub fn wall_timeout_secs(&self) -> u64 {
        self.timeout_secs.clamp(1, MAX_TIMEOUT_SECS)
    }
}

/// Classified outcome of one benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkOutcome {
    Success,
    SyntaxError,
    NoFunction,
    RuntimeError,
    WrongAnswer,
}

/// `(time, success, message)` plus the outcome class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    /// Average seconds per invocation, or [`DID_NOT_COMPLETE_SECS`].
    pub elapsed_secs: f64,
    pub success: bool,
    pub message: String,
    pub outcome: BenchmarkOutcome,
}

impl BenchmarkResult {
    pub fn success(elapsed_secs: f64) -> Self {
        Self {
            elapsed_secs: clamp_elapsed(elapsed_secs),
            success: true,
            message: "Success".to_string(),
            outcome: BenchmarkOutcome::Success,
        }
    }

    pub fn syntax_error(detail: impl std::fmt::Display) -> Self {
        Self::did_not_complete(
            BenchmarkOutcome::SyntaxError,
            format!("Syntax Error: {}", detail),
        )
    }

    pub fn no_function() -> Self {
        Self::did_not_complete(
            BenchmarkOutcome::NoFunction,
            "No function found in code.".to_string(),
        )
    }

    pub fn runtime_error(detail: impl std::fmt::Display) -> Self {
        Self::did_not_complete(
            BenchmarkOutcome::RuntimeError,
            format!("Runtime Error: {}", detail),
        )
    }

    /// Ran to completion but produced the wrong value; the measured time is kept.
    pub fn wrong_answer(elapsed_secs: f64, got: &str, expected: &str) -> Self {
        Self {
            elapsed_secs: clamp_elapsed(elapsed_secs),
            success: false,
            message: format!("Wrong Answer. Got {}, expected {}", got, expected),
            outcome: BenchmarkOutcome::WrongAnswer,
        }
    }

    fn did_not_complete(outcome: BenchmarkOutcome, message: String) -> Self {
        Self {
            elapsed_secs: DID_NOT_COMPLETE_SECS,
            success: false,
            message,
            outcome,
        }
    }
}

fn clamp_elapsed(secs: f64) -> f64 {
    if secs.is_finite() && secs >= 0.0 {
        secs.min(DID_NOT_COMPLETE_SECS)
    } else {
        DID_NOT_COMPLETE_SECS
    }
}

/// Anything that can benchmark candidate source.
#[async_trait]
pub trait Benchmarker: Send + Sync {
    async fn benchmark(&self, source: &str, input: &Value, expected: Option<&Value>)
        -> BenchmarkResult;
}

/// Benchmarks candidates in a fresh interpreter process per call.
#[derive(Debug, Clone, Default)]
pub struct ExecutionHarness {
    config: HarnessConfig,
}

impl ExecutionHarness {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Benchmark with an explicitly requested entry symbol. Falls back to normal
    /// resolution when `entry` is `None` or not defined by the source.
    pub async fn benchmark_entry(
        &self,
        source: &str,
        entry: Option<&str>,
        input: &Value,
        expected: Option<&Value>,
    ) -> BenchmarkResult {
        let entry_name = {
            let module = match PythonModule::parse(source) {
                Ok(module) => module,
                Err(e) => {
                    error!(error = %e, "python parser unavailable");
                    return BenchmarkResult::runtime_error(format!("harness unavailable: {}", e));
                }
            };
            if let Some(location) = module.syntax_error() {
                debug!(%location, "rejected before execution");
                return BenchmarkResult::syntax_error(location);
            }
            match entry::resolve(&module, entry) {
                Some(name) => name,
                None => return BenchmarkResult::no_function(),
            }
        };

        let request = DriverRequest {
            source,
            entry: &entry_name,
            input,
            expected,
            has_expected: expected.is_some(),
            repetitions: self.config.repetitions.max(1),
            memory_limit_mb: self.config.memory_limit_mb,
            cpu_limit_secs: self.config.cpu_limit_secs,
            marker: String::new(),
        };

        match runner::run_driver(&self.config, request).await {
            Ok(DriverReport::Success { elapsed }) => BenchmarkResult::success(elapsed),
            Ok(DriverReport::WrongAnswer {
                elapsed,
                got,
                expected,
            }) => BenchmarkResult::wrong_answer(elapsed, &got, &expected),
            Ok(DriverReport::SyntaxError { detail }) => BenchmarkResult::syntax_error(detail),
            Ok(DriverReport::NoFunction) => BenchmarkResult::no_function(),
            Ok(DriverReport::RuntimeError { detail }) => BenchmarkResult::runtime_error(detail),
            Err(e) => {
                warn!(entry = %entry_name, error = %e, "benchmark did not complete");
                BenchmarkResult::runtime_error(e)
            }
        }
    }
}

#[async_trait]
impl Benchmarker for ExecutionHarness {
    async fn benchmark(
        &self,
        source: &str,
        input: &Value,
        expected: Option<&Value>,
    ) -> BenchmarkResult {
        self.benchmark_entry(source, None, input, expected).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = HarnessConfig {
            python_bin: "python3".into(),
            ..HarnessConfig::default()
        };
        assert_eq!(config.repetitions, 100);
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.wall_timeout_secs(), 10);
    }

    #[test]
    fn test_wall_timeout_stays_below_sentinel() {
        let config = HarnessConfig {
            timeout_secs: 5_000,
            ..HarnessConfig::default()
        };
        assert!((config.wall_timeout_secs() as f64) < DID_NOT_COMPLETE_SECS);
        let zero = HarnessConfig {
            timeout_secs: 0,
            ..HarnessConfig::default()
        };
        assert_eq!(zero.wall_timeout_secs(), 1);
    }

    #[test]
    fn test_failure_messages() {
        let r = BenchmarkResult::wrong_answer(0.001, "6", "10");
        assert!(!r.success);
        assert_eq!(r.message, "Wrong Answer. Got 6, expected 10");
        assert_eq!(r.elapsed_secs, 0.001);

        let r = BenchmarkResult::no_function();
        assert_eq!(r.message, "No function found in code.");
        assert_eq!(r.elapsed_secs, DID_NOT_COMPLETE_SECS);

        let r = BenchmarkResult::runtime_error("division by zero");
        assert_eq!(r.message, "Runtime Error: division by zero");
        assert_eq!(r.outcome, BenchmarkOutcome::RuntimeError);
    }

    #[test]
    fn test_non_finite_time_becomes_sentinel() {
        assert_eq!(
            BenchmarkResult::success(f64::INFINITY).elapsed_secs,
            DID_NOT_COMPLETE_SECS
        );
        assert_eq!(
            BenchmarkResult::success(-1.0).elapsed_secs,
            DID_NOT_COMPLETE_SECS
        );
    }

    #[tokio::test]
    async fn test_syntax_error_needs_no_interpreter() {
        let harness = ExecutionHarness::new(HarnessConfig {
            python_bin: "/nonexistent/python".into(),
            ..HarnessConfig::default()
        });
        let result = harness
            .benchmark("def solution(n)  # Missing colon\n    return n\n", &json!(5), Some(&json!(5)))
            .await;
        assert!(!result.success);
        assert!(result.message.contains("Syntax Error"));
        assert_eq!(result.elapsed_secs, DID_NOT_COMPLETE_SECS);
    }

    #[tokio::test]
    async fn test_no_function_needs_no_interpreter() {
        let harness = ExecutionHarness::new(HarnessConfig {
            python_bin: "/nonexistent/python".into(),
            ..HarnessConfig::default()
        });
        let result = harness.benchmark("x = 5\n", &json!(5), None).await;
        assert_eq!(result.message, "No function found in code.");
        assert_eq!(result.outcome, BenchmarkOutcome::NoFunction);
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_runtime_error() {
        let harness = ExecutionHarness::new(HarnessConfig {
            python_bin: "/nonexistent/python".into(),
            ..HarnessConfig::default()
        });
        let result = harness
            .benchmark("def solution(n):\n    return n\n", &json!(5), None)
            .await;
        assert!(!result.success);
        assert!(result.message.starts_with("Runtime Error:"));
        assert_eq!(result.elapsed_secs, DID_NOT_COMPLETE_SECS);
        // Valid source gets past the static checks and fails only at launch.
        assert!(result.message.contains("could not launch"), "{}", result.message);
    }
}

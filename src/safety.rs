//! Safety guardrails for the orchestration loop
//!
//! Compares four counters (iterations, elapsed time, cumulative cost,
//! consecutive failures) against static thresholds. The guard never acts on
//! its own; the loop stops when a check fails.

use std::time::Duration;

/// Result of a safety check
#[derive(Debug, Clone, PartialEq)]
pub struct SafetyVerdict {
    pub passed: bool,
    pub reason: Option<String>,
}

impl SafetyVerdict {
    fn pass() -> Self {
        Self {
            passed: true,
            reason: None,
        }
    }

    fn stop(reason: String) -> Self {
        Self {
            passed: false,
            reason: Some(reason),
        }
    }
}

/// Iterations past which the guard starts warning
const WARN_ITERATIONS: u32 = 50;

/// Iterations past which slow average latency becomes a stop condition
const LATENCY_CHECK_ITERATIONS: u32 = 75;

/// Mean seconds per iteration considered pathological late in a run
const MAX_MEAN_ITERATION_SECS: f64 = 300.0;

/// Safety guard over loop budgets
#[derive(Debug, Clone)]
pub struct SafetyGuard {
    max_iterations: u32,
    max_runtime: Duration,
    max_cost: f64,
    failure_limit: u32,
    consecutive_failures: u32,
}

impl SafetyGuard {
    pub fn new(max_iterations: u32, max_runtime: Duration, max_cost: f64) -> Self {
        Self {
            max_iterations,
            max_runtime,
            max_cost,
            failure_limit: 5,
            consecutive_failures: 0,
        }
    }

    pub fn with_failure_limit(mut self, limit: u32) -> Self {
        self.failure_limit = limit;
        self
    }

    /// Check all stop conditions
    pub fn check(&self, iterations: u32, elapsed: Duration, total_cost: f64) -> SafetyVerdict {
        if iterations >= self.max_iterations {
            return SafetyVerdict::stop(format!(
                "Reached maximum iterations ({})",
                self.max_iterations
            ));
        }

        if elapsed >= self.max_runtime {
            let hours = elapsed.as_secs_f64() / 3600.0;
            return SafetyVerdict::stop(format!("Reached maximum runtime ({:.1} hours)", hours));
        }

        if total_cost >= self.max_cost {
            return SafetyVerdict::stop(format!("Reached maximum cost (${:.2})", total_cost));
        }

        if self.consecutive_failures >= self.failure_limit {
            return SafetyVerdict::stop(format!(
                "Too many consecutive failures ({})",
                self.consecutive_failures
            ));
        }

        // Late in a run, a very slow mean latency means the agent is stuck
        if iterations > LATENCY_CHECK_ITERATIONS {
            let mean_secs = elapsed.as_secs_f64() / iterations as f64;
            if mean_secs > MAX_MEAN_ITERATION_SECS {
                return SafetyVerdict::stop("Iterations taking too long on average".to_string());
            }
        }

        SafetyVerdict::pass()
    }

    /// High iteration count worth a warning but not a stop
    pub fn should_warn(&self, iterations: u32) -> bool {
        iterations > WARN_ITERATIONS
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }
}

//! Core orchestration loop
//!
//! A bounded retry loop with guard conditions: check safety budgets, check
//! the completion sentinel, run the active adapter (falling back to any
//! other available one), checkpoint at intervals, sleep, repeat.

use crate::adapters::{
    detect_agent, initialize_adapters, ExecutionRequest, ToolAdapter, DETECTION_ORDER,
};
use crate::checkpoint::{CheckpointManager, CheckpointOutcome};
use crate::config::OrchestratorConfig;
use crate::context::{estimate_tokens, ContextManager};
use crate::errors::{LoopError, Result};
use crate::metrics::{CostTracker, Metrics, StateSnapshot};
use crate::safety::SafetyGuard;
use crate::telemetry::{LoopEvent, TelemetryCollector};
use colored::Colorize;
use indicatif::ProgressBar;
use rand::Rng;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Completion sentinel the agent writes into the prompt file
pub const COMPLETION_MARKER: &str = "TASK_COMPLETE";

/// Errors accumulated before volatile state is reset
const ERROR_RESET_THRESHOLD: u32 = 5;

/// Consecutive failures before a checkpoint rollback is attempted
const ROLLBACK_FAILURE_THRESHOLD: u32 = 3;

/// Detect the completion sentinel. Only standalone marker forms count;
/// the marker embedded in prose (instructions about it) must not.
pub fn completion_marker_present(content: &str) -> bool {
    for line in content.lines() {
        if line.contains("<!-- TASK_COMPLETE -->") {
            return true;
        }
        let trimmed = line.trim();
        if trimmed == "TASK_COMPLETE" || trimmed == "**TASK_COMPLETE**" {
            return true;
        }
        if trimmed == "- [x] TASK_COMPLETE" || trimmed == "[x] TASK_COMPLETE" {
            return true;
        }
    }
    false
}

/// Why the loop stopped
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// Sentinel found in the prompt file
    Completed,
    /// A safety counter crossed its threshold
    SafetyStop(String),
    /// Token or cost budget exhausted
    BudgetExhausted(String),
    /// SIGINT/SIGTERM received
    Shutdown,
    /// Dry-run mode never executes
    DryRun,
}

/// Final result of a loop run
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    pub reason: StopReason,
    pub iterations: u32,
}

impl LoopOutcome {
    pub fn exit_code(&self) -> i32 {
        match self.reason {
            StopReason::Completed | StopReason::DryRun => 0,
            _ => 1,
        }
    }
}

/// Main orchestrator for the agent loop
pub struct Orchestrator {
    config: OrchestratorConfig,
    adapters: HashMap<String, Arc<dyn ToolAdapter>>,
    active: String,
    safety: SafetyGuard,
    metrics: Metrics,
    costs: CostTracker,
    context: ContextManager,
    checkpoints: CheckpointManager,
    telemetry: TelemetryCollector,
    shutdown: Arc<AtomicBool>,
    started: Instant,
}

impl Orchestrator {
    /// Probe the configured adapters and build the loop
    pub async fn new(config: OrchestratorConfig) -> Result<Self> {
        let adapters = initialize_adapters(&config).await;
        Self::with_adapters(config, adapters)
    }

    /// Build the loop over an explicit adapter set
    pub fn with_adapters(
        config: OrchestratorConfig,
        adapters: HashMap<String, Arc<dyn ToolAdapter>>,
    ) -> Result<Self> {
        config.ensure_dirs()?;

        let active = if config.agent == "auto" {
            detect_agent(&adapters).ok_or(LoopError::NoAgentDetected)?
        } else if adapters.contains_key(&config.agent) {
            config.agent.clone()
        } else {
            return Err(LoopError::AdapterUnavailable(config.agent.clone()));
        };

        let safety = SafetyGuard::new(
            config.max_iterations,
            Duration::from_secs(config.max_runtime_secs),
            config.max_cost,
        );

        let context = ContextManager::new(
            config.prompt_file.clone(),
            config.context_window,
            config.context_threshold,
            config.cache_dir(),
            config.archive_dir(),
        )?;

        let checkpoints = CheckpointManager::new(
            config.git_checkpoint,
            config.archive_prompts,
            config.archive_dir(),
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        );

        Ok(Self {
            config,
            adapters,
            active,
            safety,
            metrics: Metrics::new(),
            costs: CostTracker::new(),
            context,
            checkpoints,
            telemetry: TelemetryCollector::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
            started: Instant::now(),
        })
    }

    /// Flag flipped by the signal handler to request a graceful stop
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn active_agent(&self) -> &str {
        &self.active
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn costs(&self) -> &CostTracker {
        &self.costs
    }

    pub fn telemetry(&self) -> &TelemetryCollector {
        &self.telemetry
    }

    /// Check the prompt file for the completion sentinel
    pub fn is_complete(&self) -> bool {
        match fs::read_to_string(&self.config.prompt_file) {
            Ok(content) => completion_marker_present(&content),
            Err(_) => false,
        }
    }

    fn log_info(&self, msg: &str) {
        if !self.config.quiet {
            println!("{} {}", "•".blue(), msg);
        }
    }

    fn log_warn(&self, msg: &str) {
        if !self.config.quiet {
            println!("{} {}", "!".yellow(), msg);
        }
    }

    fn log_verbose(&self, msg: &str) {
        if self.config.verbosity().show_events() {
            println!("{} {}", "·".dimmed(), msg);
        }
    }

    /// Run the main orchestration loop to completion or stop
    pub async fn run(&mut self) -> Result<LoopOutcome> {
        self.log_info(&format!(
            "Starting loop with {} agent on {}",
            self.active.bold(),
            self.config.prompt_file.display()
        ));
        self.log_verbose(&format!(
            "Budgets: {} iterations, {}s runtime, {} tokens, ${:.2}",
            self.config.max_iterations,
            self.config.max_runtime_secs,
            self.config.max_tokens,
            self.config.max_cost
        ));

        let reason = loop {
            if self.shutdown.load(Ordering::SeqCst) {
                self.log_warn("Shutdown requested, stopping loop");
                break StopReason::Shutdown;
            }

            let verdict = self.safety.check(
                self.metrics.iterations,
                self.started.elapsed(),
                self.costs.total_cost,
            );
            if !verdict.passed {
                let why = verdict.reason.unwrap_or_default();
                self.telemetry.record(LoopEvent::SafetyStop {
                    reason: why.clone(),
                    timestamp: Instant::now(),
                });
                self.log_warn(&format!("Safety limit reached: {}", why));
                break StopReason::SafetyStop(why);
            }

            if !self
                .costs
                .within_limits(self.config.max_tokens, self.config.max_cost)
            {
                let why = format!(
                    "Token/cost budget exhausted: {} tokens, ${:.2}",
                    self.costs.total_tokens(),
                    self.costs.total_cost
                );
                self.log_warn(&why);
                break StopReason::BudgetExhausted(why);
            }

            if self.is_complete() {
                self.log_info("Task marked as complete");
                break StopReason::Completed;
            }

            if self.config.dry_run {
                self.log_info(&format!(
                    "[DRY RUN] would run '{}' against {}",
                    self.active,
                    self.config.prompt_file.display()
                ));
                break StopReason::DryRun;
            }

            self.metrics.iterations += 1;
            let iteration = self.metrics.iterations;

            if self.safety.should_warn(iteration) {
                self.log_warn(&format!("High iteration count: {}", iteration));
            }

            self.telemetry.record(LoopEvent::IterationStarted {
                iteration,
                agent: self.active.clone(),
                timestamp: Instant::now(),
            });
            self.log_verbose(&format!("Starting iteration {}", iteration));

            let iter_start = Instant::now();
            // The prompt file is shared mutable state the agent edits;
            // read errors mid-run count as a failed iteration, not a crash
            let success = match self.run_iteration().await {
                Ok(success) => success,
                Err(e) => {
                    self.log_warn(&format!("Iteration {} error: {}", iteration, e));
                    self.context.add_error_feedback(&e.to_string());
                    self.record_error();
                    false
                }
            };
            self.telemetry.record(LoopEvent::IterationCompleted {
                iteration,
                success,
                duration_ms: iter_start.elapsed().as_millis() as u64,
                timestamp: Instant::now(),
            });

            if success {
                self.metrics.successful_iterations += 1;
                self.safety.record_success();
            } else {
                self.metrics.failed_iterations += 1;
                self.safety.record_failure();
                self.handle_failure().await;
            }

            if iteration % self.config.checkpoint_interval == 0 {
                self.checkpoint(iteration).await;
            }

            if iteration % self.config.metrics_interval == 0 {
                match self.save_state() {
                    Ok(path) => self.log_verbose(&format!("State saved to {}", path.display())),
                    Err(e) => self.log_warn(&format!("Failed to save state: {}", e)),
                }
            }

            tokio::time::sleep(Duration::from_secs(self.config.retry_delay_secs)).await;
        };

        if let Err(e) = self.save_state() {
            self.log_warn(&format!("Failed to save final state: {}", e));
        }
        self.print_summary(&reason);
        if self.config.verbosity().show_events() {
            self.telemetry.display_summary();
        }

        Ok(LoopOutcome {
            reason,
            iterations: self.metrics.iterations,
        })
    }

    /// Execute one iteration: context, adapter (with fallback), accounting
    async fn run_iteration(&mut self) -> Result<bool> {
        // Context overflow substitutes a summarization prompt for this pass
        let prompt = match self.context.maybe_summarize(self.config.max_prompt_size)? {
            Some(path) => {
                self.telemetry.record(LoopEvent::ContextSummarized {
                    before_tokens: estimate_tokens(
                        &self.context.read_prompt(self.config.max_prompt_size)?,
                    ),
                    timestamp: Instant::now(),
                });
                self.log_info(&format!(
                    "Context approaching limit, using summary prompt {}",
                    path.display()
                ));
                fs::read_to_string(&path)?
            }
            None => self.context.get_prompt(self.config.max_prompt_size)?,
        };

        let adapter = self
            .adapters
            .get(&self.active)
            .cloned()
            .ok_or_else(|| LoopError::AdapterUnavailable(self.active.clone()))?;

        let verbosity = self.config.verbosity();
        let spinner = if verbosity.show_progress() && !verbosity.show_events() {
            let pb = ProgressBar::new_spinner();
            pb.set_message(format!(
                "iteration {}: {}",
                self.metrics.iterations, self.active
            ));
            pb.enable_steady_tick(Duration::from_millis(120));
            Some(pb)
        } else {
            None
        };

        let request = self.build_request(&self.active, prompt);
        let mut used_agent = self.active.clone();

        // The active adapter gets its configured attempt budget first
        let attempts = self
            .config
            .adapter_settings(&self.active)
            .max_retries
            .max(1);
        let mut response = adapter.execute(&request).await;
        for attempt in 2..=attempts {
            if response.success {
                break;
            }
            self.log_verbose(&format!(
                "{} failed, retrying (attempt {}/{})",
                self.active, attempt, attempts
            ));
            response = adapter.execute(&request).await;
        }

        // Then one fallback sweep over the other adapters, in detection order
        if !response.success && self.adapters.len() > 1 {
            let others: Vec<String> = DETECTION_ORDER
                .iter()
                .filter(|name| **name != self.active && self.adapters.contains_key(**name))
                .map(|name| name.to_string())
                .collect();

            for name in others {
                self.telemetry.record(LoopEvent::AdapterFallback {
                    from: used_agent.clone(),
                    to: name.clone(),
                    timestamp: Instant::now(),
                });
                self.log_warn(&format!("Falling back to {}", name));

                let fallback = self.adapters[&name].clone();
                let req = self.build_request(&name, request.prompt.clone());
                response = fallback.execute(&req).await;
                used_agent = name;
                if response.success {
                    break;
                }
            }
        }

        if let Some(pb) = spinner {
            pb.finish_and_clear();
        }

        // Tool-reported token counts win over character estimates
        let input_tokens = estimate_tokens(&request.prompt) as u64;
        let output_tokens = response.tokens_used.unwrap_or_else(|| {
            let err_len = response
                .error
                .as_deref()
                .map(estimate_tokens)
                .unwrap_or(0);
            estimate_tokens(&response.output) as u64 + err_len as u64
        });
        let cost = self.costs.add_usage(&used_agent, input_tokens, output_tokens);
        self.log_verbose(&format!(
            "Usage: {} in / {} out tokens, ${:.4} (total ${:.4})",
            input_tokens, output_tokens, cost, self.costs.total_cost
        ));

        if verbosity.show_output() && !response.output.is_empty() {
            println!("{}", response.output.dimmed());
        }

        if response.success {
            if response.output.len() > 1000 {
                self.context.update_context(&response.output);
            }
        } else {
            if let Some(err) = &response.error {
                self.log_warn(&format!("Agent failed: {}", err.trim()));
                self.context.add_error_feedback(err);
            }
            self.record_error();
        }

        Ok(response.success)
    }

    /// Count a hard error; past the threshold, archive the prompt and
    /// drop volatile state
    fn record_error(&mut self) {
        self.metrics.errors += 1;
        if self.metrics.errors > ERROR_RESET_THRESHOLD {
            self.log_warn("Too many errors, archiving prompt and resetting context");
            if let Err(e) = self
                .checkpoints
                .archive_prompt(&self.config.prompt_file, self.metrics.iterations)
            {
                self.log_warn(&format!("Failed to archive prompt: {}", e));
            }
            self.reset_volatile_state();
        }
    }

    fn build_request(&self, agent: &str, prompt: String) -> ExecutionRequest {
        let settings = self.config.adapter_settings(agent);
        let mut extra_args = settings.args.clone();
        extra_args.extend(self.config.agent_args.iter().cloned());

        ExecutionRequest::new(prompt, self.config.prompt_file.clone())
            .with_timeout(Duration::from_secs(settings.timeout_secs))
            .with_extra_args(extra_args)
    }

    /// Exponential backoff, then rollback once failures pile up
    async fn handle_failure(&mut self) {
        let failures = self.safety.consecutive_failures();
        let backoff = (self.config.retry_delay_secs * 2u64.saturating_pow(failures.min(6))).min(60);

        if backoff > 0 {
            let jitter = rand::thread_rng().gen_range(0..500);
            self.log_warn(&format!("Iteration failed, backing off {}s", backoff));
            tokio::time::sleep(Duration::from_secs(backoff) + Duration::from_millis(jitter)).await;
        }

        if failures > ROLLBACK_FAILURE_THRESHOLD {
            match self.checkpoints.rollback().await {
                Ok(()) => {
                    self.metrics.rollbacks += 1;
                    self.telemetry.record(LoopEvent::RollbackPerformed {
                        timestamp: Instant::now(),
                    });
                    self.log_warn("Rolled back to previous checkpoint");
                }
                Err(e) => self.log_warn(&format!("Rollback failed: {}", e)),
            }
        }
    }

    async fn checkpoint(&mut self, iteration: u32) {
        match self.checkpoints.create(iteration).await {
            CheckpointOutcome::Committed => {
                self.metrics.checkpoints += 1;
                self.telemetry.record(LoopEvent::CheckpointCreated {
                    iteration,
                    timestamp: Instant::now(),
                });
                self.log_info(&format!("Created checkpoint at iteration {}", iteration));
            }
            CheckpointOutcome::Skipped(why) => {
                self.log_verbose(&format!("Checkpoint skipped: {}", why));
            }
            CheckpointOutcome::Disabled => {}
        }

        match self
            .checkpoints
            .archive_prompt(&self.config.prompt_file, iteration)
        {
            Ok(Some(path)) => self.log_verbose(&format!("Archived prompt to {}", path.display())),
            Ok(None) => {}
            Err(e) => self.log_warn(&format!("Failed to archive prompt: {}", e)),
        }
    }

    /// Drop context rings and failure counters. Iteration counters are kept
    /// so the max_iterations bound stays monotonic.
    fn reset_volatile_state(&mut self) {
        self.context.reset();
        self.safety.reset();
        self.metrics.errors = 0;
    }

    /// Write a JSON state snapshot under the metrics directory
    pub fn save_state(&self) -> Result<PathBuf> {
        StateSnapshot::new(&self.metrics, &self.costs, &self.config)
            .write_to(&self.config.metrics_dir())
    }

    fn print_summary(&self, reason: &StopReason) {
        println!();
        println!("{}", "Orchestration Summary".bold());
        println!("─────────────────────────────────────");
        println!("Stop reason:     {:?}", reason);
        println!("Iterations:      {}", self.metrics.iterations);
        println!("Successful:      {}", self.metrics.successful_iterations);
        println!("Failed:          {}", self.metrics.failed_iterations);
        println!("Errors:          {}", self.metrics.errors);
        println!("Checkpoints:     {}", self.metrics.checkpoints);
        println!("Rollbacks:       {}", self.metrics.rollbacks);
        println!(
            "Tokens:          {} in / {} out",
            self.costs.input_tokens, self.costs.output_tokens
        );
        println!("Total cost:      ${:.4}", self.costs.total_cost);

        let by_tool: Vec<(String, f64)> = self
            .adapters
            .keys()
            .map(|name| (name.clone(), self.costs.cost_for(name)))
            .filter(|(_, cost)| *cost > 0.0)
            .collect();
        if !by_tool.is_empty() {
            println!("Cost breakdown:");
            for (tool, cost) in by_tool {
                println!("  {}: ${:.4}", tool, cost);
            }
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_html_comment() {
        assert!(completion_marker_present("work done\n<!-- TASK_COMPLETE -->\n"));
    }

    #[test]
    fn test_marker_standalone() {
        assert!(completion_marker_present("# Task\n\nTASK_COMPLETE\n"));
        assert!(completion_marker_present("  TASK_COMPLETE  \n"));
        assert!(completion_marker_present("**TASK_COMPLETE**\n"));
    }

    #[test]
    fn test_marker_checkbox() {
        assert!(completion_marker_present("- [x] TASK_COMPLETE\n"));
        assert!(completion_marker_present("[x] TASK_COMPLETE\n"));
        assert!(!completion_marker_present("- [ ] TASK_COMPLETE\n"));
    }

    #[test]
    fn test_marker_in_prose_does_not_complete() {
        let content = "When you are finished, add 'TASK_COMPLETE' to this file.\n";
        assert!(!completion_marker_present(content));

        let content = "The marker TASK_COMPLETE must appear on its own line.\n";
        assert!(!completion_marker_present(content));
    }

    #[test]
    fn test_marker_absent() {
        assert!(!completion_marker_present(""));
        assert!(!completion_marker_present("# Task\nstill working\n"));
    }

    #[test]
    fn test_exit_codes() {
        let done = LoopOutcome {
            reason: StopReason::Completed,
            iterations: 3,
        };
        assert_eq!(done.exit_code(), 0);

        let dry = LoopOutcome {
            reason: StopReason::DryRun,
            iterations: 0,
        };
        assert_eq!(dry.exit_code(), 0);

        let stopped = LoopOutcome {
            reason: StopReason::SafetyStop("Reached maximum iterations (100)".into()),
            iterations: 100,
        };
        assert_eq!(stopped.exit_code(), 1);

        let shutdown = LoopOutcome {
            reason: StopReason::Shutdown,
            iterations: 5,
        };
        assert_eq!(shutdown.exit_code(), 1);
    }
}

//! Metrics counters, cost tracking, and state snapshots
//!
//! Token counts are character-count estimates multiplied by a static price
//! table. Nothing here is exact; the point is a budget, not a bill.

use crate::config::OrchestratorConfig;
use crate::errors::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Price per 1M tokens (input, output), keyed by adapter name.
/// Q runs locally and is free; unknown tools fall back to the free tier.
fn price_per_million(agent: &str) -> (f64, f64) {
    match agent {
        "claude" => (3.0, 15.0),
        "gemini" => (0.25, 1.0),
        "qchat" | "q" => (0.0, 0.0),
        _ => (0.0, 0.0),
    }
}

/// Orchestration counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    pub iterations: u32,
    pub successful_iterations: u32,
    pub failed_iterations: u32,
    pub errors: u32,
    pub checkpoints: u32,
    pub rollbacks: u32,
    pub started_at: DateTime<Utc>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            iterations: 0,
            successful_iterations: 0,
            failed_iterations: 0,
            errors: 0,
            checkpoints: 0,
            rollbacks: 0,
            started_at: Utc::now(),
        }
    }

    pub fn elapsed_hours(&self) -> f64 {
        let elapsed = Utc::now().signed_duration_since(self.started_at);
        elapsed.num_milliseconds() as f64 / 3_600_000.0
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.successful_iterations + self.failed_iterations;
        if total == 0 {
            return 0.0;
        }
        self.successful_iterations as f64 / total as f64
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// One adapter invocation's worth of usage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    pub cumulative_cost: f64,
}

/// Accumulates token estimates and multiplies by the price table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostTracker {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_cost: f64,
    pub history: Vec<UsageRecord>,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record usage for one iteration and return its cost
    pub fn add_usage(&mut self, agent: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        let (input_price, output_price) = price_per_million(agent);
        let cost = input_tokens as f64 * input_price / 1_000_000.0
            + output_tokens as f64 * output_price / 1_000_000.0;

        self.input_tokens += input_tokens;
        self.output_tokens += output_tokens;
        self.total_cost += cost;

        self.history.push(UsageRecord {
            timestamp: Utc::now(),
            agent: agent.to_string(),
            input_tokens,
            output_tokens,
            cost,
            cumulative_cost: self.total_cost,
        });

        cost
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// True while both token and cost budgets have headroom
    pub fn within_limits(&self, max_tokens: u64, max_cost: f64) -> bool {
        self.total_tokens() < max_tokens && self.total_cost < max_cost
    }

    /// Total cost attributed to one agent
    pub fn cost_for(&self, agent: &str) -> f64 {
        self.history
            .iter()
            .filter(|r| r.agent == agent)
            .map(|r| r.cost)
            .sum()
    }
}

/// Periodic JSON snapshot of loop state
#[derive(Debug, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub saved_at: DateTime<Utc>,
    pub metrics: Metrics,
    pub costs: CostTracker,
    pub config: OrchestratorConfig,
}

impl StateSnapshot {
    pub fn new(metrics: &Metrics, costs: &CostTracker, config: &OrchestratorConfig) -> Self {
        Self {
            saved_at: Utc::now(),
            metrics: metrics.clone(),
            costs: costs.clone(),
            config: config.clone(),
        }
    }

    /// Write the snapshot as `state_<timestamp>.json` under `dir`
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let name = format!("state_{}.json", self.saved_at.format("%Y%m%d_%H%M%S"));
        let path = dir.join(name);
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initial_state() {
        let m = Metrics::new();
        assert_eq!(m.iterations, 0);
        assert_eq!(m.success_rate(), 0.0);
        assert!(m.elapsed_hours() < 0.01);
    }

    #[test]
    fn test_success_rate() {
        let mut m = Metrics::new();
        m.successful_iterations = 3;
        m.failed_iterations = 1;
        assert!((m.success_rate() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_claude_pricing() {
        let mut tracker = CostTracker::new();
        // 1M input + 1M output at claude rates = 3.0 + 15.0
        let cost = tracker.add_usage("claude", 1_000_000, 1_000_000);
        assert!((cost - 18.0).abs() < 1e-9);
        assert!((tracker.total_cost - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_agent_is_free() {
        let mut tracker = CostTracker::new();
        let cost = tracker.add_usage("mystery-tool", 500_000, 500_000);
        assert_eq!(cost, 0.0);
        assert_eq!(tracker.total_tokens(), 1_000_000);
    }

    #[test]
    fn test_within_limits() {
        let mut tracker = CostTracker::new();
        tracker.add_usage("gemini", 100, 100);
        assert!(tracker.within_limits(1_000_000, 50.0));
        assert!(!tracker.within_limits(100, 50.0));
    }

    #[test]
    fn test_cost_limit_breach() {
        let mut tracker = CostTracker::new();
        tracker.add_usage("claude", 10_000_000, 0); // $30
        assert!(!tracker.within_limits(u64::MAX, 10.0));
    }

    #[test]
    fn test_history_cumulative_cost() {
        let mut tracker = CostTracker::new();
        tracker.add_usage("claude", 1_000_000, 0); // $3
        tracker.add_usage("claude", 1_000_000, 0); // $3
        assert_eq!(tracker.history.len(), 2);
        assert!((tracker.history[1].cumulative_cost - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_cost_per_agent() {
        let mut tracker = CostTracker::new();
        tracker.add_usage("claude", 1_000_000, 0);
        tracker.add_usage("gemini", 1_000_000, 0);
        assert!((tracker.cost_for("claude") - 3.0).abs() < 1e-9);
        assert!((tracker.cost_for("gemini") - 0.25).abs() < 1e-9);
        assert_eq!(tracker.cost_for("qchat"), 0.0);
    }

    #[test]
    fn test_gemini_pricing() {
        let mut tracker = CostTracker::new();
        // 1M input + 1M output at gemini rates = 0.25 + 1.0
        let cost = tracker.add_usage("gemini", 1_000_000, 1_000_000);
        assert!((cost - 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_qchat_is_free() {
        let mut tracker = CostTracker::new();
        let cost = tracker.add_usage("qchat", 1_000_000, 1_000_000);
        assert_eq!(cost, 0.0);
        assert_eq!(tracker.total_cost, 0.0);
        // Tokens still count against the token budget
        assert_eq!(tracker.total_tokens(), 2_000_000);
    }

    #[test]
    fn test_snapshot_write() {
        let dir = tempfile::tempdir().unwrap();
        let metrics = Metrics::new();
        let mut costs = CostTracker::new();
        costs.add_usage("claude", 400, 100);
        let config = OrchestratorConfig::default();

        let snapshot = StateSnapshot::new(&metrics, &costs, &config);
        let path = snapshot.write_to(dir.path()).unwrap();

        assert!(path.exists());
        let contents = fs::read_to_string(&path).unwrap();
        let parsed: StateSnapshot = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.costs.input_tokens, 400);
        assert_eq!(parsed.config.max_iterations, config.max_iterations);
    }
}

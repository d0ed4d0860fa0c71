//! In-process event collection for the orchestration loop
//!
//! Collects typed loop events and aggregate stats for the end-of-run
//! summary. There is no external metrics sink.

use colored::Colorize;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Loop event types
#[derive(Debug, Clone)]
pub enum LoopEvent {
    IterationStarted {
        iteration: u32,
        agent: String,
        timestamp: Instant,
    },
    IterationCompleted {
        iteration: u32,
        success: bool,
        duration_ms: u64,
        timestamp: Instant,
    },
    AdapterFallback {
        from: String,
        to: String,
        timestamp: Instant,
    },
    CheckpointCreated {
        iteration: u32,
        timestamp: Instant,
    },
    RollbackPerformed {
        timestamp: Instant,
    },
    ContextSummarized {
        before_tokens: usize,
        timestamp: Instant,
    },
    SafetyStop {
        reason: String,
        timestamp: Instant,
    },
}

/// Aggregate loop statistics
#[derive(Debug, Clone, Default)]
pub struct LoopStats {
    pub iterations_started: usize,
    pub iterations_succeeded: usize,
    pub iterations_failed: usize,
    pub fallbacks: usize,
    pub checkpoints: usize,
    pub rollbacks: usize,
    pub summarizations: usize,
    pub safety_stops: usize,
}

/// Thread-safe event collector
#[derive(Clone)]
pub struct TelemetryCollector {
    events: Arc<Mutex<Vec<LoopEvent>>>,
    stats: Arc<Mutex<LoopStats>>,
    start_time: Instant,
}

impl TelemetryCollector {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            stats: Arc::new(Mutex::new(LoopStats::default())),
            start_time: Instant::now(),
        }
    }

    /// Record an event
    pub fn record(&self, event: LoopEvent) {
        {
            let mut stats = self.stats.lock().unwrap();
            match &event {
                LoopEvent::IterationStarted { .. } => stats.iterations_started += 1,
                LoopEvent::IterationCompleted { success, .. } => {
                    if *success {
                        stats.iterations_succeeded += 1;
                    } else {
                        stats.iterations_failed += 1;
                    }
                }
                LoopEvent::AdapterFallback { .. } => stats.fallbacks += 1,
                LoopEvent::CheckpointCreated { .. } => stats.checkpoints += 1,
                LoopEvent::RollbackPerformed { .. } => stats.rollbacks += 1,
                LoopEvent::ContextSummarized { .. } => stats.summarizations += 1,
                LoopEvent::SafetyStop { .. } => stats.safety_stops += 1,
            }
        }

        let mut events = self.events.lock().unwrap();
        events.push(event);
    }

    pub fn get_stats(&self) -> LoopStats {
        self.stats.lock().unwrap().clone()
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    /// Get recent events (last n)
    pub fn recent_events(&self, n: usize) -> Vec<LoopEvent> {
        let events = self.events.lock().unwrap();
        let start = events.len().saturating_sub(n);
        events[start..].to_vec()
    }

    /// Fraction of completed iterations that succeeded
    pub fn iteration_success_rate(&self) -> f64 {
        let stats = self.stats.lock().unwrap();
        let total = stats.iterations_succeeded + stats.iterations_failed;
        if total == 0 {
            1.0
        } else {
            stats.iterations_succeeded as f64 / total as f64
        }
    }

    /// Print the end-of-run event summary
    pub fn display_summary(&self) {
        let stats = self.get_stats();
        let elapsed = self.elapsed();

        println!();
        println!("{}", "Loop Summary".bold());
        println!("─────────────────────────────────────");
        println!("Duration:       {:?}", elapsed);
        println!("Iterations:     {}", stats.iterations_started);
        println!(
            "Success rate:   {:.1}%",
            self.iteration_success_rate() * 100.0
        );
        println!("Fallbacks:      {}", stats.fallbacks);
        println!("Checkpoints:    {}", stats.checkpoints);
        println!("Rollbacks:      {}", stats.rollbacks);
        println!("Summarizations: {}", stats.summarizations);
        println!();
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}

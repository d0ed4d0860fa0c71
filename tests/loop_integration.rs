//! End-to-end loop tests with scripted adapters
//!
//! These exercise the orchestrator against in-process adapter fakes, so no
//! real agent CLI is required.

use agentloop::adapters::{AdapterResponse, ExecutionRequest, ToolAdapter};
use agentloop::config::{AdapterSettings, OrchestratorConfig};
use agentloop::orchestrator::{Orchestrator, StopReason};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Adapter fake with a fixed script: succeed or fail, optionally writing
/// the completion marker into the prompt file on success.
struct ScriptedAdapter {
    name: String,
    succeed: bool,
    mark_complete: Option<PathBuf>,
    delete_prompt: Option<PathBuf>,
    tokens_used: Option<u64>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedAdapter {
    fn new(name: &str, succeed: bool) -> Self {
        Self {
            name: name.to_string(),
            succeed,
            mark_complete: None,
            delete_prompt: None,
            tokens_used: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn marking_complete(mut self, prompt_file: PathBuf) -> Self {
        self.mark_complete = Some(prompt_file);
        self
    }

    fn deleting_prompt(mut self, prompt_file: PathBuf) -> Self {
        self.delete_prompt = Some(prompt_file);
        self
    }

    fn reporting_tokens(mut self, tokens: u64) -> Self {
        self.tokens_used = Some(tokens);
        self
    }

    fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl ToolAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check_availability(&self) -> bool {
        true
    }

    async fn execute(&self, _request: &ExecutionRequest) -> AdapterResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(path) = &self.delete_prompt {
            let _ = fs::remove_file(path);
        }

        if !self.succeed {
            return AdapterResponse::failure("scripted failure".to_string());
        }

        if let Some(path) = &self.mark_complete {
            let mut content = fs::read_to_string(path).unwrap_or_default();
            content.push_str("\n<!-- TASK_COMPLETE -->\n");
            fs::write(path, content).unwrap();
        }

        let mut response = AdapterResponse::ok("did some work".to_string());
        response.tokens_used = self.tokens_used;
        response
    }
}

fn config_in(dir: &TempDir, agent: &str) -> OrchestratorConfig {
    let prompt_file = dir.path().join("PROMPT.md");
    fs::write(&prompt_file, "# Build the widget\n").unwrap();

    OrchestratorConfig {
        agent: agent.to_string(),
        prompt_file,
        state_dir: dir.path().join(".agent"),
        git_checkpoint: false,
        archive_prompts: false,
        retry_delay_secs: 0,
        quiet: true,
        ..Default::default()
    }
}

fn register(
    adapters: &mut HashMap<String, Arc<dyn ToolAdapter>>,
    adapter: ScriptedAdapter,
) -> Arc<AtomicUsize> {
    let calls = adapter.call_counter();
    adapters.insert(adapter.name.clone(), Arc::new(adapter));
    calls
}

fn single_attempt(config: &mut OrchestratorConfig, agent: &str) {
    config.adapters.insert(
        agent.to_string(),
        AdapterSettings {
            max_retries: 1,
            ..Default::default()
        },
    );
}

#[tokio::test]
async fn completes_when_agent_writes_marker() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir, "claude");

    let mut adapters = HashMap::new();
    let calls = register(
        &mut adapters,
        ScriptedAdapter::new("claude", true).marking_complete(config.prompt_file.clone()),
    );

    let mut orchestrator = Orchestrator::with_adapters(config, adapters).unwrap();
    let outcome = orchestrator.run().await.unwrap();

    assert_eq!(outcome.reason, StopReason::Completed);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn pre_completed_prompt_runs_zero_iterations() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir, "claude");
    fs::write(&config.prompt_file, "# Task\n\nTASK_COMPLETE\n").unwrap();

    let mut adapters = HashMap::new();
    let calls = register(&mut adapters, ScriptedAdapter::new("claude", true));

    let mut orchestrator = Orchestrator::with_adapters(config, adapters).unwrap();
    let outcome = orchestrator.run().await.unwrap();

    assert_eq!(outcome.reason, StopReason::Completed);
    assert_eq!(outcome.iterations, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn stops_at_max_iterations() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir, "claude");
    config.max_iterations = 3;

    let mut adapters = HashMap::new();
    let calls = register(&mut adapters, ScriptedAdapter::new("claude", true));

    let mut orchestrator = Orchestrator::with_adapters(config, adapters).unwrap();
    let outcome = orchestrator.run().await.unwrap();

    match &outcome.reason {
        StopReason::SafetyStop(why) => assert!(why.contains("maximum iterations")),
        other => panic!("expected safety stop, got {:?}", other),
    }
    assert_eq!(outcome.iterations, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(outcome.exit_code(), 1);
}

#[tokio::test]
async fn falls_back_to_second_adapter() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir, "claude");

    let mut adapters = HashMap::new();
    let claude_calls = register(&mut adapters, ScriptedAdapter::new("claude", false));
    let gemini_calls = register(
        &mut adapters,
        ScriptedAdapter::new("gemini", true).marking_complete(config.prompt_file.clone()),
    );

    let mut orchestrator = Orchestrator::with_adapters(config, adapters).unwrap();
    let outcome = orchestrator.run().await.unwrap();

    assert_eq!(outcome.reason, StopReason::Completed);
    // Default settings give the active adapter 3 attempts before fallback
    assert_eq!(claude_calls.load(Ordering::SeqCst), 3);
    assert_eq!(gemini_calls.load(Ordering::SeqCst), 1);
    assert_eq!(orchestrator.telemetry().get_stats().fallbacks, 1);
}

#[tokio::test]
async fn retries_active_adapter_per_config() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir, "claude");
    config.max_iterations = 1;
    config.adapters.insert(
        "claude".to_string(),
        AdapterSettings {
            max_retries: 2,
            ..Default::default()
        },
    );

    let mut adapters = HashMap::new();
    let calls = register(&mut adapters, ScriptedAdapter::new("claude", false));

    let mut orchestrator = Orchestrator::with_adapters(config, adapters).unwrap();
    let outcome = orchestrator.run().await.unwrap();

    // One iteration, two attempts, no other adapter to fall back to
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(outcome.iterations, 1);
}

#[tokio::test]
async fn fallback_follows_detection_order() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir, "claude");
    single_attempt(&mut config, "claude");

    let mut adapters = HashMap::new();
    register(&mut adapters, ScriptedAdapter::new("claude", false));
    let qchat_calls = register(
        &mut adapters,
        ScriptedAdapter::new("qchat", true).marking_complete(config.prompt_file.clone()),
    );
    let gemini_calls = register(&mut adapters, ScriptedAdapter::new("gemini", false));

    let mut orchestrator = Orchestrator::with_adapters(config, adapters).unwrap();
    let outcome = orchestrator.run().await.unwrap();

    // qchat precedes gemini in detection order, so gemini is never tried
    assert_eq!(outcome.reason, StopReason::Completed);
    assert_eq!(qchat_calls.load(Ordering::SeqCst), 1);
    assert_eq!(gemini_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn stops_after_consecutive_failures() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir, "claude");
    single_attempt(&mut config, "claude");

    let mut adapters = HashMap::new();
    let calls = register(&mut adapters, ScriptedAdapter::new("claude", false));

    let mut orchestrator = Orchestrator::with_adapters(config, adapters).unwrap();
    let outcome = orchestrator.run().await.unwrap();

    match &outcome.reason {
        StopReason::SafetyStop(why) => assert!(why.contains("consecutive failures")),
        other => panic!("expected safety stop, got {:?}", other),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(orchestrator.metrics().failed_iterations, 5);
}

#[tokio::test]
async fn stops_when_cost_budget_exhausted() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir, "claude");

    // 10M output tokens at claude pricing blows well past the $50 default
    let mut adapters = HashMap::new();
    register(
        &mut adapters,
        ScriptedAdapter::new("claude", true).reporting_tokens(10_000_000),
    );

    let mut orchestrator = Orchestrator::with_adapters(config, adapters).unwrap();
    let outcome = orchestrator.run().await.unwrap();

    match &outcome.reason {
        StopReason::SafetyStop(why) => assert!(why.contains("maximum cost")),
        other => panic!("expected cost stop, got {:?}", other),
    }
    assert_eq!(outcome.iterations, 1);
}

#[tokio::test]
async fn stops_when_token_budget_exhausted() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir, "claude");
    config.max_tokens = 100;

    let mut adapters = HashMap::new();
    register(
        &mut adapters,
        ScriptedAdapter::new("claude", true).reporting_tokens(500),
    );

    let mut orchestrator = Orchestrator::with_adapters(config, adapters).unwrap();
    let outcome = orchestrator.run().await.unwrap();

    match &outcome.reason {
        StopReason::BudgetExhausted(why) => assert!(why.contains("budget exhausted")),
        other => panic!("expected budget stop, got {:?}", other),
    }
    assert_eq!(outcome.iterations, 1);
}

#[tokio::test]
async fn dry_run_executes_nothing() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir, "claude");
    config.dry_run = true;

    let mut adapters = HashMap::new();
    let calls = register(&mut adapters, ScriptedAdapter::new("claude", true));

    let mut orchestrator = Orchestrator::with_adapters(config, adapters).unwrap();
    let outcome = orchestrator.run().await.unwrap();

    assert_eq!(outcome.reason, StopReason::DryRun);
    assert_eq!(outcome.iterations, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(outcome.exit_code(), 0);
}

#[tokio::test]
async fn auto_detection_prefers_claude() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir, "auto");

    let mut adapters = HashMap::new();
    register(&mut adapters, ScriptedAdapter::new("gemini", true));
    register(&mut adapters, ScriptedAdapter::new("claude", true));

    let orchestrator = Orchestrator::with_adapters(config, adapters).unwrap();
    assert_eq!(orchestrator.active_agent(), "claude");
}

#[tokio::test]
async fn missing_agent_is_an_error() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir, "claude");

    let adapters = HashMap::new();
    assert!(Orchestrator::with_adapters(config, adapters).is_err());
}

#[tokio::test]
async fn survives_prompt_file_disappearing_mid_run() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir, "claude");

    // The agent deletes the shared prompt file during its first run;
    // later iterations must fail and count, not crash the loop
    let mut adapters = HashMap::new();
    let calls = register(
        &mut adapters,
        ScriptedAdapter::new("claude", true).deleting_prompt(config.prompt_file.clone()),
    );

    let mut orchestrator = Orchestrator::with_adapters(config, adapters).unwrap();
    let outcome = orchestrator.run().await.unwrap();

    match &outcome.reason {
        StopReason::SafetyStop(why) => assert!(why.contains("consecutive failures")),
        other => panic!("expected safety stop, got {:?}", other),
    }
    // Only the first iteration reached the adapter
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(orchestrator.metrics().errors > 0);
    assert_eq!(orchestrator.metrics().successful_iterations, 1);
}

#[tokio::test]
async fn state_snapshot_written_on_stop() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir, "claude");
    config.max_iterations = 2;
    let metrics_dir = config.metrics_dir();

    let mut adapters = HashMap::new();
    register(&mut adapters, ScriptedAdapter::new("claude", true));

    let mut orchestrator = Orchestrator::with_adapters(config, adapters).unwrap();
    orchestrator.run().await.unwrap();

    let snapshots: Vec<_> = fs::read_dir(&metrics_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("state_"))
        .collect();
    assert!(!snapshots.is_empty());
}

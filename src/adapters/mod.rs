//! Adapter layer over heterogeneous AI CLI tools
//!
//! One polymorphic interface implemented per external tool by spawning a
//! subprocess, capturing stdout/stderr, and enforcing a timeout. Each tool
//! hand-parses its own output format; there is no shared protocol.

pub mod claude;
pub mod gemini;
pub mod qchat;
pub mod types;

pub use claude::ClaudeAdapter;
pub use gemini::GeminiAdapter;
pub use qchat::QChatAdapter;
pub use types::{AdapterResponse, ExecutionRequest};

use crate::config::OrchestratorConfig;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Detection order when the agent is set to `auto`
pub const DETECTION_ORDER: [&str; 3] = ["claude", "qchat", "gemini"];

/// Polymorphic interface over external agent CLIs
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    /// Registry name (also the cost-table key)
    fn name(&self) -> &str;

    /// Probe whether the underlying binary responds
    async fn check_availability(&self) -> bool;

    /// Run one iteration. Subprocess failures are reported in the response,
    /// never as an Err: a broken tool must not abort the loop.
    async fn execute(&self, request: &ExecutionRequest) -> AdapterResponse;

    /// Rough pre-flight cost estimate for a prompt, in USD
    fn estimate_cost(&self, _prompt: &str) -> f64 {
        0.0
    }
}

/// Raw outcome of a captured subprocess run
pub(crate) enum Captured {
    Completed {
        success: bool,
        stdout: String,
        stderr: String,
    },
    LaunchFailed(String),
    TimedOut(u64),
}

/// Spawn a command with argv semantics (no shell) and capture its output
pub(crate) async fn capture(mut cmd: Command, limit: Duration) -> Captured {
    match timeout(limit, cmd.output()).await {
        Ok(Ok(output)) => Captured::Completed {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        },
        Ok(Err(e)) => Captured::LaunchFailed(e.to_string()),
        Err(_) => Captured::TimedOut(limit.as_secs()),
    }
}

/// Probe a binary with `--version` under a short timeout. A missing binary
/// or an unresponsive one both read as unavailable.
pub(crate) async fn probe_version(command: &str) -> bool {
    let mut cmd = Command::new(command);
    cmd.arg("--version");

    match capture(cmd, Duration::from_secs(5)).await {
        Captured::Completed { success, .. } => success,
        _ => false,
    }
}

/// Initialize every enabled adapter whose CLI responds
pub async fn initialize_adapters(
    config: &OrchestratorConfig,
) -> HashMap<String, Arc<dyn ToolAdapter>> {
    let mut adapters: HashMap<String, Arc<dyn ToolAdapter>> = HashMap::new();

    let candidates: Vec<Arc<dyn ToolAdapter>> = vec![
        Arc::new(ClaudeAdapter::new()),
        Arc::new(QChatAdapter::new()),
        Arc::new(GeminiAdapter::new()),
    ];

    for adapter in candidates {
        let settings = config.adapter_settings(adapter.name());
        if !settings.enabled {
            continue;
        }
        if adapter.check_availability().await {
            adapters.insert(adapter.name().to_string(), adapter);
        }
    }

    adapters
}

/// Pick the first available adapter in detection order
pub fn detect_agent(adapters: &HashMap<String, Arc<dyn ToolAdapter>>) -> Option<String> {
    DETECTION_ORDER
        .iter()
        .find(|name| adapters.contains_key(**name))
        .map(|name| name.to_string())
}

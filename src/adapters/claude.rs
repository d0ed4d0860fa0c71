//! Claude CLI adapter
//!
//! Invokes `claude -p <prompt>`. The CLI occasionally reports a token count
//! on stderr; when it does, cost is derived from a blended per-token rate.

use crate::adapters::{capture, probe_version, AdapterResponse, Captured, ExecutionRequest, ToolAdapter};
use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;

/// Blended input/output price per 1K tokens, Claude 3.5 Sonnet ballpark
const BLENDED_COST_PER_1K: f64 = 0.009;

pub struct ClaudeAdapter {
    command: String,
    model: Option<String>,
}

impl ClaudeAdapter {
    pub fn new() -> Self {
        Self {
            command: "claude".to_string(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Pull a token count out of stderr, if the CLI printed one
    fn extract_token_count(stderr: &str) -> Option<u64> {
        if stderr.is_empty() {
            return None;
        }
        let re = Regex::new(r"(?i)tokens?[:\s]+(\d+)").ok()?;
        re.captures(stderr)?.get(1)?.as_str().parse().ok()
    }

    fn calculate_cost(tokens: Option<u64>) -> Option<f64> {
        tokens.map(|t| (t as f64 / 1000.0) * BLENDED_COST_PER_1K)
    }
}

impl Default for ClaudeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolAdapter for ClaudeAdapter {
    fn name(&self) -> &str {
        "claude"
    }

    async fn check_availability(&self) -> bool {
        probe_version(&self.command).await
    }

    async fn execute(&self, request: &ExecutionRequest) -> AdapterResponse {
        let mut cmd = Command::new(&self.command);
        cmd.arg("-p").arg(&request.prompt);

        if let Some(model) = &self.model {
            cmd.arg("--model").arg(model);
        }
        cmd.args(&request.extra_args);

        match capture(cmd, request.timeout).await {
            Captured::Completed {
                success: true,
                stdout,
                stderr,
            } => {
                let tokens = Self::extract_token_count(&stderr);
                AdapterResponse {
                    success: true,
                    output: stdout,
                    error: None,
                    tokens_used: tokens,
                    cost: Self::calculate_cost(tokens),
                }
            }
            Captured::Completed {
                success: false,
                stdout,
                stderr,
            } => AdapterResponse {
                success: false,
                output: stdout,
                error: Some(if stderr.is_empty() {
                    "claude command failed".to_string()
                } else {
                    stderr
                }),
                tokens_used: None,
                cost: None,
            },
            Captured::LaunchFailed(e) => {
                AdapterResponse::failure(format!("Failed to launch claude: {}", e))
            }
            Captured::TimedOut(secs) => {
                AdapterResponse::failure(format!("claude timed out after {}s", secs))
            }
        }
    }

    fn estimate_cost(&self, prompt: &str) -> f64 {
        let estimated_tokens = prompt.len() as u64 / 4;
        Self::calculate_cost(Some(estimated_tokens)).unwrap_or(0.0)
    }
}

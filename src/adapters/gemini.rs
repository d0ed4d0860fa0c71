//! Gemini CLI adapter
//!
//! Invokes `gemini -p <prompt>`. Gemini is free up to 1M tokens, then
//! priced per 1K on the excess.

use crate::adapters::{capture, probe_version, AdapterResponse, Captured, ExecutionRequest, ToolAdapter};
use async_trait::async_trait;
use tokio::process::Command;

const FREE_TIER_TOKENS: u64 = 1_000_000;
const COST_PER_1K_AFTER_FREE: f64 = 0.001;

pub struct GeminiAdapter {
    command: String,
    model: Option<String>,
}

impl GeminiAdapter {
    pub fn new() -> Self {
        Self {
            command: "gemini".to_string(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    fn calculate_cost(tokens: u64) -> f64 {
        if tokens <= FREE_TIER_TOKENS {
            return 0.0;
        }
        let excess = tokens - FREE_TIER_TOKENS;
        (excess as f64 / 1000.0) * COST_PER_1K_AFTER_FREE
    }
}

impl Default for GeminiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolAdapter for GeminiAdapter {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn check_availability(&self) -> bool {
        probe_version(&self.command).await
    }

    async fn execute(&self, request: &ExecutionRequest) -> AdapterResponse {
        let mut cmd = Command::new(&self.command);

        if let Some(model) = &self.model {
            cmd.arg("--model").arg(model);
        }
        cmd.arg("-p").arg(&request.prompt);
        cmd.args(&request.extra_args);

        match capture(cmd, request.timeout).await {
            Captured::Completed {
                success: true,
                stdout,
                ..
            } => AdapterResponse::ok(stdout),
            Captured::Completed {
                success: false,
                stdout,
                stderr,
            } => AdapterResponse {
                success: false,
                output: stdout,
                error: Some(if stderr.is_empty() {
                    "gemini command failed".to_string()
                } else {
                    stderr
                }),
                tokens_used: None,
                cost: None,
            },
            Captured::LaunchFailed(e) => {
                AdapterResponse::failure(format!("Failed to launch gemini: {}", e))
            }
            Captured::TimedOut(secs) => {
                AdapterResponse::failure(format!("gemini timed out after {}s", secs))
            }
        }
    }

    fn estimate_cost(&self, prompt: &str) -> f64 {
        Self::calculate_cost(prompt.len() as u64 / 4)
    }
}

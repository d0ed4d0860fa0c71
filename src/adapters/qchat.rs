//! Q chat CLI adapter
//!
//! Runs `q chat --no-interactive --trust-all-tools` with a wrapped prompt
//! that tells the tool to edit the prompt file and append the completion
//! sentinel. Q does not report token usage and is priced as free tier.

use crate::adapters::{capture, probe_version, AdapterResponse, Captured, ExecutionRequest, ToolAdapter};
use async_trait::async_trait;
use tokio::process::Command;

pub struct QChatAdapter {
    command: String,
}

impl QChatAdapter {
    pub fn new() -> Self {
        Self {
            command: "q".to_string(),
        }
    }

    /// Q needs explicit instructions about the file-based completion protocol
    fn effective_prompt(request: &ExecutionRequest) -> String {
        format!(
            "Please read and complete the task described in the file '{file}'. \
             The current content is:\n\n{prompt}\n\n\
             Edit the file '{file}' directly to add your solution. \
             When you have completed the task, add 'TASK_COMPLETE' on its own line \
             at the end of the file.",
            file = request.prompt_file.display(),
            prompt = request.prompt,
        )
    }
}

impl Default for QChatAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolAdapter for QChatAdapter {
    fn name(&self) -> &str {
        "qchat"
    }

    async fn check_availability(&self) -> bool {
        probe_version(&self.command).await
    }

    async fn execute(&self, request: &ExecutionRequest) -> AdapterResponse {
        let mut cmd = Command::new(&self.command);
        cmd.arg("chat")
            .arg("--no-interactive")
            .arg("--trust-all-tools")
            .arg(Self::effective_prompt(request));
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
                    "q chat command failed".to_string()
                } else {
                    stderr
                }),
                tokens_used: None,
                cost: None,
            },
            Captured::LaunchFailed(e) => {
                AdapterResponse::failure(format!("Failed to launch q: {}", e))
            }
            Captured::TimedOut(secs) => {
                AdapterResponse::failure(format!("q chat timed out after {}s", secs))
            }
        }
    }
}

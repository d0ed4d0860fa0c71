//! Shared types for the adapter layer

use std::path::PathBuf;
use std::time::Duration;

/// Response from a single agent invocation
#[derive(Debug, Clone)]
pub struct AdapterResponse {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    /// Token count parsed from the tool's own output, when it reports one
    pub tokens_used: Option<u64>,
    /// Cost derived from the reported token count, when priceable
    pub cost: Option<f64>,
}

impl AdapterResponse {
    /// Successful invocation
    pub fn ok(output: String) -> Self {
        Self {
            success: true,
            output,
            error: None,
            tokens_used: None,
            cost: None,
        }
    }

    /// Failed invocation with no captured output
    pub fn failure(error: String) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error),
            tokens_used: None,
            cost: None,
        }
    }
}

/// One iteration's worth of execution parameters
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Prompt text, already passed through the context manager
    pub prompt: String,

    /// Path to the shared prompt file the agent is expected to edit
    pub prompt_file: PathBuf,

    /// Hard wall-clock limit for the subprocess
    pub timeout: Duration,

    /// Extra argv entries (adapter overrides plus CLI passthrough)
    pub extra_args: Vec<String>,
}

impl ExecutionRequest {
    pub fn new(prompt: impl Into<String>, prompt_file: impl Into<PathBuf>) -> Self {
        Self {
            prompt: prompt.into(),
            prompt_file: prompt_file.into(),
            timeout: Duration::from_secs(300),
            extra_args: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_response() {
        let resp = AdapterResponse::ok("done".to_string());
        assert!(resp.success);
        assert_eq!(resp.output, "done");
        assert!(resp.error.is_none());
    }

    #[test]
    fn test_failure_response() {
        let resp = AdapterResponse::failure("no binary".to_string());
        assert!(!resp.success);
        assert!(resp.output.is_empty());
        assert_eq!(resp.error.as_deref(), Some("no binary"));
    }

    #[test]
    fn test_request_builder() {
        let req = ExecutionRequest::new("do the thing", "PROMPT.md")
            .with_timeout(Duration::from_secs(10))
            .with_extra_args(vec!["--flag".into()]);

        assert_eq!(req.prompt, "do the thing");
        assert_eq!(req.timeout, Duration::from_secs(10));
        assert_eq!(req.extra_args, vec!["--flag"]);
    }
}

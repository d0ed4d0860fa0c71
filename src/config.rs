//! Flat settings struct for the orchestration loop
//!
//! Layering order: built-in defaults, then the TOML config file, then CLI
//! flags. All knobs that gate the loop (budgets, intervals, paths) live here.

use crate::cli::{AgentChoice, Args, Verbosity};
use crate::errors::{LoopError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_ITERATIONS: u32 = 100;
pub const DEFAULT_MAX_RUNTIME_SECS: u64 = 14_400; // 4 hours
pub const DEFAULT_PROMPT_FILE: &str = "PROMPT.md";
pub const DEFAULT_CHECKPOINT_INTERVAL: u32 = 5;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 2;
pub const DEFAULT_MAX_TOKENS: u64 = 1_000_000;
pub const DEFAULT_MAX_COST: f64 = 50.0;
pub const DEFAULT_CONTEXT_WINDOW: usize = 200_000;
pub const DEFAULT_CONTEXT_THRESHOLD: f64 = 0.8;
pub const DEFAULT_METRICS_INTERVAL: u32 = 10;
pub const DEFAULT_MAX_PROMPT_SIZE: u64 = 10_485_760; // 10MiB
pub const DEFAULT_ADAPTER_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_STATE_DIR: &str = ".agent";

/// Per-adapter overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterSettings {
    /// Whether this adapter may be used at all
    pub enabled: bool,

    /// Extra arguments appended to every invocation
    pub args: Vec<String>,

    /// Per-invocation timeout in seconds
    pub timeout_secs: u64,

    /// Attempts on this adapter per iteration before the loop falls back
    /// to another one
    pub max_retries: u32,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            args: Vec::new(),
            timeout_secs: DEFAULT_ADAPTER_TIMEOUT_SECS,
            max_retries: 3,
        }
    }
}

/// Configuration for the orchestration loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Agent name: claude, qchat, gemini, or auto
    pub agent: String,

    /// Path to the shared prompt file
    pub prompt_file: PathBuf,

    pub max_iterations: u32,
    pub max_runtime_secs: u64,
    pub checkpoint_interval: u32,
    pub retry_delay_secs: u64,
    pub max_tokens: u64,
    pub max_cost: f64,
    pub context_window: usize,
    pub context_threshold: f64,
    pub metrics_interval: u32,
    pub max_prompt_size: u64,

    /// Archive the prompt at each checkpoint
    pub archive_prompts: bool,

    /// Commit the working tree at each checkpoint
    pub git_checkpoint: bool,

    pub dry_run: bool,

    /// Verbosity level: 0 normal, 1 per-iteration events, 2+ raw agent output
    pub verbose: u8,
    pub quiet: bool,

    /// Root directory for archives, caches, and metrics snapshots
    pub state_dir: PathBuf,

    /// Passthrough arguments for the agent binary
    pub agent_args: Vec<String>,

    /// Per-adapter overrides, keyed by adapter name
    pub adapters: HashMap<String, AdapterSettings>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            agent: "auto".to_string(),
            prompt_file: PathBuf::from(DEFAULT_PROMPT_FILE),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_runtime_secs: DEFAULT_MAX_RUNTIME_SECS,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            max_tokens: DEFAULT_MAX_TOKENS,
            max_cost: DEFAULT_MAX_COST,
            context_window: DEFAULT_CONTEXT_WINDOW,
            context_threshold: DEFAULT_CONTEXT_THRESHOLD,
            metrics_interval: DEFAULT_METRICS_INTERVAL,
            max_prompt_size: DEFAULT_MAX_PROMPT_SIZE,
            archive_prompts: true,
            git_checkpoint: true,
            dry_run: false,
            verbose: 0,
            quiet: false,
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            agent_args: Vec::new(),
            adapters: HashMap::new(),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from a TOML file
    pub fn load_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| LoopError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        toml::from_str(&contents)
            .map_err(|e| LoopError::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Default config file location (~/.agentloop/config.toml)
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".agentloop").join("config.toml"))
    }

    /// Build the effective config: defaults, then an optional file, then CLI flags
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    /// Overlay CLI flags onto this config
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(agent) = args.agent {
            self.agent = agent.as_str().to_string();
        }
        if let Some(prompt) = &args.prompt {
            self.prompt_file = prompt.clone();
        }
        if let Some(v) = args.max_iterations {
            self.max_iterations = v;
        }
        if let Some(v) = args.max_runtime {
            self.max_runtime_secs = v;
        }
        if let Some(v) = args.checkpoint_interval {
            self.checkpoint_interval = v;
        }
        if let Some(v) = args.retry_delay {
            self.retry_delay_secs = v;
        }
        if let Some(v) = args.max_tokens {
            self.max_tokens = v;
        }
        if let Some(v) = args.max_cost {
            self.max_cost = v;
        }
        if let Some(v) = args.context_window {
            self.context_window = v;
        }
        if let Some(v) = args.context_threshold {
            self.context_threshold = v;
        }
        if let Some(v) = args.metrics_interval {
            self.metrics_interval = v;
        }
        if let Some(v) = args.max_prompt_size {
            self.max_prompt_size = v;
        }
        if args.no_git {
            self.git_checkpoint = false;
        }
        if args.no_archive {
            self.archive_prompts = false;
        }
        if args.dry_run {
            self.dry_run = true;
        }
        if args.quiet {
            self.quiet = true;
        }
        if args.verbose > 0 {
            self.verbose = args.verbose;
        }
        if !args.agent_args.is_empty() {
            self.agent_args = args.agent_args.clone();
        }
    }

    /// Reject configs the loop cannot safely run with
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(LoopError::Config("max_iterations must be at least 1".into()));
        }
        if self.checkpoint_interval == 0 {
            return Err(LoopError::Config("checkpoint_interval must be at least 1".into()));
        }
        if self.metrics_interval == 0 {
            return Err(LoopError::Config("metrics_interval must be at least 1".into()));
        }
        if !(self.context_threshold > 0.0 && self.context_threshold <= 1.0) {
            return Err(LoopError::Config(
                "context_threshold must be within (0.0, 1.0]".into(),
            ));
        }
        if self.max_cost < 0.0 {
            return Err(LoopError::Config("max_cost must not be negative".into()));
        }
        match self.agent.as_str() {
            "claude" | "qchat" | "gemini" | "auto" => {}
            other => {
                return Err(LoopError::Config(format!(
                    "unknown agent '{}', expected claude, qchat, gemini, or auto",
                    other
                )));
            }
        }
        Ok(())
    }

    /// Effective verbosity level for console output
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose)
    }

    /// Overrides for a named adapter, falling back to defaults
    pub fn adapter_settings(&self, name: &str) -> AdapterSettings {
        self.adapters.get(name).cloned().unwrap_or_default()
    }

    /// Directory for archived and summarized prompts
    pub fn archive_dir(&self) -> PathBuf {
        self.state_dir.join("prompts")
    }

    /// Directory for metrics and state snapshots
    pub fn metrics_dir(&self) -> PathBuf {
        self.state_dir.join("metrics")
    }

    /// Directory for the prompt prefix cache
    pub fn cache_dir(&self) -> PathBuf {
        self.state_dir.join("cache")
    }

    /// Create the state directory tree
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            self.state_dir.clone(),
            self.archive_dir(),
            self.metrics_dir(),
            self.cache_dir(),
        ] {
            fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Render the effective config as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| LoopError::Config(e.to_string()))
    }
}

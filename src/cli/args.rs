//! Command-line argument parsing for agentloop
//!
//! Provides clap-based CLI with subcommands and verbosity control.
//! Flags left unset fall back to the config file, then to built-in defaults.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// agentloop - Put any AI CLI agent in a loop until the task is done
#[derive(Parser, Debug)]
#[command(name = "agentloop")]
#[command(version = "0.3.0")]
#[command(about = "Loop an AI CLI against a prompt file until TASK_COMPLETE appears", long_about = None)]
pub struct Args {
    /// AI agent to use
    #[arg(short, long, value_enum)]
    pub agent: Option<AgentChoice>,

    /// Prompt file path
    #[arg(short, long, value_name = "FILE")]
    pub prompt: Option<PathBuf>,

    /// Maximum iterations
    #[arg(short = 'i', long)]
    pub max_iterations: Option<u32>,

    /// Maximum runtime in seconds
    #[arg(short = 't', long)]
    pub max_runtime: Option<u64>,

    /// Git checkpoint interval in iterations
    #[arg(short = 'c', long)]
    pub checkpoint_interval: Option<u32>,

    /// Delay between iterations in seconds
    #[arg(short = 'r', long)]
    pub retry_delay: Option<u64>,

    /// Maximum total tokens
    #[arg(long)]
    pub max_tokens: Option<u64>,

    /// Maximum cost in USD
    #[arg(long)]
    pub max_cost: Option<f64>,

    /// Context window size in tokens
    #[arg(long)]
    pub context_window: Option<usize>,

    /// Context summarization threshold (fraction of window)
    #[arg(long)]
    pub context_threshold: Option<f64>,

    /// State snapshot interval in iterations
    #[arg(long)]
    pub metrics_interval: Option<u32>,

    /// Maximum prompt file size in bytes
    #[arg(long)]
    pub max_prompt_size: Option<u64>,

    /// Disable git checkpointing
    #[arg(long)]
    pub no_git: bool,

    /// Disable prompt archiving
    #[arg(long)]
    pub no_archive: bool,

    /// Dry run mode (don't execute agents)
    #[arg(long)]
    pub dry_run: bool,

    /// Configuration file path
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Verbosity level: default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress all output except the final summary)
    #[arg(short, long)]
    pub quiet: bool,

    /// Additional arguments passed through to the agent binary (after `--`)
    #[arg(value_name = "AGENT_ARGS", last = true)]
    pub agent_args: Vec<String>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Supported AI agent CLIs
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentChoice {
    Claude,
    Qchat,
    Gemini,
    /// Probe each CLI and use the first one that responds
    Auto,
}

impl AgentChoice {
    /// Name used in config files and the adapter registry
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentChoice::Claude => "claude",
            AgentChoice::Qchat => "qchat",
            AgentChoice::Gemini => "gemini",
            AgentChoice::Auto => "auto",
        }
    }
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check adapter availability, git, and prompt file health
    Doctor,

    /// Remove orchestrator state and temporary files
    Clean {
        /// Also remove metrics snapshots
        #[arg(long)]
        metrics: bool,
    },

    /// Display the effective configuration
    Config,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose)
    }
}

impl Verbosity {
    /// Derive the level from a quiet flag and a `-v` count
    pub fn from_flags(quiet: bool, verbose: u8) -> Self {
        if quiet {
            Verbosity::Quiet
        } else {
            match verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }

    /// Check if iteration progress spinners should be shown
    pub fn show_progress(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }

    /// Check if per-iteration events should be printed
    pub fn show_events(&self) -> bool {
        matches!(self, Verbosity::Verbose | Verbosity::VeryVerbose)
    }

    /// Check if raw adapter output should be echoed
    pub fn show_output(&self) -> bool {
        matches!(self, Verbosity::VeryVerbose)
    }
}

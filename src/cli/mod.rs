//! Command-line interface for agentloop

pub mod args;

pub use args::{AgentChoice, Args, Commands, Verbosity};

//! agentloop - Autonomous agent orchestration loop
//!
//! Runs an AI coding CLI (claude, q, or gemini) against a shared prompt
//! file in a bounded loop until the agent marks the task complete or a
//! safety budget runs out.

pub mod adapters;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod context;
pub mod doctor;
pub mod errors;
pub mod metrics;
pub mod orchestrator;
pub mod safety;
pub mod telemetry;

pub use errors::{LoopError, Result};
pub use orchestrator::{LoopOutcome, Orchestrator, StopReason};

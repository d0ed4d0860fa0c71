//! Git checkpointing and prompt archiving
//!
//! Checkpoints are ordinary commits made at fixed intervals; rollback is a
//! hard reset to the previous one. Checkpoint failures are reported to the
//! caller as warnings, never as loop-fatal errors.

use crate::errors::{LoopError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

const GIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of a checkpoint attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointOutcome {
    /// Commit created
    Committed,
    /// Nothing to commit, or git declined; loop continues
    Skipped(String),
    /// Git checkpointing disabled by config
    Disabled,
}

/// Manages git checkpoints and prompt archives
pub struct CheckpointManager {
    git_enabled: bool,
    archive_enabled: bool,
    archive_dir: PathBuf,
    workdir: PathBuf,
}

impl CheckpointManager {
    pub fn new(
        git_enabled: bool,
        archive_enabled: bool,
        archive_dir: PathBuf,
        workdir: PathBuf,
    ) -> Self {
        Self {
            git_enabled,
            archive_enabled,
            archive_dir,
            workdir,
        }
    }

    async fn run_git(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.workdir);

        let output = timeout(GIT_TIMEOUT, cmd.output())
            .await
            .map_err(|_| LoopError::Timeout {
                duration_ms: GIT_TIMEOUT.as_millis() as u64,
            })?
            .map_err(|e| LoopError::Git(format!("failed to run git {}: {}", args.join(" "), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LoopError::Git(format!(
                "git {} exited with {}: {}",
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Stage everything and commit. A failed commit (e.g. clean tree) is a
    /// skip, not an error.
    pub async fn create(&self, iteration: u32) -> CheckpointOutcome {
        if !self.git_enabled {
            return CheckpointOutcome::Disabled;
        }

        if let Err(e) = self.run_git(&["add", "-A"]).await {
            return CheckpointOutcome::Skipped(e.to_string());
        }

        let message = format!("checkpoint: iteration {}", iteration);
        match self.run_git(&["commit", "-m", &message]).await {
            Ok(_) => CheckpointOutcome::Committed,
            Err(e) => CheckpointOutcome::Skipped(e.to_string()),
        }
    }

    /// Roll back to the previous checkpoint
    pub async fn rollback(&self) -> Result<()> {
        if !self.git_enabled {
            return Err(LoopError::Git("git checkpointing is disabled".to_string()));
        }
        self.run_git(&["reset", "--hard", "HEAD~1"]).await?;
        Ok(())
    }

    /// Copy the prompt file into the archive, labeled by iteration
    pub fn archive_prompt(&self, prompt_file: &Path, iteration: u32) -> Result<Option<PathBuf>> {
        if !self.archive_enabled || !prompt_file.exists() {
            return Ok(None);
        }

        fs::create_dir_all(&self.archive_dir)?;
        let dest = self.archive_dir.join(format!("prompt_{:04}.md", iteration));
        fs::copy(prompt_file, &dest)?;
        Ok(Some(dest))
    }

    pub fn git_enabled(&self) -> bool {
        self.git_enabled
    }
}

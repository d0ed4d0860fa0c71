//! Doctor command for environment diagnostics
//!
//! Checks that at least one agent CLI answers, that git is usable for
//! checkpointing, and that the prompt file and state directory are sane.

use crate::adapters::{probe_version, DETECTION_ORDER};
use crate::config::OrchestratorConfig;
use std::fs;
use std::path::Path;

/// Health check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Pass,
    Warn(String),
    Fail(String),
}

/// Individual health check
#[derive(Debug)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
}

/// Doctor diagnostics over the orchestrator environment
pub struct Doctor {
    config: OrchestratorConfig,
}

impl Doctor {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    /// Run all health checks
    pub async fn run_diagnostics(&self) -> Vec<HealthCheck> {
        let mut checks = Vec::new();

        for agent in DETECTION_ORDER {
            checks.push(self.check_adapter(agent).await);
        }
        checks.push(self.check_git().await);
        checks.push(self.check_prompt_file());
        checks.push(self.check_state_dir());

        checks
    }

    /// An unavailable adapter is a warning; the loop only needs one
    async fn check_adapter(&self, name: &str) -> HealthCheck {
        let binary = if name == "qchat" { "q" } else { name };
        let settings = self.config.adapter_settings(name);

        let status = if !settings.enabled {
            HealthStatus::Warn("disabled in config".to_string())
        } else if probe_version(binary).await {
            HealthStatus::Pass
        } else {
            HealthStatus::Warn(format!("'{}' CLI not responding", binary))
        };

        HealthCheck {
            name: format!("Adapter: {}", name),
            status,
        }
    }

    async fn check_git(&self) -> HealthCheck {
        let status = if !self.config.git_checkpoint {
            HealthStatus::Warn("git checkpointing disabled".to_string())
        } else if !probe_version("git").await {
            HealthStatus::Fail("git binary not found".to_string())
        } else if !Path::new(".git").exists() {
            HealthStatus::Warn("not inside a git repository, checkpoints will be skipped".to_string())
        } else {
            HealthStatus::Pass
        };

        HealthCheck {
            name: "Git checkpointing".to_string(),
            status,
        }
    }

    fn check_prompt_file(&self) -> HealthCheck {
        let path = &self.config.prompt_file;
        let status = match fs::metadata(path) {
            Err(_) => HealthStatus::Fail(format!("{} not found", path.display())),
            Ok(meta) if meta.len() == 0 => HealthStatus::Warn("prompt file is empty".to_string()),
            Ok(meta) if meta.len() > self.config.max_prompt_size => HealthStatus::Fail(format!(
                "prompt file is {} bytes, over the {} byte cap",
                meta.len(),
                self.config.max_prompt_size
            )),
            Ok(_) => HealthStatus::Pass,
        };

        HealthCheck {
            name: "Prompt file".to_string(),
            status,
        }
    }

    fn check_state_dir(&self) -> HealthCheck {
        let status = match self.config.ensure_dirs() {
            Err(e) => HealthStatus::Fail(format!("cannot create state dirs: {}", e)),
            Ok(()) => {
                let probe = self.config.state_dir.join(".write_probe");
                match fs::write(&probe, b"ok") {
                    Ok(()) => {
                        let _ = fs::remove_file(&probe);
                        HealthStatus::Pass
                    }
                    Err(e) => HealthStatus::Fail(format!("state dir not writable: {}", e)),
                }
            }
        };

        HealthCheck {
            name: "State directory".to_string(),
            status,
        }
    }
}

/// True when no check failed outright
pub fn all_usable(checks: &[HealthCheck]) -> bool {
    !checks
        .iter()
        .any(|c| matches!(c.status, HealthStatus::Fail(_)))
}

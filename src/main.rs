//! agentloop binary entry point

use agentloop::cli::{Args, Commands};
use agentloop::config::OrchestratorConfig;
use agentloop::doctor::{all_usable, Doctor, HealthStatus};
use agentloop::Orchestrator;
use clap::Parser;
use colored::Colorize;
use std::fs;
use std::sync::atomic::Ordering;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match OrchestratorConfig::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            std::process::exit(2);
        }
    };

    let code = match &args.command {
        Some(Commands::Doctor) => run_doctor(config).await,
        Some(Commands::Clean { metrics }) => run_clean(&config, *metrics),
        Some(Commands::Config) => run_config(&config),
        None => run_loop(config).await,
    };

    std::process::exit(code);
}

async fn run_loop(config: OrchestratorConfig) -> i32 {
    let mut orchestrator = match Orchestrator::new(config).await {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            return 2;
        }
    };

    // SIGINT/SIGTERM flip the flag; the loop stops at the next iteration
    // boundary after finishing its bookkeeping
    let shutdown = orchestrator.shutdown_flag();
    tokio::spawn(async move {
        #[cfg(unix)]
        let terminated = async {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    term.recv().await;
                }
                Err(_) => std::future::pending().await,
            }
        };
        #[cfg(not(unix))]
        let terminated = std::future::pending::<()>();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminated => {}
        }
        shutdown.store(true, Ordering::SeqCst);
    });

    match orchestrator.run().await {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            2
        }
    }
}

async fn run_doctor(config: OrchestratorConfig) -> i32 {
    println!("{}", "Environment Diagnostics".bold());
    println!("─────────────────────────────────────");

    let checks = Doctor::new(config).run_diagnostics().await;
    for check in &checks {
        match &check.status {
            HealthStatus::Pass => println!("{} {}", "✓".green(), check.name),
            HealthStatus::Warn(why) => {
                println!("{} {} ({})", "!".yellow(), check.name, why)
            }
            HealthStatus::Fail(why) => {
                println!("{} {} ({})", "✗".red(), check.name, why)
            }
        }
    }

    if all_usable(&checks) {
        println!("\n{}", "Environment is usable".green());
        0
    } else {
        println!("\n{}", "Environment has blocking problems".red());
        1
    }
}

fn run_clean(config: &OrchestratorConfig, metrics: bool) -> i32 {
    let mut targets = vec![config.archive_dir(), config.cache_dir()];
    if metrics {
        targets.push(config.metrics_dir());
    }

    let mut code = 0;
    for dir in targets {
        if !dir.exists() {
            continue;
        }
        match fs::remove_dir_all(&dir) {
            Ok(()) => println!("{} removed {}", "✓".green(), dir.display()),
            Err(e) => {
                eprintln!("{} could not remove {}: {}", "✗".red(), dir.display(), e);
                code = 1;
            }
        }
    }
    code
}

fn run_config(config: &OrchestratorConfig) -> i32 {
    match config.to_toml() {
        Ok(rendered) => {
            println!("{}", rendered);
            0
        }
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            1
        }
    }
}

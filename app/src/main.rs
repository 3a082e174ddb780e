mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::logger;
use dotenvy::dotenv;
use engine::{Supervisor, SupervisorConfig};
use metrics::Metrics;
use store::Ledger;
use tokio::sync::watch;
use tracing::info;

use config::EnvConfig;

#[derive(Parser)]
#[command(name = "gridbot", about = "Grid trading control plane")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Run the supervisor and every active trading app
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    logger::init_logging();
    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run().await,
    }
}

async fn run() -> Result<()> {
    let cfg = EnvConfig::from_env()?;

    let ledger = Ledger::connect(&cfg.storage_url)
        .await
        .context("storage connection failed")?;

    let metrics = Arc::new(Metrics::new());
    let _metrics_server = cfg
        .metrics_port
        .map(|port| metrics::spawn(Arc::clone(&metrics), port));

    let supervisor = Supervisor::new(SupervisorConfig {
        interval: cfg.interval,
        slack_hook: cfg.slack_hook.clone(),
        ledger,
        metrics,
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let supervisor_handle = tokio::spawn(supervisor.run(shutdown_rx));

    info!("gridbot started, interrupt to shut down");
    wait_for_signal().await;

    info!("gridbot stopping ...");
    let _ = shutdown_tx.send(true);
    supervisor_handle
        .await
        .context("supervisor task panicked")?;
    info!("gridbot stopped");

    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).expect("installing SIGTERM handler never fails");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

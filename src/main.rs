//! # relay
//!
//! `relay serve` runs the coordinator; `relay hook` is what the agent invokes
//! for each lifecycle event.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relay_server::{ServerConfig, ShutdownCoordinator};
use relay_settings::{load_settings, load_settings_required, RelaySettings};
use relay_telemetry::{init_telemetry, TelemetryConfig};
use tokio::io::AsyncReadExt;

#[derive(Parser, Debug)]
#[command(name = "relay", about = "Hook relay: permission and response coordinator")]
struct Cli {
    /// Settings file (defaults to `~/.relay/settings.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP/WebSocket server.
    Serve {
        /// Host to bind.
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (0 for auto-assign).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Read one hook event from stdin and print the agent's answer.
    Hook,
}

fn settings(path: Option<&PathBuf>) -> Result<RelaySettings> {
    match path {
        Some(p) => load_settings_required(p)
            .with_context(|| format!("Failed to load settings from {}", p.display())),
        None => load_settings().context("Failed to load settings"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve { host, port } => serve(cli.config.as_ref(), host, port).await,
        Command::Hook => hook(cli.config.as_ref()).await,
    }
}

async fn serve(config: Option<&PathBuf>, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut settings = settings(config)?;
    if let Some(host) = host {
        settings.server.host = host;
    }
    if let Some(port) = port {
        settings.server.port = port;
    }

    let telemetry = init_telemetry(TelemetryConfig {
        log_level: settings.logging.level.clone(),
        json: settings.logging.json,
        stderr: false,
    });

    let shutdown = ShutdownCoordinator::new();
    let _signals = shutdown.install_signal_handler();

    let server_config = ServerConfig::from_settings(&settings);
    let handle = relay_server::start(server_config, telemetry.metrics(), shutdown.token())
        .await
        .with_context(|| format!("Failed to bind {}", settings.server.bind_addr()))?;

    tracing::info!(port = handle.port(), "relay ready");

    let server = handle.into_task();
    shutdown.token().cancelled().await;
    tracing::info!("shutting down");
    shutdown.graceful_shutdown(vec![server], None).await;
    Ok(())
}

/// Never fails the agent: settings or stdin errors still exit 0.
async fn hook(config: Option<&PathBuf>) -> Result<()> {
    let settings = match settings(config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("relay hook: {e:#}, using defaults");
            RelaySettings::default()
        }
    };

    let _telemetry = init_telemetry(TelemetryConfig {
        log_level: "warn".to_string(),
        json: settings.logging.json,
        stderr: true,
    });

    let mut input = String::new();
    if let Err(e) = tokio::io::stdin().read_to_string(&mut input).await {
        tracing::warn!(error = %e, "failed to read hook input");
        return Ok(());
    }

    if let Some(out) = relay_hook::run_hook(&input, settings.hook).await {
        println!("{out}");
    }
    Ok(())
}

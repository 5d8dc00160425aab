//! # courier
//!
//! Demo server binary: loads settings, starts telemetry and serves the demo
//! commands until Ctrl-C.

#![deny(unsafe_code)]

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use courier_server::{load_settings_from_path, CourierSettings, Server};
use courier_telemetry::{init_telemetry, TelemetryConfig};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "courier", about = "Concurrent message dispatcher over WebSocket")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Serve the demo commands.
    Serve {
        /// Settings file (default `~/.courier/settings.json`).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Host to bind (overrides settings).
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (overrides settings).
        #[arg(long)]
        port: Option<u16>,
    },
}

fn default_settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".courier").join("settings.json")
}

fn load_settings(
    config: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<CourierSettings> {
    let path = config.unwrap_or_else(default_settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;
    if let Some(host) = host {
        settings.server.host = host;
    }
    if let Some(port) = port {
        settings.server.port = port;
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let CliCommand::Serve { config, host, port } = cli.command;

    let settings = load_settings(config, host, port)?;
    let telemetry = TelemetryConfig::from_levels(
        &settings.logging.level,
        settings
            .logging
            .modules
            .iter()
            .map(|(module, level)| (module.as_str(), level.as_str())),
        settings.logging.json,
    )?;
    init_telemetry(&telemetry)?;

    let handle = Server::new(settings.server.clone(), commands::demo_router())
        .listen()
        .await?;
    info!(addr = %handle.addr(), ws_path = %settings.server.ws_path, "ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("interrupt received, shutting down");

    if !handle.shutdown().await {
        warn!("some connections did not drain before the timeout");
    }
    Ok(())
}

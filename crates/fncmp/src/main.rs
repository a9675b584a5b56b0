//! # fncmp
//!
//! Demo server binary: loads settings, installs logging and metrics, and
//! serves the demo routes over WebSocket.

#![deny(unsafe_code)]

mod demo;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use fncmp_core::logging::{LogFormat, init_subscriber};
use fncmp_server::{Engine, FncmpServer};
use fncmp_settings::FncmpSettings;
use metrics_exporter_prometheus::PrometheusHandle;

/// fncmp demo server.
#[derive(Parser, Debug)]
#[command(name = "fncmp", about = "Server-driven UI over WebSocket")]
struct Cli {
    /// Settings file (defaults to `~/.fncmp/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log level or filter directive (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn load_settings(&self) -> Result<FncmpSettings> {
        let mut settings = match &self.config {
            Some(path) => fncmp_settings::load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => fncmp_settings::load_settings().context("Failed to load settings")?,
        };
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
        Ok(settings)
    }
}

fn log_format(settings: &FncmpSettings) -> LogFormat {
    if settings.logging.json { LogFormat::Json } else { LogFormat::Compact }
}

/// Build a server with the demo routes registered.
fn build_server(settings: &FncmpSettings, metrics: PrometheusHandle) -> FncmpServer {
    let server = FncmpServer::new(Engine::from_settings(settings), metrics);
    demo::register(server.handler());
    server
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;
    init_subscriber(&settings.logging.level, log_format(&settings));

    let metrics = fncmp_server::metrics::install_recorder().context("Failed to install metrics recorder")?;
    let server = build_server(&settings, metrics);
    let addr = server.listen().await.context("Failed to bind server")?;
    tracing::info!("fncmp listening on http://{addr} (ws endpoint /ws)");

    tokio::signal::ctrl_c().await.context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let aborted = server.shutdown(Some(Duration::from_secs(10))).await;
    if aborted > 0 {
        tracing::warn!(aborted, "tasks aborted during shutdown");
    }
    Ok(())
}

mod check_config_cmd;
mod status_cmd;
mod wiring;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use linebridge_config::{load_and_prepare, log_report, BridgeConfig, ValidationReport};
use linebridge_gateway::{start_server, GatewayState, RelaySettings};
use linebridge_logging::{init_logger, LoggerOptions};

#[derive(Parser)]
#[command(name = "linebridge")]
#[command(about = "Relay LINE chats into Kommo CRM and Kommo replies back to LINE")]
#[command(version)]
struct Cli {
    /// Config file (default: $LINEBRIDGE_CONFIG or ~/.linebridge/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook server
    Serve {
        /// Port to bind the HTTP server to
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Query a running server's /status endpoint
    Status {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Validate the configuration and print it with secrets redacted
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, report) = load_and_prepare(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Serve { port } => {
            init_logger(&LoggerOptions {
                level: config.logging.level.clone(),
                json: config.logging.json,
                dir: config.logging.dir.as_ref().map(PathBuf::from),
            });
            let mut config = config;
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config, report).await?;
        }
        Commands::Status { port } => {
            status_cmd::run(
                port.unwrap_or(config.server.port),
                Duration::from_secs(config.relay.http_timeout_secs),
            )
            .await?;
        }
        Commands::CheckConfig => {
            init_logger(&LoggerOptions {
                level: "warn".to_string(),
                ..Default::default()
            });
            check_config_cmd::run(&config, &report)?;
        }
    }

    Ok(())
}

async fn serve(config: BridgeConfig, report: ValidationReport) -> Result<()> {
    log_report(&report);
    if !report.is_valid() {
        bail!("refusing to start with {} config error(s)", report.errors.len());
    }

    info!(
        addr = %config.server.addr(),
        line_webhook = %config.line.webhook_path,
        kommo_webhook = %config.kommo.webhook_path,
        "Starting linebridge"
    );

    let http = wiring::http_client(&config)?;
    let state = Arc::new(GatewayState::new(
        RelaySettings::from_config(&config),
        wiring::crm(&config.kommo, &http),
        wiring::messaging(&config.line, &http),
    ));

    start_server(&config.server.addr(), state).await
}

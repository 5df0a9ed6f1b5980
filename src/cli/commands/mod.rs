mod subcommands;


use crate::config::load_config;
use crate::gateway::{self, GatewayState};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "bookhook")]
#[command(about = "WhatsApp Flow booking webhook")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook server (default)
    Serve {
        /// Config file (defaults to ~/.bookhook/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override gateway.port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Write the booking dataset to a file, or stdout
    Export {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Load and validate the configuration, then print it with secrets redacted
    CheckConfig {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve {
        config: None,
        port: None,
    }) {
        Commands::Serve { config, port } => serve(config, port).await?,
        Commands::Export { config, output } => {
            subcommands::export(config.as_deref(), output.as_deref()).await?;
        }
        Commands::CheckConfig { config } => subcommands::check_config(config.as_deref())?,
    }

    Ok(())
}

async fn serve(config_path: Option<PathBuf>, port: Option<u16>) -> Result<()> {
    info!("Loading configuration...");
    let mut config = load_config(config_path.as_deref())?;
    if let Some(port) = port {
        config.gateway.port = port;
    }
    info!(
        "Configuration loaded. Dataset: {}",
        config.store.dataset_path().display()
    );

    let state = GatewayState::from_config(&config);
    let server = gateway::start(&config.gateway.host, config.gateway.port, state).await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
        res = server => {
            if let Err(e) = res {
                error!("HTTP server task failed: {}", e);
            }
        }
    }

    Ok(())
}

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use smithconf::SmithConfig;
use tunesmith::{server, telemetry};

/// Audio upload server for the visualizer
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file to use instead of ./tunesmith.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind
        #[arg(long)]
        host: Option<String>,
    },
    /// Print the effective configuration and where it came from
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, sources) = SmithConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    match cli.command.unwrap_or(Command::Serve {
        port: None,
        host: None,
    }) {
        Command::ShowConfig => {
            for file in &sources.files {
                println!("# loaded: {}", file.display());
            }
            for var in &sources.env_overrides {
                println!("# env: {var}");
            }
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Command::Serve { port, host } => {
            if let Some(port) = port {
                config.infra.bind.http_port = port;
            }
            if let Some(host) = host {
                config.infra.bind.host = host;
            }

            let guard = telemetry::init(&config.infra.telemetry)
                .context("Failed to initialize telemetry")?;
            for file in &sources.files {
                tracing::info!(file = %file.display(), "loaded config");
            }

            let result = server::run(config).await;
            guard.shutdown();
            result
        }
    }
}

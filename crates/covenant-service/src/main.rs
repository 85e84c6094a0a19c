//! covenantd - governance control plane daemon
//!
//! - REST API for ingest, gated completions, labelling and tuning
//! - Scheduled policy tuning from labelled outcomes
//! - Offline chain verification and one-shot tuning

use anyhow::Context;
use clap::{Parser, Subcommand};
use covenant_service::{telemetry, AppState, CovenantConfig, Server};

#[derive(Parser)]
#[command(name = "covenantd")]
#[command(about = "Covenant - governance control plane", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "COVENANT_CONFIG", global = true)]
    config: Option<String>,

    /// Listen address, overrides the configuration file
    #[arg(short, long, env = "COVENANT_LISTEN_ADDR", global = true)]
    listen: Option<String>,

    /// Log level, overrides the configuration file
    #[arg(long, env = "COVENANT_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "COVENANT_LOG_JSON", global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Run the daemon (default)
    Serve,
    /// Verify the ledger chain and exit non-zero on a break
    Verify,
    /// Run one tuning cycle and print the report
    Tune,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        CovenantConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .with_context(|| format!("invalid listen address: {listen}"))?;
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.json {
        config.logging.json = true;
    }

    telemetry::init(&config.logging.level, config.logging.json);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let server = Server::new(config).await?;
            server.run().await?;
        }
        Command::Verify => {
            let state = AppState::bootstrap(&config).await?;
            let result = state.ledger.verify().await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.intact {
                anyhow::bail!(
                    "ledger chain broken at sequence {}",
                    result.first_break.unwrap_or_default()
                );
            }
        }
        Command::Tune => {
            let state = AppState::bootstrap(&config).await?;
            let report = state.tuner.run().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

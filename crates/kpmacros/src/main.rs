//! Binary entrypoint for the `kpmacros` command-line front end.
use std::{path::PathBuf, process};

use clap::{Parser, Subcommand};
use kp_client::{Client, ClientConfig};
use tracing::{debug, error};

/// Subcommand implementations.
mod commands;

#[derive(Parser, Debug)]
#[command(name = "kpmacros", about = "Talk to a running KPMacros backend", version)]
/// Command-line interface for the `kpmacros` binary.
struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,

    /// Backend endpoint (overrides config and environment)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Optional path to a RON client config file
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Logging controls
    #[command(flatten)]
    log: logging::LogArgs,
}

#[derive(Subcommand, Debug)]
/// Top-level CLI subcommands.
enum Command {
    /// List profiles.
    Profiles,
    /// List the macros of a profile.
    Macros {
        /// Profile name
        #[arg(long, default_value = "Global")]
        profile: String,
    },
    /// Enable or disable a macro.
    Toggle {
        /// Profile name
        #[arg(long, default_value = "Global")]
        profile: String,
        /// Macro name
        #[arg(long = "macro", value_name = "NAME")]
        name: String,
    },
    /// Print every inbound message and connection event until interrupted.
    Watch,
}

/// Build the client config from file, environment and flags.
fn load_config(cli: &Cli) -> kp_client::Result<ClientConfig> {
    let base = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };
    let mut config = base.with_env_overrides()?;
    if let Some(url) = &cli.url {
        config.url = Some(url.clone());
    }
    Ok(config)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(&cli.log.spec());

    let client = match load_config(&cli).and_then(Client::with_websocket) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };
    debug!(url = client.url(), "client ready");

    let result = match cli.command {
        Command::Profiles => commands::profiles(&client).await,
        Command::Macros { profile } => commands::macros(&client, &profile).await,
        Command::Toggle { profile, name } => commands::toggle(&client, &profile, &name).await,
        Command::Watch => commands::watch(&client).await,
    };
    client.dispose();
    if let Err(e) = result {
        error!("{e}");
        eprintln!("{e}");
        process::exit(1);
    }
}

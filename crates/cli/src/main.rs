//! LedgerBridge CLI — the main entry point.
//!
//! Commands:
//! - `route`    — Show which domains a message would load
//! - `extract`  — Show the ids, names, and date hints found in a message
//! - `ask`      — Assemble the context for one message over a fixture directory
//! - `chat`     — Interactive multi-turn session over a fixture directory
//! - `config`   — Print the effective configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod pipeline;

#[derive(Parser)]
#[command(
    name = "ledgerbridge",
    about = "LedgerBridge — bounded business context for chat turns",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of ~/.ledgerbridge/config.toml
    #[arg(long, global = true, env = "LEDGERBRIDGE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which domains a message routes to
    Route {
        message: String,

        /// Domains loaded on the previous turn (repeatable)
        #[arg(long = "last")]
        last: Vec<String>,
    },

    /// Show entities extracted from a message
    Extract { message: String },

    /// Assemble context for a single message
    Ask {
        message: String,

        /// Directory holding projects.json, clients.json, payments.json,
        /// customers.json, invoices.json
        #[arg(short, long)]
        data: PathBuf,

        /// Session id (random if omitted)
        #[arg(short, long)]
        session: Option<String>,

        /// Print the assembled context as JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Interactive session over a fixture directory
    Chat {
        #[arg(short, long)]
        data: PathBuf,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Print built-in defaults instead
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Route { message, last } => commands::route::run(config_path, &message, &last)?,
        Commands::Extract { message } => commands::extract::run(config_path, &message)?,
        Commands::Ask {
            message,
            data,
            session,
            json,
        } => commands::ask::run(config_path, &data, session, &message, json).await?,
        Commands::Chat { data } => commands::chat::run(config_path, &data).await?,
        Commands::Config { default } => commands::config_cmd::run(config_path, default)?,
    }

    Ok(())
}

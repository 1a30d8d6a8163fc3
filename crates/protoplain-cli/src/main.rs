//! protoplain CLI
//!
//! Inspection and maintenance for the plain-struct runtime:
//! - packing/unpacking field metadata words
//! - reading and extending the collision ledger sidecar
//! - planning a layout manifest and printing the generated constant

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod config;
mod layout;
mod ledger;
mod meta;

use config::{CliConfig, LOG_ENV};

#[derive(Parser)]
#[command(name = "protoplain")]
#[command(author, version, about = "Plain protobuf struct layouts and collision ledger")]
struct Cli {
    /// Ledger sidecar path (env: PROTOPLAIN_CRF).
    #[arg(long, global = true)]
    crf: Option<PathBuf>,

    /// Suffix for plain struct names (env: PROTOPLAIN_PLAIN_SUFFIX).
    #[arg(long, global = true)]
    plain_suffix: Option<String>,

    /// Log at debug level unless PROTOPLAIN_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Field metadata words.
    Meta {
        #[command(subcommand)]
        command: meta::MetaCommands,
    },

    /// Collision ledger sidecar.
    Crf {
        #[command(subcommand)]
        command: ledger::CrfCommands,
    },

    /// Layout planning.
    Layout {
        #[command(subcommand)]
        command: layout::LayoutCommands,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = CliConfig::resolve(cli.crf, cli.plain_suffix);

    match cli.command {
        Commands::Meta { command } => meta::cmd_meta(command),
        Commands::Crf { command } => ledger::cmd_crf(command, &config.crf_path),
        Commands::Layout { command } => {
            layout::cmd_layout(command, &config.crf_path, &config.layout)
        }
    }
}

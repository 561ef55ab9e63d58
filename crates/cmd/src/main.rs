// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use cmd::commands::{
    ExportArgs, ImportArgs, QueryArgs, check_command, export_command, import_command,
    init_command, query_command,
};
use fluxport::config::{DEFAULT_CONFIG_FILE, ENV_OUTPUT, ENV_TOKEN};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "fluxport")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an example configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Query one bucket and print decoded records as NDJSON
    Query(QueryArgs),
    /// Export buckets to NDJSON files
    #[command(after_help = format!("{ENV_TOKEN} and {ENV_OUTPUT} override the configuration file."))]
    Export(ExportArgs),
    /// Write exported NDJSON files back into the store
    Import(ImportArgs),
    /// Check store health and the configured buckets
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    diagnostics::init_diagnostics();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Init { force } => init_command(&cli.config, *force),
        Commands::Query(args) => query_command(&cli.config, args).await,
        Commands::Export(args) => export_command(&cli.config, args).await,
        Commands::Import(args) => import_command(&cli.config, args).await,
        Commands::Check => check_command(&cli.config).await,
    }
}

//! Headerchain CLI Application
//!
//! A command-line interface for validating and inspecting header chains.

use clap::{Parser, Subcommand};
use headerchain::cli::{self, AppState};
use headerchain::params::{Network, ParamsRegistry};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "headerchain")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "Header-chain validation and best-chain selection", long_about = None)]
struct Cli {
    /// Data directory for header storage
    #[arg(short, long, default_value = ".headerchain_data", global = true)]
    data_dir: PathBuf,

    /// Network to operate on (mainnet, testnet3, testnet2, regtest, unittest)
    #[arg(short, long, default_value = "mainnet", global = true)]
    network: Network,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the genesis header of the network
    Genesis,

    /// Import hex-encoded headers or blocks, one per line
    Import {
        /// File to read
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show the current chain head
    Info,

    /// Estimate when a block height will be reached
    Estimate {
        /// Target block height
        #[arg(long)]
        height: u64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let registry = ParamsRegistry::new();

    // Genesis doesn't need a store
    if let Commands::Genesis = cli.command {
        return cli::cmd_genesis(&registry, cli.network);
    }

    let state = AppState::new(&registry, &cli.data_dir, cli.network)?;

    match cli.command {
        Commands::Genesis => Ok(()),
        Commands::Import { file } => cli::cmd_import(&state, &file).map(|_| ()),
        Commands::Info => cli::cmd_info(&state),
        Commands::Estimate { height } => cli::cmd_estimate(&state, height),
    }
}

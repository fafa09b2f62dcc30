pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "marketingkreis-edge")]
#[command(author, version, about = "Edge layer CLI - forward MarketingKreis browser API calls to the backend")]
pub struct Cli {
    /// Path to config file (checked in order: local config.toml, ~/.config/marketingkreis-edge/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the edge server
    Start {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show edge server status
    Status,

    /// Print the effective configuration and resolved backend URL
    Config,
}

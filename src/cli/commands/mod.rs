mod config;
mod write;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::WriterConfig;

pub use write::WriteArgs;

#[derive(Parser)]
#[command(name = "safewrite")]
#[command(about = "Atomically replace files with validated output", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to ~/.safewrite/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write stdin to a file, replacing it only if the output passes its checks
    Write(WriteArgs),

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print a single config value
    Get { key: String },
    /// Print the default config file location
    Path,
}

impl Cli {
    pub fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Write(args) => write::run(args, self.load_config()?),
            Commands::Config { action } => match action {
                ConfigAction::Show => config::show(&self.load_config()?),
                ConfigAction::Get { key } => config::get(&self.load_config()?, key),
                ConfigAction::Path => config::path(),
            },
        }
    }

    fn load_config(&self) -> Result<WriterConfig> {
        match &self.config {
            Some(path) => WriterConfig::load(path),
            None => WriterConfig::load_default(),
        }
    }
}

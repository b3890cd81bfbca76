//! Command-line interface.

pub mod commands;
pub mod display;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::config::ConfigArgs;
use commands::run::RunArgs;

#[derive(Parser, Debug)]
#[command(name = "phylomatic")]
#[command(about = "Run MCMC chains per alignment until they converge", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file to load instead of .phylomatic/config.yaml
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run chains for each alignment until convergence or the generation limit
    Run(RunArgs),

    /// Inspect or persist configuration
    Config(ConfigArgs),
}

impl Cli {
    /// Dispatch the parsed command.
    pub async fn execute(self) -> anyhow::Result<()> {
        let config_path = self.config.as_deref();
        match self.command {
            Commands::Run(args) => commands::run::execute(args, config_path, self.json).await,
            Commands::Config(args) => commands::config::execute(args, config_path, self.json),
        }
    }
}

/// Print an error and exit with a failure status.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let chain: Vec<String> = err.chain().map(ToString::to_string).collect();
        let body = serde_json::json!({ "error": err.to_string(), "causes": chain });
        eprintln!("{body}");
    } else {
        eprintln!("{} {err:#}", console::style("error:").red().bold());
    }
    std::process::exit(1);
}

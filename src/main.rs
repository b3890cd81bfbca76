//! Phylomatic CLI entry point.

use clap::Parser;

use phylomatic::cli::{handle_error, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(err) = cli.execute().await {
        handle_error(err, json);
    }
}

use anyhow::Result;
use clap::Parser;

use wasteshed::cli::{Cli, Commands};
use wasteshed::commands;

fn main() -> Result<()> {
    let cli = Cli::parse();
    match &cli.command {
        Commands::Estimate(args) => commands::estimate(&cli, args),
    }
}

use anyhow::Result;
use clap::Parser;

use threadengine::cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.run()
}

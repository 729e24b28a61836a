use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::cli::Output;
use crate::config::RegistryConfig;

pub mod config;
pub mod counter;
pub mod handoff;
pub mod version;

#[derive(Parser)]
#[command(
    name = "threadengine",
    version = env!("CARGO_PKG_VERSION"),
    about = "Worker threads, locks and wait conditions, exercised end to end",
    long_about = "threadengine starts cancellable workers on native threads through a registry \
                  and coordinates them with locks and wait conditions. The subcommands run small \
                  demonstrations of each piece."
)]
pub struct Cli {
    /// Increase verbosity (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Use custom configuration file
    #[arg(long, global = true, env = "THREADENGINE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Increment a shared counter from many workers under one lock
    Counter(counter::CounterArgs),
    /// Hand a flag from a producer to a consumer over a wait condition
    Handoff(handoff::HandoffArgs),
    /// Configuration management
    Config(config::ConfigArgs),
    /// Show version information
    Version,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        // Set up logging based on verbosity
        setup_logging(self.verbose, self.quiet);

        let output = Output::new(self.verbose > 0, self.quiet);
        let config_path = self.config.as_deref();

        match self.command {
            Commands::Counter(args) => {
                let config = RegistryConfig::load_from(config_path)?;
                counter::execute(args, config, &output)
            }
            Commands::Handoff(args) => {
                let config = RegistryConfig::load_from(config_path)?;
                handoff::execute(args, config, &output)
            }
            Commands::Config(args) => config::execute(args, config_path, &output),
            Commands::Version => version::execute(&output),
        }
    }
}

fn setup_logging(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => tracing_subscriber::EnvFilter::new("warn"),
        1 => tracing_subscriber::EnvFilter::new("info"),
        2 => tracing_subscriber::EnvFilter::new("debug"),
        _ => tracing_subscriber::EnvFilter::new("trace"),
    });

    // Logs go to stderr so command output stays parseable
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .try_init();
}

//! CLI for gpuscope
//!
//! Diagnostic commands around the CUPTI core:
//! - catalogs: List the callback catalogs a profiler arms
//! - crc: Compute the CUPTI checksum of a cubin
//! - correlate: Map a PC offset in a cubin back to a source line
//! - config: Validate a PC sampling config file

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod backend;
mod commands;
mod output;

#[derive(Parser)]
#[command(name = "gpuscope")]
#[command(about = "gpuscope - CUPTI callback and PC sampling toolkit", long_about = None)]
#[command(version)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the CUPTI callback catalogs
    Catalogs(commands::catalogs::CatalogsArgs),

    /// Compute the CUPTI CRC of a cubin
    Crc(commands::crc::CrcArgs),

    /// Resolve a PC offset to a source location
    Correlate(commands::correlate::CorrelateArgs),

    /// Validate a PC sampling config file and print its attributes
    Config(commands::config::ConfigArgs),
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli.command) {
        output::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Catalogs(args) => commands::catalogs::run(args),
        Commands::Crc(args) => commands::crc::run(args),
        Commands::Correlate(args) => commands::correlate::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

//! CLI for smitrace
//!
//! Commands:
//! - record: sample one GPU at a fixed rate and write the samples on exit
//! - devices: list visible GPUs

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "smitrace")]
#[command(about = "smitrace - fixed-rate GPU telemetry sampler", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record GPU telemetry to a file
    Record(commands::record::RecordArgs),

    /// List visible GPUs
    Devices(commands::devices::DevicesArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Record(args) => {
            init_tracing(args.verbose);
            commands::record::run(args).await
        }
        Commands::Devices(args) => {
            init_tracing(args.verbose);
            commands::devices::run(args)
        }
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

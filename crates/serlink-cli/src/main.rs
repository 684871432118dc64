//! serlink CLI - topology validation and simulated bring-up for camera
//! serializer/deserializer links.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "serlink")]
#[command(author, version, about = "Camera serdes link control CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a topology file
    Validate(commands::validate::ValidateArgs),

    /// Run a simulated bring-up of a topology
    Bringup(commands::bringup::BringupArgs),

    /// List supported pixel formats
    Formats(commands::formats::FormatsArgs),

    /// Simulate the remote-device attach handshake for a topology
    Attach(commands::attach::AttachArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate(args) => commands::validate::run(args),
        Commands::Bringup(args) => commands::bringup::run(args),
        Commands::Formats(args) => commands::formats::run(args),
        Commands::Attach(args) => commands::attach::run(args),
    }
}

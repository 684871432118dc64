//! Topology file validation command.

use clap::Args;
use serlink_config::{Topology, validate};
use std::path::PathBuf;

#[derive(Args)]
pub struct ValidateArgs {
    /// Topology TOML file
    #[arg(value_name = "TOPOLOGY")]
    topology: PathBuf,
}

pub fn run(args: ValidateArgs) -> anyhow::Result<()> {
    let topology = Topology::load(&args.topology)?;
    validate(&topology)?;

    println!(
        "{}: ok ({} links, {} pipes, {} channels, {} phys)",
        args.topology.display(),
        topology.links.len(),
        topology.pipes.len(),
        topology.channels.len(),
        topology.phys.len(),
    );
    Ok(())
}

//! Simulated bring-up command.
//!
//! Loads a topology, validates it, and runs the full deserializer bring-up
//! sequence against the in-memory backend. Useful for checking what a board
//! description will program before going anywhere near hardware.

use clap::Args;
use serlink_config::{Topology, validate};
use serlink_core::{DesCaps, Deserializer, SimDes};
use std::path::PathBuf;

#[derive(Args)]
pub struct BringupArgs {
    /// Topology TOML file
    #[arg(value_name = "TOPOLOGY")]
    topology: PathBuf,

    /// Also enable stream 0 on every PHY a channel uses
    #[arg(long)]
    enable: bool,

    /// Print every hardware call the bring-up issued
    #[arg(long)]
    trace_calls: bool,
}

pub fn run(args: BringupArgs) -> anyhow::Result<()> {
    let topology = Topology::load(&args.topology)?;
    validate(&topology)?;
    let config = topology.to_des_config();

    let mut des = Deserializer::new(SimDes::new(DesCaps::default()), &config)?;
    des.init()?;

    if args.enable {
        let mut phys: Vec<usize> = des.channels().iter().map(|c| c.phy_id).collect();
        phys.sort_unstable();
        phys.dedup();
        for phy in phys {
            des.enable_phy_streams(phy, 0b1)?;
        }
    }

    print!("{}", des.status());

    if args.trace_calls {
        println!();
        for call in des.ops().calls() {
            println!("  {call}");
        }
    }

    println!("bring-up complete: {} hardware calls", des.ops().calls().len());
    Ok(())
}

//! Pixel-format table listing command.

use clap::Args;
use serlink_core::PixelFormat;

#[derive(Args)]
pub struct FormatsArgs {
    /// Show only formats the link can pixel-double
    #[arg(long)]
    dbl: bool,
}

pub fn run(args: FormatsArgs) -> anyhow::Result<()> {
    println!("Supported Pixel Formats");
    println!("=======================");
    println!();
    println!(
        "  {:10}  {:4}  {:>3}  {:3}  {}",
        "Name", "DT", "BPP", "DBL", "Remap entries"
    );
    println!(
        "  {:10}  {:4}  {:>3}  {:3}  {}",
        "----", "--", "---", "---", "-------------"
    );

    for info in PixelFormat::all() {
        if args.dbl && !info.dbl {
            continue;
        }
        println!(
            "  {:10}  0x{:02x}  {:>3}  {:3}  {}",
            format!("{:?}", info.format).to_lowercase(),
            info.data_type.code(),
            info.bpp,
            if info.dbl { "yes" } else { "no" },
            info.format.remap_entries(),
        );
    }

    Ok(())
}

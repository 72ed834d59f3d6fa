//! Plan command - Print the build order.

use anyhow::Result;
use clap::Args;

use super::GlobalArgs;

#[derive(Args)]
pub struct PlanArgs {
    /// Also list the declared outputs
    #[arg(long)]
    outputs: bool,
}

pub async fn execute(global: &GlobalArgs, args: &PlanArgs) -> Result<()> {
    let synthesis = global.synthesize()?;
    let manifest = &synthesis.manifest;

    print!("{}", manifest.plan());

    if args.outputs {
        println!();
        println!("Outputs:");
        for output in &manifest.outputs {
            println!(
                "   {:<22} {}.{}",
                output.name, output.source, output.attribute
            );
        }
    }

    Ok(())
}

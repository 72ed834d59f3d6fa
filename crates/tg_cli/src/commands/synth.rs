//! Synth command - Synthesize and write the manifest.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use tg_synth::{ManifestFormat, ManifestWriter};

use super::GlobalArgs;

#[derive(Args)]
pub struct SynthArgs {
    /// Write the manifest to this file instead of stdout
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Manifest format (json, yaml); inferred from --out when omitted
    #[arg(short, long)]
    format: Option<ManifestFormat>,
}

pub async fn execute(global: &GlobalArgs, args: &SynthArgs) -> Result<()> {
    let synthesis = global.synthesize()?;
    let manifest = &synthesis.manifest;

    match &args.out {
        Some(path) => {
            let format = args
                .format
                .unwrap_or_else(|| ManifestFormat::from_path(path));
            ManifestWriter::write(manifest, path, format)
                .with_context(|| format!("Failed to write manifest to {}", path.display()))?;
            info!("Wrote {} manifest to {}", format, path.display());
            eprintln!(
                "Synthesized {} ({} resources, {} outputs) -> {}",
                manifest.project,
                manifest.nodes.len(),
                manifest.outputs.len(),
                path.display()
            );
        }
        None => {
            let rendered = ManifestWriter::render(manifest, args.format.unwrap_or_default())
                .context("Failed to render manifest")?;
            print!("{}", rendered);
        }
    }

    Ok(())
}

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use protoplain_crf::CollisionTracker;
use protoplain_layout::{LayoutOptions, Manifest};

#[derive(Subcommand)]
pub enum LayoutCommands {
    /// Plan a JSON manifest and print the generated descriptor constant.
    Render {
        manifest: PathBuf,
        /// Claim the manifest's field names in the ledger sidecar.
        #[arg(long)]
        track: bool,
    },
}

pub fn cmd_layout(command: LayoutCommands, sidecar: &Path, options: &LayoutOptions) -> Result<()> {
    match command {
        LayoutCommands::Render { manifest, track } => {
            let manifest = read_manifest(&manifest)?;
            print!("{}", render(manifest, track.then_some(sidecar), options)?);
            Ok(())
        }
    }
}

pub fn read_manifest(path: &Path) -> Result<Manifest> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid manifest {}", path.display()))
}

/// Plan and render; with a sidecar, names are claimed and the ledger is
/// written back only when the whole manifest plans cleanly.
pub fn render(manifest: Manifest, sidecar: Option<&Path>, options: &LayoutOptions) -> Result<String> {
    let type_name = manifest.type_name.clone();
    let layout = match sidecar {
        Some(path) => {
            let tracker = CollisionTracker::load(path)
                .with_context(|| format!("failed to load ledger {}", path.display()))?;
            let layout = manifest
                .plan(Some(&tracker))
                .with_context(|| format!("failed to plan {type_name}"))?;
            tracker
                .persist(path)
                .with_context(|| format!("failed to write ledger {}", path.display()))?;
            layout
        }
        None => manifest
            .plan(None)
            .with_context(|| format!("failed to plan {type_name}"))?,
    };
    tracing::info!(type_name = %type_name, "rendered layout");
    Ok(layout.render_static(options))
}

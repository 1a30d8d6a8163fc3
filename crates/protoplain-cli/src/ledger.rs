//! `protoplain crf ...`: inspect and extend the collision ledger sidecar.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use protoplain_crf::{CollisionTracker, Registration};

#[derive(Subcommand)]
pub enum CrfCommands {
    /// Print every recorded field name with its sources.
    Show,

    /// Fail if the field name is already claimed.
    Check { field: String },

    /// Claim a field name for a source and persist the ledger.
    Record { field: String, source: String },
}

pub fn cmd_crf(command: CrfCommands, sidecar: &Path) -> Result<()> {
    let tracker = CollisionTracker::load(sidecar)
        .with_context(|| format!("failed to load ledger {}", sidecar.display()))?;

    match command {
        CrfCommands::Show => {
            let ledger = tracker.into_ledger();
            if !ledger.has_entries() {
                println!("{}", "(empty ledger)".dimmed());
            }
            for entry in &ledger.entries {
                println!("{} {}", entry.field.bold(), entry.source_paths().join(", "));
            }
            Ok(())
        }
        CrfCommands::Check { field } => {
            if let Some(collision) = tracker.error_for(&field) {
                return Err(collision.into());
            }
            println!("{} {field}", "free".green());
            Ok(())
        }
        CrfCommands::Record { field, source } => {
            match tracker.check_and_record(&field, &source)? {
                Registration::New => {
                    tracker
                        .persist(sidecar)
                        .with_context(|| format!("failed to write ledger {}", sidecar.display()))?;
                    println!("{} {field} <- {source}", "recorded".green());
                }
                Registration::AlreadyRecorded => {
                    println!("{} {field} <- {source}", "unchanged".cyan());
                }
                Registration::Ignored => {
                    tracing::warn!("empty field name, nothing recorded");
                }
            }
            Ok(())
        }
    }
}

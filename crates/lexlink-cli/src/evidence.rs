//! # Evidence Subcommand
//!
//! Recomputes the evidence hash of a JSON document exactly as the
//! finalization saga does: canonical serialization, then SHA-256. Also
//! computes compliance scores from their inputs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use lexlink_core::{sha256_hex, CanonicalBytes};
use lexlink_state::ComplianceInputs;

#[derive(Args, Debug)]
pub struct EvidenceArgs {
    #[command(subcommand)]
    pub command: EvidenceCommand,
}

#[derive(Subcommand, Debug)]
pub enum EvidenceCommand {
    /// Canonical SHA-256 of a JSON file.
    Hash {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Also print the canonical bytes.
        #[arg(long)]
        show_canonical: bool,
    },

    /// Compliance score for the given evidence flags.
    Score {
        #[arg(long)]
        payment: bool,
        #[arg(long)]
        license_token: bool,
        #[arg(long)]
        anchor_ok: bool,
        #[arg(long)]
        archive: bool,
        #[arg(long, default_value_t = 0)]
        training_units: u64,
    },
}

pub fn run_evidence(args: &EvidenceArgs) -> Result<u8> {
    match &args.command {
        EvidenceCommand::Hash {
            file,
            show_canonical,
        } => {
            let (canonical, hash) = hash_file(file)?;
            if *show_canonical {
                println!("{}", String::from_utf8_lossy(canonical.as_bytes()));
            }
            println!("{hash}");
            Ok(0)
        }
        EvidenceCommand::Score {
            payment,
            license_token,
            anchor_ok,
            archive,
            training_units,
        } => {
            let inputs = ComplianceInputs {
                has_payment: *payment,
                has_license_token: *license_token,
                anchor_ok: *anchor_ok,
                has_archive: *archive,
                training_units: *training_units,
            };
            println!("{}", inputs.score());
            Ok(0)
        }
    }
}

fn hash_file(path: &Path) -> Result<(CanonicalBytes, String)> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let canonical = CanonicalBytes::from_json_str(&text)
        .with_context(|| format!("{} is not canonicalizable JSON", path.display()))?;
    let hash = sha256_hex(&canonical);
    Ok((canonical, hash))
}

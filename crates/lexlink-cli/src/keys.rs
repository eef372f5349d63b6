//! # Keys Subcommand
//!
//! Ed25519 seed generation for the service's credential issuer, and
//! offline verification of a `LexLinkLicenseCredential`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use rand::RngCore;

use lexlink_vc::{Ed25519KeyPair, Ed25519PublicKey, LicenseCredential};

#[derive(Args, Debug)]
pub struct KeysArgs {
    #[command(subcommand)]
    pub command: KeysCommand,
}

#[derive(Subcommand, Debug)]
pub enum KeysCommand {
    /// Generate a signing seed for LEXLINK_SIGNING_KEY_HEX.
    Keygen {
        #[arg(long, short, default_value = ".")]
        output: PathBuf,
        #[arg(long, default_value = "lexlink")]
        prefix: String,
    },

    /// Print the public key and issuer DID for a seed.
    Show {
        /// Hex seed; defaults to LEXLINK_SIGNING_KEY_HEX.
        #[arg(long, env = "LEXLINK_SIGNING_KEY_HEX", hide_env_values = true)]
        seed: String,
    },

    /// Verify the proof on an issued license credential.
    VerifyCredential {
        /// Issuer public key (64 hex characters).
        #[arg(long)]
        pubkey: String,
        /// Credential JSON. A finalized order's `vc_document`.
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

pub fn run_keys(args: &KeysArgs) -> Result<u8> {
    match &args.command {
        KeysCommand::Keygen { output, prefix } => cmd_keygen(output, prefix),
        KeysCommand::Show { seed } => cmd_show(seed),
        KeysCommand::VerifyCredential { pubkey, file } => cmd_verify(pubkey, file),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn cmd_keygen(output_dir: &Path, prefix: &str) -> Result<u8> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output directory: {}", output_dir.display()))?;

    let mut seed = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut seed);
    let key = Ed25519KeyPair::from_seed(&seed);
    let seed_hex = hex(&seed);
    let pub_hex = key.public_key().to_hex();

    let seed_path = output_dir.join(format!("{prefix}.seed"));
    let pub_path = output_dir.join(format!("{prefix}.pub"));
    std::fs::write(&seed_path, &seed_hex)
        .with_context(|| format!("failed to write seed: {}", seed_path.display()))?;
    std::fs::write(&pub_path, &pub_hex)
        .with_context(|| format!("failed to write public key: {}", pub_path.display()))?;

    println!("OK: generated Ed25519 signing seed");
    println!("  Seed:        {}", seed_path.display());
    println!("  Public key:  {}", pub_path.display());
    println!("  Public key (hex): {pub_hex}");
    Ok(0)
}

fn cmd_show(seed: &str) -> Result<u8> {
    let key = Ed25519KeyPair::from_seed_hex(seed.trim()).context("invalid seed")?;
    let issuer = lexlink_vc::LocalCredentialIssuer::new(key);
    println!("public key: {}", issuer.public_key().to_hex());
    println!("issuer:     {}", issuer.issuer());
    Ok(0)
}

fn cmd_verify(pubkey: &str, file: &Path) -> Result<u8> {
    if !file.exists() {
        bail!("credential file not found: {}", file.display());
    }
    let public_key = Ed25519PublicKey::from_hex(pubkey.trim()).context("invalid public key")?;
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read credential: {}", file.display()))?;
    let credential: LicenseCredential =
        serde_json::from_str(&text).context("file is not a license credential")?;

    match credential.verify(&public_key) {
        Ok(()) => {
            println!("OK: credential {} verified", credential.id);
            println!("  hash: {}", credential.document_hash()?);
            Ok(0)
        }
        Err(e) => {
            println!("FAIL: {e}");
            Ok(1)
        }
    }
}

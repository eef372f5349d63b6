//! # lexlink CLI entry point
//!
//! Parses arguments and dispatches to the subcommand handlers in the
//! library crate.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lexlink_cli::escrow::{run_escrow, EscrowArgs};
use lexlink_cli::evidence::{run_evidence, EvidenceArgs};
use lexlink_cli::keys::{run_keys, KeysArgs};
use lexlink_cli::ops::{run_ops, OpsArgs};

/// LexLink operator tooling.
#[derive(Parser, Debug)]
#[command(name = "lexlink", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Credential signing keys and credential verification.
    Keys(KeysArgs),

    /// ckBTC escrow subaccounts.
    Escrow(EscrowArgs),

    /// Evidence hashing and compliance scores.
    Evidence(EvidenceArgs),

    /// Config check, one-shot funding poll, audit chain verification.
    Ops(OpsArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Keys(args) => run_keys(&args),
        Commands::Escrow(args) => run_escrow(&args),
        Commands::Evidence(args) => run_evidence(&args),
        Commands::Ops(args) => run_ops(&args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

//! # lexlink-cli: Operator CLI for LexLink
//!
//! ## Subcommands
//!
//! - `lexlink keys`: credential signing keys, and verification of issued
//!   license credentials.
//! - `lexlink escrow`: derive the ckBTC escrow subaccount of an order.
//! - `lexlink evidence`: canonical SHA-256 of a JSON evidence document,
//!   and compliance scores.
//! - `lexlink ops`: configuration check, a single funding poll, and audit
//!   hash chain verification against the configured store.
//!
//! Every handler returns an exit code; errors are reported by `main`.

pub mod escrow;
pub mod evidence;
pub mod keys;
pub mod ops;

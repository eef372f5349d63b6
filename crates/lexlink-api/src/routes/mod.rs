//! # API Route Modules
//!
//! - `orders`: order creation, lookup and the finalization trigger.
//! - `ip_assets`: registration, per-asset orders, training batches.
//! - `disputes`: raise, respond, resolve.
//! - `poll`: one funding poll run on demand.
//! - `audit`: per-resource history and hash chain verification.

pub mod audit;
pub mod disputes;
pub mod ip_assets;
pub mod orders;
pub mod poll;

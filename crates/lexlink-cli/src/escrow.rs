//! Escrow subaccount derivation for `ckbtc` orders.

use anyhow::Result;
use clap::{Args, Subcommand};

use lexlink_core::OrderId;
use lexlink_state::{EscrowTarget, Subaccount};

#[derive(Args, Debug)]
pub struct EscrowArgs {
    #[command(subcommand)]
    pub command: EscrowCommand,
}

#[derive(Subcommand, Debug)]
pub enum EscrowCommand {
    /// Print the escrow subaccount derived from an order id.
    Subaccount {
        order_id: String,
        /// Ledger account owning the escrow subaccounts.
        #[arg(long, env = "LEXLINK_CKBTC_ESCROW_OWNER", default_value = "lexlink-escrow")]
        owner: String,
    },
}

pub fn run_escrow(args: &EscrowArgs) -> Result<u8> {
    match &args.command {
        EscrowCommand::Subaccount { order_id, owner } => {
            let target = escrow_for(order_id, owner)?;
            if let EscrowTarget::Ckbtc { subaccount, .. } = &target {
                println!("subaccount: {}", subaccount.to_hex());
            }
            println!("escrow:     {}", target.render());
            Ok(0)
        }
    }
}

fn escrow_for(order_id: &str, owner: &str) -> Result<EscrowTarget> {
    let order_id = OrderId::new(order_id)?;
    Ok(EscrowTarget::Ckbtc {
        owner: owner.to_string(),
        subaccount: Subaccount::derive(&order_id),
    })
}

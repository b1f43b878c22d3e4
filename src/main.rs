//! Points Ledger CLI
//!
//! Replays agent deposits and payment callbacks against a seeded ledger.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- --accounts companies.csv --agents agents.csv operations.csv > balances.csv
//! cargo run -- --accounts companies.csv --agents agents.csv --invoices invoices.csv \
//!     --ledger ledger.csv operations.csv > balances.csv
//! cargo run -- --accounts companies.csv --agents agents.csv --points-per-kg 12 \
//!     --batch-size 2000 --max-concurrent 8 operations.csv > balances.csv
//! ```
//!
//! The final balances go to stdout; logs go to stderr, filtered by
//! `POINTS_LEDGER_LOG` (default `info`).
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (missing arguments, file not found, file not readable, etc.)

use points_ledger::{bootstrap, cli, replay};
use std::process;

fn main() {
    bootstrap::init_tracing();

    let args = cli::parse_args();

    let mut output = std::io::stdout();
    if let Err(e) = replay::replay(
        &args.to_replay_inputs(),
        args.gateway,
        &args.to_ledger_config(),
        &args.to_replay_config(),
        &mut output,
    ) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

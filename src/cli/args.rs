use crate::config::{LedgerConfig, ReplayConfig, RetryPolicy};
use crate::replay::ReplayInputs;
use clap::{Parser, ValueEnum};
use rust_decimal::Decimal;
use std::path::PathBuf;

/// Replay deposits and payment callbacks against a seeded points ledger
#[derive(Parser, Debug)]
#[command(name = "points-ledger")]
#[command(
    about = "Replay deposits and payment callbacks against a seeded points ledger",
    long_about = None
)]
pub struct CliArgs {
    /// Operations CSV file (op,token,user,weight,reference)
    #[arg(value_name = "OPERATIONS", help = "Path to the operations CSV file")]
    pub operations_file: PathBuf,

    /// Company seeds (company,points)
    #[arg(long = "accounts", value_name = "CSV")]
    pub accounts_file: PathBuf,

    /// Agent identity bindings (token,agent,company)
    #[arg(long = "agents", value_name = "CSV")]
    pub agents_file: PathBuf,

    /// Invoices known to the simulated gateway (token,company,amount,status)
    #[arg(long = "invoices", value_name = "CSV")]
    pub invoices_file: Option<PathBuf>,

    /// Write the ledger entries to this file
    #[arg(long = "ledger", value_name = "PATH")]
    pub ledger_file: Option<PathBuf>,

    /// Payment gateway used to verify callbacks
    #[arg(
        long = "gateway",
        value_name = "GATEWAY",
        default_value = "simulated",
        help = "Payment gateway: 'simulated' (in-memory invoices) or 'paydunya' (HTTP, configured from the environment)"
    )]
    pub gateway: GatewayKind,

    /// Points credited per kilogram deposited
    #[arg(
        long = "points-per-kg",
        value_name = "RATE",
        help = "Points credited per kilogram deposited (default: 10)"
    )]
    pub points_per_kg: Option<Decimal>,

    /// Points credited per unit of paid currency
    #[arg(
        long = "points-per-currency-unit",
        value_name = "RATE",
        help = "Points credited per unit of paid currency (default: 1)"
    )]
    pub points_per_currency_unit: Option<Decimal>,

    /// Attempts per store transaction before giving up
    #[arg(
        long = "max-attempts",
        value_name = "COUNT",
        help = "Attempts per store transaction under contention (default: 5)"
    )]
    pub max_attempts: Option<u32>,

    /// Number of operations per batch
    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Number of operations per batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    /// Maximum number of operations in flight
    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        help = "Maximum number of operations running concurrently (default: CPU cores)"
    )]
    pub max_concurrent: Option<usize>,
}

/// Available payment gateways
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum GatewayKind {
    Simulated,
    Paydunya,
}

impl CliArgs {
    /// Files named on the command line
    pub fn to_replay_inputs(&self) -> ReplayInputs {
        ReplayInputs {
            accounts: self.accounts_file.clone(),
            agents: self.agents_file.clone(),
            invoices: self.invoices_file.clone(),
            operations: self.operations_file.clone(),
            ledger: self.ledger_file.clone(),
        }
    }

    /// Create a LedgerConfig from CLI arguments, falling back to defaults
    pub fn to_ledger_config(&self) -> LedgerConfig {
        let default = LedgerConfig::default();
        let retry = match self.max_attempts {
            Some(max_attempts) => RetryPolicy::new(
                max_attempts,
                default.retry.initial_delay,
                default.retry.max_delay,
            ),
            None => default.retry.clone(),
        };

        LedgerConfig::new(
            self.points_per_kg.unwrap_or(default.points_per_kg),
            self.points_per_currency_unit
                .unwrap_or(default.points_per_currency_unit),
            retry,
        )
    }

    /// Create a ReplayConfig from CLI arguments
    pub fn to_replay_config(&self) -> ReplayConfig {
        if self.batch_size.is_some() || self.max_concurrent.is_some() {
            let default = ReplayConfig::default();
            ReplayConfig::new(
                self.batch_size.unwrap_or(default.batch_size),
                self.max_concurrent.unwrap_or(default.max_concurrent),
            )
        } else {
            ReplayConfig::default()
        }
    }
}

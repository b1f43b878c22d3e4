//! Replay of an operations file against a freshly seeded ledger
//!
//! This is the pipeline behind the command-line front end:
//!
//! ```text
//! seed CSVs ──SyncReader──► AppContext (store, identity, gateway)
//!                                 │
//! operations CSV ──AsyncReader──► batches ──► bounded concurrent tasks
//!                                 │
//!                                 ▼
//!                 balances CSV (stdout) + optional ledger CSV
//! ```
//!
//! Batches are read one after another. Inside a batch, operations run
//! concurrently on a multi-threaded tokio runtime, at most `max_concurrent`
//! at a time, so their relative order is not preserved. A failing operation
//! is logged and skipped; only I/O and setup failures abort the replay.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{error, info, warn};

use crate::bootstrap::AppContext;
use crate::cli::GatewayKind;
use crate::config::{LedgerConfig, PaydunyaConfig, ReplayConfig};
use crate::gateway::{PaydunyaGateway, PaymentGateway, SimulatedGateway};
use crate::identity::StaticIdentityProvider;
use crate::io::{
    convert_invoice_record, read_all, write_balances_csv, write_ledger_csv, AgentRecord,
    AsyncReader, InvoiceRecord, Operation, SeedRecord,
};
use crate::types::{CallerIdentity, LedgerError};

/// Files taking part in a replay
#[derive(Debug, Clone)]
pub struct ReplayInputs {
    /// Company seeds: `company,points`
    pub accounts: PathBuf,
    /// Agent bindings: `token,agent,company`
    pub agents: PathBuf,
    /// Simulated gateway invoices: `token,company,amount,status`
    pub invoices: Option<PathBuf>,
    /// Operations: `op,token,user,weight,reference`
    pub operations: PathBuf,
    /// Where to write the ledger, if anywhere
    pub ledger: Option<PathBuf>,
}

/// Counts of what a replay did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub deposits_applied: usize,
    pub deposits_replayed: usize,
    pub deposits_rejected: usize,
    pub callbacks_acknowledged: usize,
}

enum OperationResult {
    DepositApplied,
    DepositReplayed,
    DepositRejected,
    CallbackAcknowledged,
}

impl ReplaySummary {
    fn record(&mut self, result: OperationResult) {
        match result {
            OperationResult::DepositApplied => self.deposits_applied += 1,
            OperationResult::DepositReplayed => self.deposits_replayed += 1,
            OperationResult::DepositRejected => self.deposits_rejected += 1,
            OperationResult::CallbackAcknowledged => self.callbacks_acknowledged += 1,
        }
    }
}

/// Replay `inputs` and write the final balances to `output`
///
/// # Returns
///
/// * `Ok(ReplaySummary)` - every operation was attempted
/// * `Err(LedgerError)` - a file could not be opened or written, the gateway
///   could not be configured, or the runtime failed to start
pub fn replay(
    inputs: &ReplayInputs,
    gateway_kind: GatewayKind,
    ledger_config: &LedgerConfig,
    replay_config: &ReplayConfig,
    output: &mut dyn Write,
) -> Result<ReplaySummary, LedgerError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(replay_config.max_concurrent)
        .enable_all()
        .build()
        .map_err(|e| LedgerError::internal(format!("Failed to create tokio runtime: {}", e)))?;

    runtime.block_on(async {
        let ctx = Arc::new(seed_context(inputs, gateway_kind, ledger_config)?);

        let file = tokio::fs::File::open(&inputs.operations)
            .await
            .map_err(|e| open_error(&inputs.operations, e))?;
        let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
        let mut reader = AsyncReader::new(compat_file);

        let mut summary = ReplaySummary::default();
        loop {
            let batch = reader.read_batch(replay_config.batch_size).await;
            if batch.is_empty() {
                break;
            }

            let mut results = stream::iter(batch)
                .map(|operation| {
                    let ctx = Arc::clone(&ctx);
                    tokio::spawn(async move { apply(&ctx, operation).await })
                })
                .buffer_unordered(replay_config.max_concurrent);

            while let Some(joined) = results.next().await {
                match joined {
                    Ok(result) => summary.record(result),
                    Err(e) => error!("operation task failed: {}", e),
                }
            }
        }

        write_balances_csv(&ctx.store.companies(), &ctx.store.users(), output)?;

        if let Some(path) = &inputs.ledger {
            let file = File::create(path).map_err(|e| open_error(path, e))?;
            let mut writer = BufWriter::new(file);
            write_ledger_csv(&ctx.store.log().entries(), &mut writer)?;
            writer.flush()?;
        }

        info!(
            applied = summary.deposits_applied,
            replayed = summary.deposits_replayed,
            rejected = summary.deposits_rejected,
            callbacks = summary.callbacks_acknowledged,
            ledger_entries = ctx.store.log().len(),
            "replay finished"
        );
        Ok(summary)
    })
}

/// Build the context and load every seed file into it
fn seed_context(
    inputs: &ReplayInputs,
    gateway_kind: GatewayKind,
    ledger_config: &LedgerConfig,
) -> Result<AppContext, LedgerError> {
    let identity: StaticIdentityProvider = read_all::<AgentRecord>(&inputs.agents)?
        .into_iter()
        .map(CallerIdentity::from)
        .collect();
    info!(agents = identity.len(), "agents loaded");

    let gateway = build_gateway(gateway_kind, inputs.invoices.as_deref())?;
    let ctx = AppContext::new(ledger_config, Arc::new(identity), gateway);

    for seed in read_all::<SeedRecord>(&inputs.accounts)? {
        if let Err(e) = ctx.store.provision_company(&seed.company, seed.points) {
            warn!(company_id = %seed.company, "skipping company seed: {}", e);
        }
    }
    info!(companies = ctx.store.companies().len(), "companies provisioned");

    Ok(ctx)
}

fn build_gateway(
    kind: GatewayKind,
    invoices: Option<&Path>,
) -> Result<Arc<dyn PaymentGateway>, LedgerError> {
    match kind {
        GatewayKind::Simulated => {
            let gateway = SimulatedGateway::default();
            if let Some(path) = invoices {
                for record in read_all::<InvoiceRecord>(path)? {
                    match convert_invoice_record(record) {
                        Ok(invoice) => gateway.insert_invoice(
                            &invoice.token,
                            invoice.company_id.as_deref(),
                            invoice.amount,
                            invoice.status,
                        ),
                        Err(e) => warn!("skipping invoice: {}", e),
                    }
                }
            }
            Ok(Arc::new(gateway))
        }
        GatewayKind::Paydunya => {
            if invoices.is_some() {
                warn!("--invoices is ignored with the paydunya gateway");
            }
            let config =
                PaydunyaConfig::from_env().map_err(|e| LedgerError::internal(e.to_string()))?;
            Ok(Arc::new(PaydunyaGateway::new(config)))
        }
    }
}

async fn apply(ctx: &AppContext, operation: Operation) -> OperationResult {
    match operation {
        Operation::Deposit { token, request } => {
            match ctx.deposits.validate_deposit(&token, request).await {
                Ok(receipt) if receipt.replayed => OperationResult::DepositReplayed,
                Ok(_) => OperationResult::DepositApplied,
                // The service already logged the rejection
                Err(_) => OperationResult::DepositRejected,
            }
        }
        Operation::Callback { invoice_token } => {
            let body = serde_json::json!({ "invoice_token": invoice_token }).to_string();
            ctx.recharges.handle_callback(body.as_bytes()).await;
            OperationResult::CallbackAcknowledged
        }
    }
}

fn open_error(path: &Path, error: std::io::Error) -> LedgerError {
    match error.kind() {
        std::io::ErrorKind::NotFound => LedgerError::FileNotFound {
            path: path.display().to_string(),
        },
        _ => LedgerError::IoError {
            message: format!("Failed to open file '{}': {}", path.display(), error),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::{NamedTempFile, TempDir};

    /// Helper function to create a temporary CSV file for testing
    fn create_temp_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    struct Files {
        accounts: NamedTempFile,
        agents: NamedTempFile,
        invoices: NamedTempFile,
        operations: NamedTempFile,
    }

    impl Files {
        fn inputs(&self) -> ReplayInputs {
            ReplayInputs {
                accounts: self.accounts.path().to_path_buf(),
                agents: self.agents.path().to_path_buf(),
                invoices: Some(self.invoices.path().to_path_buf()),
                operations: self.operations.path().to_path_buf(),
                ledger: None,
            }
        }
    }

    fn files(operations: &str) -> Files {
        Files {
            accounts: create_temp_csv("company,points\nC1,100\nC2,0\n"),
            agents: create_temp_csv("token,agent,company\ntok-1,agent-1,C1\ntok-2,agent-2,C2\n"),
            invoices: create_temp_csv(
                "token,company,amount,status\ninv-1,C2,500,completed\ninv-2,C2,900,pending\n",
            ),
            operations: create_temp_csv(&format!("op,token,user,weight,reference\n{}", operations)),
        }
    }

    fn ledger_config() -> LedgerConfig {
        LedgerConfig {
            retry: RetryPolicy::new(100, Duration::from_micros(50), Duration::from_millis(2)),
            ..LedgerConfig::default()
        }
    }

    fn run(inputs: &ReplayInputs, replay_config: ReplayConfig) -> (ReplaySummary, String) {
        let mut output = Vec::new();
        let summary = replay(
            inputs,
            GatewayKind::Simulated,
            &ledger_config(),
            &replay_config,
            &mut output,
        )
        .unwrap();
        (summary, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_replay_deposits_and_callbacks() {
        let files = files(
            "deposit,tok-1,U1,3,\n\
             callback,inv-1,,,\n\
             callback,inv-2,,,\n\
             deposit,tok-1,U2,2.55,\n",
        );

        let (summary, output) = run(&files.inputs(), ReplayConfig::default());

        assert_eq!(
            output,
            "kind,id,points\ncompany,C1,45\ncompany,C2,500\nuser,U1,30\nuser,U2,25\n"
        );
        assert_eq!(summary.deposits_applied, 2);
        assert_eq!(summary.callbacks_acknowledged, 2);
    }

    #[test]
    fn test_replay_rejections_are_skipped() {
        let files = files(
            "deposit,tok-unknown,U1,1,\n\
             deposit,tok-2,U1,1,\n\
             deposit,tok-1,U1,0,\n\
             deposit,tok-1,U1,1,req-1\n\
             deposit,tok-1,U1,1,req-1\n",
        );

        // One at a time, so the repeated reference is seen as a replay
        let (summary, output) = run(&files.inputs(), ReplayConfig::new(1, 1));

        assert_eq!(
            output,
            "kind,id,points\ncompany,C1,90\ncompany,C2,0\nuser,U1,10\n"
        );
        assert_eq!(
            summary,
            ReplaySummary {
                deposits_applied: 1,
                deposits_replayed: 1,
                deposits_rejected: 3,
                callbacks_acknowledged: 0,
            }
        );
    }

    #[test]
    fn test_replay_small_batches() {
        let rows: String = (0..50).map(|i| format!("deposit,tok-1,U{},0.2,\n", i % 5)).collect();
        let files = files(&rows);

        let (summary, output) = run(&files.inputs(), ReplayConfig::new(7, 4));

        assert_eq!(summary.deposits_applied, 50);
        assert!(output.contains("company,C1,0\n"));
        assert!(output.contains("user,U0,20\n"));
        assert!(output.contains("user,U4,20\n"));
    }

    #[test]
    fn test_replay_writes_ledger() {
        let files = files("deposit,tok-1,U1,1,req-7\ncallback,inv-1,,,\n");
        let dir = TempDir::new().unwrap();
        let ledger_path = dir.path().join("ledger.csv");
        let inputs = ReplayInputs {
            ledger: Some(ledger_path.clone()),
            ..files.inputs()
        };

        run(&inputs, ReplayConfig::new(1, 1));

        let ledger = std::fs::read_to_string(ledger_path).unwrap();
        let lines: Vec<&str> = ledger.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("id,type,source,destination,amount,reference"));
        assert!(lines[1].contains(",CREDIT_USER,company:C1,user:U1,10,req-7,"));
        assert!(lines[2].contains(",RECHARGE_COMPANY,external:simulated,company:C2,500,inv-1,"));
    }

    #[test]
    fn test_replay_missing_operations_file() {
        let files = files("");
        let inputs = ReplayInputs {
            operations: PathBuf::from("nonexistent.csv"),
            ..files.inputs()
        };

        let result = replay(
            &inputs,
            GatewayKind::Simulated,
            &LedgerConfig::default(),
            &ReplayConfig::default(),
            &mut Vec::new(),
        );

        assert!(matches!(result, Err(LedgerError::FileNotFound { .. })));
    }

    #[test]
    fn test_replay_missing_seed_file() {
        let files = files("");
        let inputs = ReplayInputs {
            accounts: PathBuf::from("nonexistent.csv"),
            ..files.inputs()
        };

        let result = replay(
            &inputs,
            GatewayKind::Simulated,
            &LedgerConfig::default(),
            &ReplayConfig::default(),
            &mut Vec::new(),
        );

        assert!(matches!(result, Err(LedgerError::FileNotFound { .. })));
    }
}

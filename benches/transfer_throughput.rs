//! Benchmark suite for the transfer engine
//!
//! Measures how many company → user transfers the engine commits when the
//! transfers touch distinct companies (no conflicts) and when they all
//! debit the same company (every commit races the others).
//!
//! # Running Benchmarks
//!
//! ```bash
//! cargo bench
//! ```

use points_ledger::types::{Auxiliary, TransferRequest};
use points_ledger::{AccountStore, CallerIdentity, RetryPolicy, TransferEngine};
use std::sync::Arc;
use std::time::Duration;

fn main() {
    divan::main();
}

const TRANSFERS: usize = 1_000;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime")
}

fn engine_with_companies(companies: usize) -> TransferEngine {
    let store = Arc::new(AccountStore::new(RetryPolicy::new(
        10_000,
        Duration::from_micros(10),
        Duration::from_millis(1),
    )));
    for i in 0..companies {
        store
            .provision_company(&format!("C{}", i), TRANSFERS as u64)
            .expect("Failed to provision company");
    }
    TransferEngine::new(store)
}

fn run_transfers(engine: &TransferEngine, companies: usize, runtime: &tokio::runtime::Runtime) {
    runtime.block_on(async {
        let handles: Vec<_> = (0..TRANSFERS)
            .map(|i| {
                let engine = engine.clone();
                let company = format!("C{}", i % companies);
                tokio::spawn(async move {
                    let agent = CallerIdentity::agent("bench-token", "bench-agent", company.clone());
                    engine
                        .transfer_company_to_user(
                            TransferRequest {
                                company_id: company,
                                user_id: format!("U{}", i),
                                amount: 1,
                                auxiliary: Auxiliary::None,
                                reference: None,
                            },
                            &agent,
                        )
                        .await
                })
            })
            .collect();

        for handle in handles {
            handle
                .await
                .expect("Transfer task panicked")
                .expect("Transfer failed");
        }
    });
}

/// 1,000 transfers spread over 1,000 companies
#[divan::bench]
fn uncontended_transfers(bencher: divan::Bencher) {
    let runtime = runtime();
    bencher
        .with_inputs(|| engine_with_companies(TRANSFERS))
        .bench_local_values(|engine| run_transfers(&engine, TRANSFERS, &runtime));
}

/// 1,000 transfers all debiting the same company
#[divan::bench]
fn contended_transfers(bencher: divan::Bencher) {
    let runtime = runtime();
    bencher
        .with_inputs(|| engine_with_companies(1))
        .bench_local_values(|engine| run_transfers(&engine, 1, &runtime));
}

/// Sequential transfers from a single task, no concurrency at all
#[divan::bench]
fn sequential_transfers(bencher: divan::Bencher) {
    let runtime = runtime();
    bencher
        .with_inputs(|| engine_with_companies(1))
        .bench_local_values(|engine| {
            runtime.block_on(async {
                let agent = CallerIdentity::agent("bench-token", "bench-agent", "C0");
                for i in 0..TRANSFERS {
                    engine
                        .transfer_company_to_user(
                            TransferRequest {
                                company_id: "C0".to_string(),
                                user_id: format!("U{}", i % 10),
                                amount: 1,
                                auxiliary: Auxiliary::None,
                                reference: None,
                            },
                            &agent,
                        )
                        .await
                        .expect("Transfer failed");
                }
            })
        });
}

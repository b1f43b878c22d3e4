//! Ledger property tests
//!
//! Whole-ledger guarantees checked through the public API: conservation of
//! points, atomic rejection, behaviour under contention and at-most-once
//! recharge crediting.

use points_ledger::core::StoreSnapshot;
use points_ledger::gateway::{InvoiceStatus, SimulatedGateway};
use points_ledger::services::{points_for_weight, ReconcileOutcome};
use points_ledger::types::{Auxiliary, EntryType, RechargeRequest, TransferRequest};
use points_ledger::{
    AccountStore, CallerIdentity, LedgerError, Points, Posting, RechargeReconciliationService,
    RetryPolicy, TransferEngine,
};
use rstest::rstest;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

fn agent() -> CallerIdentity {
    CallerIdentity::agent("tok-agent", "agent-1", "C1")
}

fn transfer(company: &str, user: &str, amount: Points) -> TransferRequest {
    TransferRequest {
        company_id: company.to_string(),
        user_id: user.to_string(),
        amount,
        auxiliary: Auxiliary::None,
        reference: None,
    }
}

/// Store that keeps retrying under heavy contention
fn contended_store() -> Arc<AccountStore> {
    Arc::new(AccountStore::new(RetryPolicy::new(
        10_000,
        Duration::from_micros(20),
        Duration::from_millis(1),
    )))
}

fn balances(snapshot: &StoreSnapshot) -> Vec<(String, Points)> {
    snapshot
        .companies
        .iter()
        .map(|c| (format!("company:{}", c.company_id), c.current_points))
        .chain(
            snapshot
                .users
                .iter()
                .map(|u| (format!("user:{}", u.user_id), u.points)),
        )
        .collect()
}

#[tokio::test]
async fn transfer_scenario_c1_to_u1() {
    let store = Arc::new(AccountStore::default());
    store.provision_company("C1", 100).unwrap();
    let engine = TransferEngine::new(store.clone());

    let posting = engine
        .transfer_company_to_user(transfer("C1", "U1", 30), &agent())
        .await
        .unwrap();

    assert_eq!(store.company("C1").unwrap().current_points, 70);
    assert_eq!(store.user("U1").unwrap().points, 30);
    let entries = store.log().entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].entry_type, EntryType::CreditUser);
    assert_eq!(entries[0].amount, 30);
    assert_eq!(posting, Posting::Applied(entries[0].clone()));
}

#[tokio::test]
async fn valid_transfers_conserve_points() {
    let store = Arc::new(AccountStore::default());
    store.provision_company("C1", 1_000).unwrap();
    store.provision_company("C2", 500).unwrap();
    let engine = TransferEngine::new(store.clone());
    let total_before = store.snapshot().total_points();

    for i in 0..60u64 {
        let company = if i % 3 == 0 { "C2" } else { "C1" };
        let user = format!("U{}", i % 7);
        let amount = 1 + (i * 7) % 13;

        let before = store.snapshot().total_points();
        engine
            .transfer_company_to_user(transfer(company, &user, amount), &agent())
            .await
            .unwrap();
        assert_eq!(store.snapshot().total_points(), before);
    }

    assert_eq!(store.snapshot().total_points(), total_before);
    assert_eq!(store.log().len(), 60);
}

#[rstest]
#[case::empty_company(0, 1)]
#[case::one_short(29, 30)]
#[case::far_short(5, 1_000)]
#[tokio::test]
async fn overdraft_is_rejected_without_side_effects(
    #[case] available: Points,
    #[case] requested: Points,
) {
    let store = Arc::new(AccountStore::default());
    store.provision_company("C1", available).unwrap();
    let engine = TransferEngine::new(store.clone());
    let before = store.snapshot();

    let result = engine
        .transfer_company_to_user(transfer("C1", "U1", requested), &agent())
        .await;

    match result {
        Err(LedgerError::ResourceExhausted { shortfall, .. }) => {
            assert_eq!(shortfall, requested - available)
        }
        other => panic!("expected ResourceExhausted, got {:?}", other),
    }
    assert_eq!(store.snapshot(), before);
    assert!(store.log().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn n_concurrent_unit_transfers_drain_exactly() {
    const N: usize = 100;
    let store = contended_store();
    store.provision_company("C1", N as Points).unwrap();
    let engine = TransferEngine::new(store.clone());

    let handles: Vec<_> = (0..N)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .transfer_company_to_user(transfer("C1", &format!("U{}", i % 10), 1), &agent())
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    assert_eq!(store.company("C1").unwrap().current_points, 0);
    assert_eq!(store.log().len(), N);

    let extra = engine
        .transfer_company_to_user(transfer("C1", "U0", 1), &agent())
        .await;
    assert!(matches!(extra, Err(LedgerError::ResourceExhausted { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn n_plus_one_concurrent_transfers_reject_exactly_one() {
    const N: usize = 50;
    let store = contended_store();
    store.provision_company("C1", N as Points).unwrap();
    let engine = TransferEngine::new(store.clone());

    let handles: Vec<_> = (0..=N)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .transfer_company_to_user(transfer("C1", &format!("U{}", i), 1), &agent())
                    .await
            })
        })
        .collect();

    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => {}
            Err(LedgerError::ResourceExhausted { .. }) => rejected += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(rejected, 1);
    assert_eq!(store.company("C1").unwrap().current_points, 0);
    assert_eq!(store.log().len(), N);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn snapshots_never_show_half_applied_transfers() {
    let store = contended_store();
    store.provision_company("C1", 10_000).unwrap();
    store.provision_company("C2", 10_000).unwrap();
    let engine = TransferEngine::new(store.clone());

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let engine = engine.clone();
            tokio::spawn(async move {
                for i in 0..100u64 {
                    let company = if (w + i) % 2 == 0 { "C1" } else { "C2" };
                    engine
                        .transfer_company_to_user(
                            transfer(company, &format!("U{}", i % 4), 1 + i % 5),
                            &agent(),
                        )
                        .await
                        .unwrap();
                }
            })
        })
        .collect();

    let reader = {
        let store = store.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                assert_eq!(store.snapshot().total_points(), 20_000);
                tokio::task::yield_now().await;
            }
        })
    };

    for writer in writers {
        writer.await.unwrap();
    }
    reader.await.unwrap();

    let snapshot = store.snapshot();
    assert_eq!(snapshot.total_points(), 20_000);
    let credited: u128 = store
        .log()
        .entries()
        .iter()
        .map(|e| u128::from(e.amount))
        .sum();
    let users: u128 = snapshot.users.iter().map(|u| u128::from(u.points)).sum();
    assert_eq!(credited, users);
}

#[tokio::test]
async fn log_is_timestamp_ordered() {
    let store = Arc::new(AccountStore::default());
    store.provision_company("C1", 1_000).unwrap();
    let engine = TransferEngine::new(store.clone());

    for i in 0..20 {
        engine
            .transfer_company_to_user(transfer("C1", &format!("U{}", i), 1), &agent())
            .await
            .unwrap();
    }

    let entries = store.log().entries();
    assert!(entries
        .windows(2)
        .all(|pair| pair[0].timestamp <= pair[1].timestamp));
}

#[test]
fn two_and_a_half_kilos_at_ten_points_is_twenty_five() {
    assert_eq!(
        points_for_weight(Decimal::new(25, 1), Decimal::from(10)),
        Ok(25)
    );
}

#[rstest]
#[case::pending(InvoiceStatus::Pending)]
#[case::cancelled(InvoiceStatus::Cancelled)]
#[case::failed(InvoiceStatus::Failed)]
#[case::unknown_status(InvoiceStatus::Other("on_hold".to_string()))]
#[tokio::test]
async fn unpaid_invoices_never_credit(#[case] status: InvoiceStatus) {
    let store = Arc::new(AccountStore::default());
    store.provision_company("C1", 10).unwrap();
    let gateway = Arc::new(SimulatedGateway::default());
    gateway.insert_invoice("inv-1", Some("C1"), Decimal::from(500), status.clone());
    let service =
        RechargeReconciliationService::new(TransferEngine::new(store.clone()), gateway, Decimal::ONE);
    let before = balances(&store.snapshot());

    let outcome = service.reconcile("inv-1").await.unwrap();
    let ack = service
        .handle_callback(br#"{"invoice_token":"inv-1"}"#)
        .await;

    assert_eq!(outcome, ReconcileOutcome::NotCompleted(status));
    assert!(ack.success);
    assert_eq!(balances(&store.snapshot()), before);
    assert!(store.log().is_empty());
}

#[tokio::test]
async fn unverifiable_callbacks_never_credit() {
    let store = Arc::new(AccountStore::default());
    store.provision_company("C1", 10).unwrap();
    let gateway = Arc::new(SimulatedGateway::default());
    let service = RechargeReconciliationService::new(
        TransferEngine::new(store.clone()),
        gateway.clone(),
        Decimal::ONE,
    );

    // The body claims a company and an amount, but the gateway knows no such invoice
    let ack = service
        .handle_callback(
            br#"{"invoice_token":"forged","total_amount":100000,"custom_data":{"companyId":"C1"}}"#,
        )
        .await;

    assert!(ack.success);
    assert_eq!(store.company("C1").unwrap().current_points, 10);
    assert!(store.log().is_empty());
    assert_eq!(gateway.verify_calls(), 1);
    assert_eq!(service.audit().attempts_for("forged").len(), 1);
}

#[tokio::test]
async fn replayed_callback_does_not_double_credit() {
    let store = Arc::new(AccountStore::default());
    store.provision_company("C1", 0).unwrap();
    let gateway = Arc::new(SimulatedGateway::default());
    gateway.insert_invoice("inv-1", Some("C1"), Decimal::from(5000), InvoiceStatus::Pending);
    let service = RechargeReconciliationService::new(
        TransferEngine::new(store.clone()),
        gateway.clone(),
        Decimal::ONE,
    );
    let body = br#"{"invoice_token":"inv-1"}"#;

    // Delivered before payment, then after, then again
    service.handle_callback(body).await;
    gateway.complete("inv-1").unwrap();
    service.handle_callback(body).await;
    service.handle_callback(body).await;

    assert_eq!(store.company("C1").unwrap().current_points, 5000);
    let entries = store.log().entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].reference.as_deref(), Some("inv-1"));
    assert_eq!(service.audit().attempts_for("inv-1").len(), 3);
}

#[tokio::test]
async fn direct_recharge_with_same_reference_credits_once() {
    let store = Arc::new(AccountStore::default());
    store.provision_company("C1", 0).unwrap();
    let engine = TransferEngine::new(store.clone());
    let request = RechargeRequest {
        company_id: "C1".to_string(),
        amount: 250,
        auxiliary: Auxiliary::None,
        reference: Some("inv-9".to_string()),
    };

    let first = engine.recharge(request.clone()).await.unwrap();
    let second = engine.recharge(request).await.unwrap();

    assert!(!first.is_replay());
    assert!(second.is_replay());
    assert_eq!(first.entry(), second.entry());
    assert_eq!(store.company("C1").unwrap().current_points, 250);
}

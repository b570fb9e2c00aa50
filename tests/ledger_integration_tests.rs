mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{harness, luhn_number, order_numbers, processed, ScriptedOracle};
use loyalty_core::ledger::{BalanceLedger, LedgerError};
use loyalty_core::models::{Balance, OrderStatus};
use loyalty_core::persistence::{LedgerStore, MemoryStore};
use loyalty_core::reconciliation::WorkerConfig;
use loyalty_core::services::{LoyaltyServices, SubmitOutcome};

fn ledger_with_accrual(user_id: i64, accrual: i64) -> (MemoryStore, BalanceLedger) {
    let store = MemoryStore::new();
    store.seed_order(user_id, &luhn_number(user_id as u64), OrderStatus::Processed, Some(accrual));
    let ledger = BalanceLedger::new(Arc::new(store.clone()));
    (store, ledger)
}

#[tokio::test]
async fn test_withdraw_full_balance_then_overdraw() {
    let (_, ledger) = ledger_with_accrual(1, 500);

    assert_eq!(
        ledger.get_balance(1).await.unwrap(),
        Balance {
            current: 500,
            withdrawn: 0
        }
    );

    ledger.withdraw(1, "2377225624", 500).await.unwrap();

    let err = ledger.withdraw(1, "9278923470", 1).await.unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InsufficientFunds {
            available: 0,
            requested: 1,
            ..
        }
    ));
    assert_eq!(
        ledger.get_balance(1).await.unwrap(),
        Balance {
            current: 0,
            withdrawn: 500
        }
    );
}

#[tokio::test]
async fn test_duplicate_withdrawal_leaves_balance_unchanged() {
    let (_, ledger) = ledger_with_accrual(1, 500);

    ledger.withdraw(1, "2377225624", 200).await.unwrap();
    let before = ledger.get_balance(1).await.unwrap();

    let err = ledger.withdraw(1, "2377225624", 200).await.unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateWithdrawalOrder { user_id: 1, .. }));
    assert!(!matches!(err, LedgerError::InsufficientFunds { .. }));
    assert_eq!(ledger.get_balance(1).await.unwrap(), before);
}

#[tokio::test]
async fn test_withdrawals_listed_newest_first() {
    let (_, ledger) = ledger_with_accrual(1, 500);
    ledger.withdraw(1, "2377225624", 10).await.unwrap();
    ledger.withdraw(1, "9278923470", 20).await.unwrap();

    let amounts: Vec<i64> = ledger
        .list_withdrawals(1)
        .await
        .unwrap()
        .into_iter()
        .map(|w| w.amount)
        .collect();
    assert_eq!(amounts, vec![20, 10]);
    assert!(ledger.list_withdrawals(2).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_withdrawals_never_overspend() {
    let (_, ledger) = ledger_with_accrual(1, 1_000);
    let numbers = order_numbers(50);

    let handles: Vec<_> = numbers
        .into_iter()
        .map(|number| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.withdraw(1, &number, 30).await })
        })
        .collect();

    let mut committed = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => committed += 1,
            Err(LedgerError::InsufficientFunds { .. }) => refused += 1,
            Err(other) => panic!("unexpected withdrawal error: {other}"),
        }
    }

    assert_eq!(committed, 33);
    assert_eq!(refused, 17);

    let balance = ledger.get_balance(1).await.unwrap();
    assert_eq!(balance.withdrawn, 990);
    assert_eq!(balance.current, 10);
}

#[tokio::test]
async fn test_other_users_are_not_blocked_by_an_open_debit() {
    let store = MemoryStore::new();
    store.seed_order(1, "79927398713", OrderStatus::Processed, Some(100));
    store.seed_order(2, "12345678903", OrderStatus::Processed, Some(100));
    let ledger = BalanceLedger::new(Arc::new(store.clone()));

    let open_debit = store.begin_debit(1).await.unwrap();

    tokio::time::timeout(
        Duration::from_secs(1),
        ledger.withdraw(2, "2377225624", 50),
    )
    .await
    .expect("user 2 was blocked by user 1")
    .unwrap();

    assert!(tokio::time::timeout(
        Duration::from_millis(100),
        ledger.withdraw(1, "2377225624", 50)
    )
    .await
    .is_err());

    drop(open_debit);
    ledger.withdraw(1, "2377225624", 50).await.unwrap();
    assert_eq!(ledger.get_balance(1).await.unwrap().current, 50);
}

#[tokio::test]
async fn test_submitted_order_becomes_spendable_after_reconciliation() {
    let oracle = Arc::new(ScriptedOracle::new(processed(300)));
    let (_, services, worker): (_, LoyaltyServices, _) =
        harness(oracle, WorkerConfig::default());

    let outcome = services.orders.submit_order(5, "4561261212345467").await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Accepted(_)));
    assert!(matches!(
        services.ledger.withdraw(5, "2377225624", 100).await,
        Err(LedgerError::InsufficientFunds { available: 0, .. })
    ));

    worker.run_pass().await.unwrap();

    services.ledger.withdraw(5, "2377225624", 100).await.unwrap();
    assert_eq!(
        services.ledger.get_balance(5).await.unwrap(),
        Balance {
            current: 200,
            withdrawn: 100
        }
    );

    // A second pass finds nothing pending and cannot double-credit
    let report = worker.run_pass().await.unwrap();
    assert!(report.is_empty());
    assert_eq!(services.ledger.get_balance(5).await.unwrap().current, 200);
}

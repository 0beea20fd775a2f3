mod common;

use std::sync::Arc;

use anyhow::Result;
use balance_ledger::{AppError, ErrorKind, LedgerStore, OperationKind, StoreError};
use common::{FailingConverter, FixedRateConverter, TestLedger};

#[tokio::test]
async fn test_credit_after_explicit_create() -> Result<()> {
    let ledger = TestLedger::new().await?;

    ledger.store.create_balance(1).await?;
    ledger.service.increase_balance(1, 500).await?;

    assert_eq!(ledger.balance(1).await?, 500);

    Ok(())
}

#[tokio::test]
async fn test_first_credit_opens_balance() -> Result<()> {
    let ledger = TestLedger::new().await?;

    let operation = ledger.service.increase_balance(9, 250).await?;

    assert_eq!(ledger.balance(9).await?, 250);
    assert_eq!(operation.amount, 250);
    assert_eq!(operation.kind(), Some(OperationKind::Deposit));
    assert_eq!(operation.recipient_id, Some(9));
    assert_eq!(operation.sender_id, None);

    Ok(())
}

#[tokio::test]
async fn test_debit_more_than_balance_is_rejected() -> Result<()> {
    let ledger = TestLedger::new().await?;
    ledger.fund(2, 100).await?;

    let err = ledger.service.decrease_balance(2, 150).await.unwrap_err();

    assert!(matches!(&err, AppError::WrongInput(msg) if msg == "not enough money"));
    assert_eq!(ledger.balance(2).await?, 100);

    // Only the funding deposit is logged
    let operations = ledger.service.get_operations_by_id(2, 10).await?;
    assert_eq!(operations.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_debit_whole_balance() -> Result<()> {
    let ledger = TestLedger::new().await?;
    ledger.fund(2, 100).await?;

    let operation = ledger.service.decrease_balance(2, 100).await?;

    assert_eq!(ledger.balance(2).await?, 0);
    assert_eq!(operation.kind(), Some(OperationKind::Withdrawal));
    assert_eq!(operation.sender_id, Some(2));
    assert_eq!(operation.recipient_id, None);

    Ok(())
}

#[tokio::test]
async fn test_unknown_user_is_not_found() -> Result<()> {
    let ledger = TestLedger::new().await?;

    let err = ledger
        .service
        .get_balance_by_user_id(5, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(5)));

    let err = ledger.service.decrease_balance(5, 10).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    Ok(())
}

#[tokio::test]
async fn test_amounts_must_be_positive() -> Result<()> {
    let ledger = TestLedger::new().await?;
    ledger.fund(1, 100).await?;

    for amount in [0, -5] {
        let err = ledger.service.increase_balance(1, amount).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WrongInput);

        let err = ledger.service.decrease_balance(1, amount).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WrongInput);
    }

    // A rejected credit must not open a balance either
    let err = ledger.service.increase_balance(2, 0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WrongInput);
    assert!(matches!(
        ledger.store.get_balance(2).await,
        Err(StoreError::NotFound(2))
    ));

    assert_eq!(ledger.balance(1).await?, 100);

    Ok(())
}

#[tokio::test]
async fn test_create_balance_twice_fails() -> Result<()> {
    let ledger = TestLedger::new().await?;

    ledger.store.create_balance(3).await?;
    let err = ledger.store.create_balance(3).await.unwrap_err();

    assert!(matches!(err, StoreError::AlreadyExists(3)));
    assert!(!ledger.store.ensure_balance(3).await?);
    assert!(ledger.store.ensure_balance(4).await?);

    Ok(())
}

#[tokio::test]
async fn test_store_refuses_to_go_negative() -> Result<()> {
    let ledger = TestLedger::new().await?;
    ledger.fund(1, 50).await?;

    // The store guards on its own, without the service pre-check
    let err = ledger.store.debit(1, 51).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::InsufficientFunds {
            user_id: 1,
            requested: 51
        }
    ));
    assert_eq!(ledger.store.get_balance(1).await?, 50);

    let err = ledger.store.credit(77, 10).await.unwrap_err();
    assert!(err.is_not_found());
    let err = ledger.store.debit(77, 10).await.unwrap_err();
    assert!(err.is_not_found());

    Ok(())
}

#[tokio::test]
async fn test_credit_past_i64_max_is_rejected() -> Result<()> {
    let ledger = TestLedger::new().await?;
    ledger.fund(1, i64::MAX).await?;

    let err = ledger.service.increase_balance(1, 1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WrongInput);

    let err = ledger.store.credit(1, 10).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::BalanceOverflow {
            user_id: 1,
            requested: 10
        }
    ));

    // Nothing committed: balance still decodes and the log holds one credit
    assert_eq!(ledger.store.get_balance(1).await?, i64::MAX);
    assert_eq!(ledger.service.get_operations_by_id(1, 10).await?.len(), 1);
    assert!(ledger.service.check_integrity().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_transfer_into_full_balance_rolls_back() -> Result<()> {
    let ledger = TestLedger::new().await?;
    ledger.fund(1, 100).await?;
    ledger.fund(2, i64::MAX).await?;

    let err = ledger.service.transfer_money(1, 2, 5).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WrongInput);

    let err = ledger.store.transfer(1, 2, 5).await.unwrap_err();
    assert!(matches!(err, StoreError::BalanceOverflow { user_id: 2, .. }));

    assert_eq!(ledger.balance(1).await?, 100);
    assert_eq!(ledger.balance(2).await?, i64::MAX);
    assert_eq!(ledger.service.get_operations_by_id(1, 10).await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_audit_handles_log_totals_beyond_i64() -> Result<()> {
    let ledger = TestLedger::new().await?;

    // Incoming total is i64::MAX + 1 although every balance stayed in range
    ledger.fund(1, i64::MAX).await?;
    ledger.service.decrease_balance(1, i64::MAX).await?;
    ledger.service.increase_balance(1, 1).await?;

    assert_eq!(ledger.balance(1).await?, 1);
    assert!(ledger.service.check_integrity().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_balance_in_other_currency() -> Result<()> {
    let ledger = TestLedger::with_converter(Arc::new(FixedRateConverter { rate: 0.5 })).await?;
    ledger.fund(1, 1000).await?;

    let view = ledger.service.get_balance_by_user_id(1, Some("usd")).await?;
    assert_eq!(view.currency, "USD");
    assert_eq!(view.amount, 500.0);

    // Base currency never goes through the converter
    let view = ledger.service.get_balance_by_user_id(1, Some("RUB")).await?;
    assert_eq!(view.currency, "RUB");
    assert_eq!(view.amount, 1000.0);

    let view = ledger.service.get_balance_by_user_id(1, Some("")).await?;
    assert_eq!(view.currency, "RUB");

    Ok(())
}

#[tokio::test]
async fn test_conversion_failure_falls_back_to_base_currency() -> Result<()> {
    let ledger = TestLedger::with_converter(Arc::new(FailingConverter)).await?;
    ledger.fund(1, 1000).await?;

    let view = ledger.service.get_balance_by_user_id(1, Some("EUR")).await?;

    assert_eq!(view.currency, "RUB");
    assert_eq!(view.amount, 1000.0);

    Ok(())
}

#[tokio::test]
async fn test_balance_equals_credits_minus_debits() -> Result<()> {
    let ledger = TestLedger::new().await?;

    let credits = [500, 250, 1, 999];
    let debits = [100, 600, 50];

    for amount in credits {
        ledger.service.increase_balance(8, amount).await?;
    }
    for amount in debits {
        ledger.service.decrease_balance(8, amount).await?;
    }

    let expected: i64 = credits.iter().sum::<i64>() - debits.iter().sum::<i64>();
    assert_eq!(ledger.balance(8).await?, expected);

    let page = ledger
        .service
        .get_operations(8, balance_ledger::HistoryQuery::with_limit(100))
        .await?;
    assert_eq!(page.total, (credits.len() + debits.len()) as i64);
    let derived: i64 = page.operations.iter().map(|op| op.delta_for(8)).sum();
    assert_eq!(derived, expected);

    assert!(ledger.service.check_integrity().await?.is_empty());

    Ok(())
}

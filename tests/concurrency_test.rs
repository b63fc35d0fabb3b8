mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use common::{StandardWallets, account, assert_consistent, test_service};
use tempfile::TempDir;
use wallet_ledger::Repository;
use wallet_ledger::application::{ErrorKind, LedgerConfig, LedgerError, LedgerService};
use wallet_ledger::storage::StoreOptions;

/// Store options under which a locked database fails immediately instead of
/// waiting, so every collision surfaces as a conflict.
fn impatient_store() -> StoreOptions {
    StoreOptions {
        busy_timeout: Duration::ZERO,
        ..StoreOptions::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_withdrawals_never_overdraw() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    let acc = account(StandardWallets::ALICE);
    service
        .create_wallet(acc, "Alice".to_string(), 1000, 0)
        .await?;

    const N: i64 = 8;
    let amount = 1000 / N + 1;
    let max_successes = 1000 / amount;

    let handles: Vec<_> = (0..N)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.withdraw(acc, amount).await })
        })
        .collect();

    let mut successes = 0;
    let mut insufficient = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => successes += 1,
            Err(err) => {
                assert_eq!(err.kind(), ErrorKind::InsufficientFunds, "{}", err);
                insufficient += 1;
            }
        }
    }

    // Serialized withdrawals: exactly as many succeed as the balance covers
    assert_eq!(successes, max_successes);
    assert_eq!(insufficient, N - max_successes);
    let wallet = service.get_wallet_by_account(acc).await?;
    assert!(wallet.withdrawal_balance >= 0);
    assert_eq!(wallet.withdrawal_balance, 1000 - successes * amount);
    assert_consistent(&wallet);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposing_transfers_conserve_money() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    let a = account(StandardWallets::ALICE);
    let b = account(StandardWallets::BOB);
    service.create_wallet(a, "Alice".to_string(), 500, 0).await?;
    service.create_wallet(b, "Bob".to_string(), 500, 0).await?;

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let service = Arc::clone(&service);
            let (from, to) = if i % 2 == 0 { (a, b) } else { (b, a) };
            tokio::spawn(async move { service.transfer(from, to, 40).await })
        })
        .collect();

    let all = async {
        for handle in handles {
            if let Err(err) = handle.await? {
                assert!(!err.is_business() || err.kind() == ErrorKind::InsufficientFunds);
            }
        }
        anyhow::Ok(())
    };
    tokio::time::timeout(Duration::from_secs(30), all).await??;

    let alice = service.get_wallet_by_account(a).await?;
    let bob = service.get_wallet_by_account(b).await?;
    assert_eq!(alice.total_inventory + bob.total_inventory, 1000);
    assert_consistent(&alice);
    assert_consistent(&bob);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_with_same_account_number() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Arc::new(service);
    let acc = account(555555);

    let handles: Vec<_> = (0..5)
        .map(|i| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .create_wallet(acc, format!("Holder {}", i), 100, 0)
                    .await
            })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => created += 1,
            Err(LedgerError::DuplicateAccount(n)) => assert_eq!(n, acc),
            Err(err) => assert_eq!(err.kind(), ErrorKind::Internal, "{}", err),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(service.list_wallets().await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_conflicts_exhaust_retries_as_internal() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db_url = format!("sqlite:{}", temp_dir.path().join("test.db").display());
    let repo = Repository::init(&db_url, &impatient_store()).await?;
    let config = LedgerConfig::default()
        .with_max_attempts(3)
        .with_retry_backoff(Duration::from_millis(1));
    let service = LedgerService::new(repo.clone(), config);

    let acc = account(StandardWallets::ALICE);
    service
        .create_wallet(acc, "Alice".to_string(), 1000, 0)
        .await?;

    // Another writer holds the account for the whole retry window
    let mut holder = repo.begin().await?;
    holder.lock_accounts(&[acc]).await?;

    let err = service.withdraw(acc, 10).await.unwrap_err();
    assert!(
        matches!(
            err,
            LedgerError::RetriesExhausted {
                operation: "withdraw",
                attempts: 3
            }
        ),
        "{}",
        err
    );
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(!err.is_business());

    // Once the other writer finishes, the same request goes through
    holder.commit().await?;
    let wallet = service.withdraw(acc, 10).await?;
    assert_eq!(wallet.withdrawal_balance, 990);
    assert_consistent(&wallet);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_contended_deposits_never_report_insufficient_funds() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init_with(
        db_path.to_str().unwrap(),
        &impatient_store(),
        LedgerConfig::default(),
    )
    .await?;
    let service = Arc::new(service);

    let acc = account(StandardWallets::ALICE);
    let start = 100_000;
    service
        .create_wallet(acc, "Alice".to_string(), start, 0)
        .await?;

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.deposit(acc, 1).await })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => successes += 1,
            Err(err) => {
                assert_ne!(err.kind(), ErrorKind::InsufficientFunds, "{}", err);
                assert!(
                    matches!(err, LedgerError::RetriesExhausted { .. }),
                    "{}",
                    err
                );
                assert_eq!(err.kind(), ErrorKind::Internal);
            }
        }
    }

    // Every failed attempt rolled back; only committed deposits count
    let wallet = service.get_wallet_by_account(acc).await?;
    assert_eq!(wallet.total_inventory, start + successes);
    assert_consistent(&wallet);

    Ok(())
}

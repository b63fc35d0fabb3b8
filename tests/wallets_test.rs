mod common;

use anyhow::Result;
use common::{StandardWallets, account, assert_consistent, test_service};
use uuid::Uuid;
use wallet_ledger::application::{ErrorKind, LedgerError};

#[tokio::test]
async fn test_create_then_fetch_round_trip() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let created = service
        .create_wallet(account(123456), "Ada Lovelace".to_string(), 1000, 200)
        .await?;
    assert_eq!(created.withdrawal_balance, 800);
    assert_consistent(&created);

    let by_account = service.get_wallet_by_account(account(123456)).await?;
    assert_eq!(by_account.id, created.id);
    assert_eq!(by_account.account_number, created.account_number);
    assert_eq!(by_account.user_name, "Ada Lovelace");
    assert_eq!(by_account.total_inventory, 1000);
    assert_eq!(by_account.blocked_inventory, 200);
    assert_eq!(by_account.withdrawal_balance, 800);

    let by_id = service.get_wallet(created.id).await?;
    assert_eq!(by_id.account_number, created.account_number);

    Ok(())
}

#[tokio::test]
async fn test_duplicate_account_number_is_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardWallets::create_basic(&service).await?;

    let err = service
        .create_wallet(account(StandardWallets::ALICE), "Mallory".to_string(), 5, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateAccount(_)));
    assert_eq!(err.kind(), ErrorKind::DuplicateAccount);

    // The original wallet is untouched
    let alice = service
        .get_wallet_by_account(account(StandardWallets::ALICE))
        .await?;
    assert_eq!(alice.user_name, "Alice");
    assert_eq!(alice.total_inventory, 1000);
    assert_eq!(service.list_wallets().await?.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_create_rejects_invalid_balances() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let err = service
        .create_wallet(account(123456), "Bob".to_string(), 100, 101)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExceedsTotal);

    let err = service
        .create_wallet(account(123456), "Bob".to_string(), -1, 0)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = service
        .create_wallet(account(123456), "   ".to_string(), 10, 0)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert!(service.list_wallets().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_list_wallets_empty_and_ordered() -> Result<()> {
    let (service, _temp) = test_service().await?;
    assert!(service.list_wallets().await?.is_empty());

    StandardWallets::create(&service, 900000, "Zed", 0, 0).await?;
    StandardWallets::create(&service, 100000, "Amy", 0, 0).await?;
    StandardWallets::create(&service, 500000, "Max", 0, 0).await?;

    let numbers: Vec<u32> = service
        .list_wallets()
        .await?
        .iter()
        .map(|w| w.account_number.get())
        .collect();
    assert_eq!(numbers, vec![100000, 500000, 900000]);

    Ok(())
}

#[tokio::test]
async fn test_edit_user_name() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, _) = StandardWallets::create_basic(&service).await?;

    let renamed = service
        .edit_user_name(alice.id, "Alice Liddell".to_string())
        .await?;
    assert_eq!(renamed.user_name, "Alice Liddell");
    assert_eq!(renamed.total_inventory, alice.total_inventory);
    assert_eq!(renamed.withdrawal_balance, alice.withdrawal_balance);

    let stored = service.get_wallet(alice.id).await?;
    assert_eq!(stored.user_name, "Alice Liddell");

    let err = service
        .edit_user_name(Uuid::new_v4(), "Nobody".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::WalletNotFound(_)));

    let err = service
        .edit_user_name(alice.id, "".to_string())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    Ok(())
}

#[tokio::test]
async fn test_delete_wallet_is_unconditional_and_permanent() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (alice, bob) = StandardWallets::create_basic(&service).await?;

    // Alice still holds a balance; deletion goes through anyway
    service.delete_wallet(alice.id).await?;

    let err = service.get_wallet(alice.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = service
        .get_wallet_by_account(account(StandardWallets::ALICE))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let remaining = service.list_wallets().await?;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, bob.id);

    let err = service.delete_wallet(alice.id).await.unwrap_err();
    assert!(matches!(err, LedgerError::WalletNotFound(_)));

    // The account number is free again
    StandardWallets::create(&service, StandardWallets::ALICE, "New Alice", 0, 0).await?;

    Ok(())
}

#[tokio::test]
async fn test_get_wallet_not_found() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let err = service.get_wallet(Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = service
        .get_wallet_by_account(account(654321))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::AccountNotFound(_)));

    Ok(())
}

// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use tempfile::TempDir;
use wallet_ledger::application::LedgerService;
use wallet_ledger::domain::{AccountNumber, Amount, Wallet};

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Shorthand for a known-valid account number
pub fn account(n: u32) -> AccountNumber {
    AccountNumber::new(n).unwrap()
}

/// Assert the balance invariants hold for a wallet at rest
pub fn assert_consistent(wallet: &Wallet) {
    assert!(wallet.blocked_inventory >= 0);
    assert!(wallet.blocked_inventory <= wallet.total_inventory);
    assert!(wallet.withdrawal_balance >= 0);
    assert_eq!(
        wallet.withdrawal_balance,
        wallet.total_inventory - wallet.blocked_inventory
    );
}

/// Test fixture: Standard wallet setup
pub struct StandardWallets;

impl StandardWallets {
    pub const ALICE: u32 = 111111;
    pub const BOB: u32 = 222222;

    /// Create Alice (1000 total, 200 blocked) and Bob (empty)
    pub async fn create_basic(service: &LedgerService) -> Result<(Wallet, Wallet)> {
        let alice = Self::create(service, Self::ALICE, "Alice", 1000, 200).await?;
        let bob = Self::create(service, Self::BOB, "Bob", 0, 0).await?;
        Ok((alice, bob))
    }

    pub async fn create(
        service: &LedgerService,
        number: u32,
        user_name: &str,
        total: Amount,
        blocked: Amount,
    ) -> Result<Wallet> {
        Ok(service
            .create_wallet(account(number), user_name.to_string(), total, blocked)
            .await?)
    }
}

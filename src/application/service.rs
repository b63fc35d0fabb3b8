use std::future::Future;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{AccountNumber, Amount, Wallet, WalletError, WalletId, transfer_between};
use crate::storage::{self, Repository, StoreOptions};

use super::{LedgerConfig, LedgerError};

/// Application service providing the wallet ledger operations.
/// This is the primary interface for any client (CLI, API, etc.).
pub struct LedgerService {
    repo: Repository,
    config: LedgerConfig,
}

/// Single-account balance mutation applied inside a unit of work.
#[derive(Debug, Clone, Copy)]
enum BalanceChange {
    Deposit(Amount),
    Withdraw(Amount),
    Block(Amount),
}

impl BalanceChange {
    fn apply(self, wallet: &mut Wallet) -> Result<(), WalletError> {
        match self {
            BalanceChange::Deposit(amount) => wallet.deposit(amount),
            BalanceChange::Withdraw(amount) => wallet.withdraw(amount),
            BalanceChange::Block(blocked) => wallet.block(blocked),
        }
    }
}

/// Both sides of a completed transfer, as committed.
#[derive(Debug, Clone, Serialize)]
pub struct TransferResult {
    pub from: Wallet,
    pub to: Wallet,
}

impl LedgerService {
    /// Create a new ledger service over the given repository.
    pub fn new(repo: Repository, config: LedgerConfig) -> Self {
        Self { repo, config }
    }

    /// Initialize a new database at the given path with default settings.
    pub async fn init(database_path: &str) -> Result<Self, LedgerError> {
        Self::init_with(database_path, &StoreOptions::default(), LedgerConfig::default()).await
    }

    /// Initialize (create + migrate) a database at the given path.
    pub async fn init_with(
        database_path: &str,
        options: &StoreOptions,
        config: LedgerConfig,
    ) -> Result<Self, LedgerError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::init(&db_url, options).await?;
        Ok(Self::new(repo, config))
    }

    /// Connect to an existing database.
    pub async fn connect_with(
        database_path: &str,
        options: &StoreOptions,
        config: LedgerConfig,
    ) -> Result<Self, LedgerError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url, options).await?;
        Ok(Self::new(repo, config))
    }

    // ========================
    // Wallet lifecycle
    // ========================

    /// Create a new wallet after checking the account number is free.
    pub async fn create_wallet(
        &self,
        account_number: AccountNumber,
        user_name: String,
        total_inventory: Amount,
        blocked_inventory: Amount,
    ) -> Result<Wallet, LedgerError> {
        let wallet = Wallet::new(account_number, user_name, total_inventory, blocked_inventory)
            .map_err(|e| LedgerError::from_wallet(account_number, e))?;

        self.with_retry("create_wallet", || self.try_create_wallet(&wallet))
            .await?;

        info!(
            account = %wallet.account_number,
            wallet_id = %wallet.id,
            total = wallet.total_inventory,
            blocked = wallet.blocked_inventory,
            "wallet created"
        );
        Ok(wallet)
    }

    async fn try_create_wallet(&self, wallet: &Wallet) -> Result<(), LedgerError> {
        let mut uow = self.repo.begin().await?;
        uow.lock_accounts(&[wallet.account_number]).await?;

        if uow
            .find_by_account_number(wallet.account_number)
            .await?
            .is_some()
        {
            return Err(LedgerError::DuplicateAccount(wallet.account_number));
        }

        if let Err(err) = uow.insert(wallet).await {
            if storage::is_unique_violation(&err) {
                return Err(LedgerError::DuplicateAccount(wallet.account_number));
            }
            return Err(err.into());
        }

        uow.commit().await?;
        Ok(())
    }

    /// Change the account holder name of the wallet with the given ID.
    pub async fn edit_user_name(
        &self,
        id: WalletId,
        user_name: String,
    ) -> Result<Wallet, LedgerError> {
        let wallet = self
            .with_retry("edit_user_name", || self.try_edit_user_name(id, &user_name))
            .await?;

        info!(wallet_id = %id, "user name changed");
        Ok(wallet)
    }

    async fn try_edit_user_name(
        &self,
        id: WalletId,
        user_name: &str,
    ) -> Result<Wallet, LedgerError> {
        let mut uow = self.repo.begin().await?;
        uow.lock_wallet(id).await?;

        let mut wallet = uow
            .find_by_id(id)
            .await?
            .ok_or(LedgerError::WalletNotFound(id))?;
        wallet.rename(user_name)?;

        uow.update(&wallet).await?;
        uow.commit().await?;
        Ok(wallet)
    }

    /// Permanently remove a wallet. No balance check is made.
    pub async fn delete_wallet(&self, id: WalletId) -> Result<(), LedgerError> {
        let removed = self
            .with_retry("delete_wallet", || self.try_delete_wallet(id))
            .await?;

        info!(
            wallet_id = %id,
            account = %removed.account_number,
            total = removed.total_inventory,
            "wallet deleted"
        );
        Ok(())
    }

    async fn try_delete_wallet(&self, id: WalletId) -> Result<Wallet, LedgerError> {
        let mut uow = self.repo.begin().await?;
        uow.lock_wallet(id).await?;

        let wallet = uow
            .find_by_id(id)
            .await?
            .ok_or(LedgerError::WalletNotFound(id))?;

        uow.delete(id).await?;
        uow.commit().await?;
        Ok(wallet)
    }

    // ========================
    // Balance mutations
    // ========================

    /// Credit `amount` to the account.
    pub async fn deposit(
        &self,
        account_number: AccountNumber,
        amount: Amount,
    ) -> Result<Wallet, LedgerError> {
        require_positive(amount)?;
        let wallet = self
            .mutate_account("deposit", account_number, BalanceChange::Deposit(amount))
            .await?;

        info!(
            account = %account_number,
            amount,
            total = wallet.total_inventory,
            "deposit applied"
        );
        Ok(wallet)
    }

    /// Debit `amount` from the account's spendable balance.
    pub async fn withdraw(
        &self,
        account_number: AccountNumber,
        amount: Amount,
    ) -> Result<Wallet, LedgerError> {
        require_positive(amount)?;
        let wallet = self
            .mutate_account("withdraw", account_number, BalanceChange::Withdraw(amount))
            .await?;

        info!(
            account = %account_number,
            amount,
            withdrawal_balance = wallet.withdrawal_balance,
            "withdrawal applied"
        );
        Ok(wallet)
    }

    /// Set the blocked amount of the account (absolute value, not a delta).
    pub async fn block_inventory(
        &self,
        account_number: AccountNumber,
        blocked_inventory: Amount,
    ) -> Result<Wallet, LedgerError> {
        if blocked_inventory < 0 {
            return Err(LedgerError::Validation(
                WalletError::NegativeAmount(blocked_inventory).to_string(),
            ));
        }
        let wallet = self
            .mutate_account(
                "block_inventory",
                account_number,
                BalanceChange::Block(blocked_inventory),
            )
            .await?;

        info!(
            account = %account_number,
            blocked = wallet.blocked_inventory,
            withdrawal_balance = wallet.withdrawal_balance,
            "inventory blocked"
        );
        Ok(wallet)
    }

    /// Move `amount` between two accounts as one unit of work.
    ///
    /// The source is looked up before the destination. A transfer to the same
    /// account is checked like any other and then left as a no-op.
    pub async fn transfer(
        &self,
        from: AccountNumber,
        to: AccountNumber,
        amount: Amount,
    ) -> Result<TransferResult, LedgerError> {
        require_positive(amount)?;
        let result = self
            .with_retry("transfer", || self.try_transfer(from, to, amount))
            .await?;

        info!(from = %from, to = %to, amount, "transfer applied");
        Ok(result)
    }

    async fn try_transfer(
        &self,
        from: AccountNumber,
        to: AccountNumber,
        amount: Amount,
    ) -> Result<TransferResult, LedgerError> {
        let mut uow = self.repo.begin().await?;
        uow.lock_accounts(&[from, to]).await?;

        let mut source = uow
            .find_by_account_number(from)
            .await?
            .ok_or(LedgerError::SourceAccountNotFound(from))?;

        if from == to {
            source
                .ensure_spendable(amount)
                .map_err(|e| LedgerError::from_wallet(from, e))?;
            debug!(account = %from, amount, "self-transfer, nothing to write");
            return Ok(TransferResult {
                from: source.clone(),
                to: source,
            });
        }

        let mut destination = uow
            .find_by_account_number(to)
            .await?
            .ok_or(LedgerError::DestinationAccountNotFound(to))?;

        transfer_between(&mut source, &mut destination, amount)
            .map_err(|e| LedgerError::from_wallet(from, e))?;
        ensure_consistent(&source)?;
        ensure_consistent(&destination)?;

        uow.update(&source).await?;
        uow.update(&destination).await?;
        uow.commit().await?;

        Ok(TransferResult {
            from: source,
            to: destination,
        })
    }

    async fn mutate_account(
        &self,
        operation: &'static str,
        account_number: AccountNumber,
        change: BalanceChange,
    ) -> Result<Wallet, LedgerError> {
        self.with_retry(operation, || self.try_mutate_account(account_number, change))
            .await
    }

    async fn try_mutate_account(
        &self,
        account_number: AccountNumber,
        change: BalanceChange,
    ) -> Result<Wallet, LedgerError> {
        let mut uow = self.repo.begin().await?;
        uow.lock_accounts(&[account_number]).await?;

        let mut wallet = uow
            .find_by_account_number(account_number)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_number))?;

        change
            .apply(&mut wallet)
            .map_err(|e| LedgerError::from_wallet(account_number, e))?;
        ensure_consistent(&wallet)?;

        uow.update(&wallet).await?;
        uow.commit().await?;
        Ok(wallet)
    }

    /// Run a unit of work, retrying it on lock conflicts.
    async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        mut attempt_fn: F,
    ) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let mut attempt = 1;
        loop {
            match attempt_fn().await {
                Err(LedgerError::ConcurrencyConflict) if attempt < self.config.max_attempts => {
                    warn!(operation, attempt, "conflicting update, retrying");
                    tokio::time::sleep(self.config.backoff_for(attempt)).await;
                    attempt += 1;
                }
                Err(LedgerError::ConcurrencyConflict) => {
                    warn!(operation, attempts = attempt, "giving up after repeated conflicts");
                    return Err(LedgerError::RetriesExhausted {
                        operation,
                        attempts: attempt,
                    });
                }
                other => return other,
            }
        }
    }

    // ========================
    // Queries
    // ========================

    /// Get a wallet by ID.
    pub async fn get_wallet(&self, id: WalletId) -> Result<Wallet, LedgerError> {
        debug!(wallet_id = %id, "fetching wallet");
        self.repo
            .find_by_id(id)
            .await?
            .ok_or(LedgerError::WalletNotFound(id))
    }

    /// Get a wallet by account number.
    pub async fn get_wallet_by_account(
        &self,
        account_number: AccountNumber,
    ) -> Result<Wallet, LedgerError> {
        debug!(account = %account_number, "fetching wallet");
        self.repo
            .find_by_account_number(account_number)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_number))
    }

    /// List all wallets ordered by account number. Empty when there are none.
    pub async fn list_wallets(&self) -> Result<Vec<Wallet>, LedgerError> {
        Ok(self.repo.list_wallets().await?)
    }

    /// Get the spendable balance of an account.
    pub async fn get_withdrawal_balance(
        &self,
        account_number: AccountNumber,
    ) -> Result<Amount, LedgerError> {
        let wallet = self.get_wallet_by_account(account_number).await?;
        Ok(wallet.withdrawal_balance)
    }
}

fn require_positive(amount: Amount) -> Result<(), LedgerError> {
    if amount <= 0 {
        return Err(WalletError::NonPositiveAmount(amount).into());
    }
    Ok(())
}

/// A wallet about to be written must satisfy the balance invariants; anything
/// else is a bug in the mutation, not a caller error.
fn ensure_consistent(wallet: &Wallet) -> Result<(), LedgerError> {
    wallet.check_invariants().map_err(|e| {
        LedgerError::Database(anyhow::anyhow!(
            "refusing to persist wallet {}: {}",
            wallet.account_number,
            e
        ))
    })
}

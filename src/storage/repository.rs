use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Executor, Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::domain::{AccountNumber, Wallet, WalletId};

use super::MIGRATION_001_WALLETS;

const SELECT_BY_ID: &str = r#"
    SELECT id, account_number, user_name, total_inventory, blocked_inventory, withdrawal_balance, created_at, updated_at
    FROM wallets
    WHERE id = ?
"#;

const SELECT_BY_ACCOUNT_NUMBER: &str = r#"
    SELECT id, account_number, user_name, total_inventory, blocked_inventory, withdrawal_balance, created_at, updated_at
    FROM wallets
    WHERE account_number = ?
"#;

const SELECT_ALL: &str = r#"
    SELECT id, account_number, user_name, total_inventory, blocked_inventory, withdrawal_balance, created_at, updated_at
    FROM wallets
    ORDER BY account_number
"#;

/// SQLite result codes (extended) that mean another writer holds the lock.
const CONTENTION_CODES: &[&str] = &["5", "6", "261", "262", "517", "773"];

/// Connection tuning for the wallet store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// How long a statement waits on a locked database before giving up.
    pub busy_timeout: Duration,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            max_connections: 8,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

/// Repository for persisting and querying wallets.
///
/// Plain reads go straight to the pool and may observe state that is already
/// stale by the time the caller acts on it. Anything that reads, checks and
/// writes must go through a [`UnitOfWork`].
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to an existing SQLite database.
    pub async fn connect(database_url: &str, options: &StoreOptions) -> Result<Self> {
        Self::open(database_url, options, false).await
    }

    /// Initialize a database (create if missing + migrate).
    pub async fn init(database_url: &str, options: &StoreOptions) -> Result<Self> {
        let repo = Self::open(database_url, options, true).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    async fn open(database_url: &str, options: &StoreOptions, create: bool) -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid database URL")?
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(options.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout)
            .connect_with(connect_options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_WALLETS)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Open an atomic unit of work.
    pub async fn begin(&self) -> Result<UnitOfWork> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        Ok(UnitOfWork { tx })
    }

    /// Get a wallet by ID.
    pub async fn find_by_id(&self, id: WalletId) -> Result<Option<Wallet>> {
        fetch_by_id(&self.pool, id).await
    }

    /// Get a wallet by account number.
    pub async fn find_by_account_number(
        &self,
        account_number: AccountNumber,
    ) -> Result<Option<Wallet>> {
        fetch_by_account_number(&self.pool, account_number).await
    }

    /// List all wallets, ordered by account number.
    pub async fn list_wallets(&self) -> Result<Vec<Wallet>> {
        let rows = sqlx::query(SELECT_ALL)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list wallets")?;

        rows.iter().map(row_to_wallet).collect()
    }
}

/// An open transaction against the wallet table.
///
/// Dropping a unit without calling [`UnitOfWork::commit`] rolls it back.
pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
}

impl UnitOfWork {
    /// Take the write lock for the given accounts before reading them.
    ///
    /// Accounts are touched in ascending order regardless of the order given,
    /// so two units locking the same pair never wait on each other crosswise.
    /// Must be the first statement of the unit: a unit that has already read
    /// cannot be upgraded to a writer without risking a busy snapshot.
    pub async fn lock_accounts(&mut self, accounts: &[AccountNumber]) -> Result<()> {
        let mut ordered = accounts.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        for account_number in ordered {
            sqlx::query("UPDATE wallets SET account_number = account_number WHERE account_number = ?")
                .bind(i64::from(account_number.get()))
                .execute(&mut *self.tx)
                .await
                .with_context(|| format!("Failed to lock account {}", account_number))?;
        }
        Ok(())
    }

    /// Take the write lock for a single wallet by ID.
    pub async fn lock_wallet(&mut self, id: WalletId) -> Result<()> {
        sqlx::query("UPDATE wallets SET id = id WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *self.tx)
            .await
            .context("Failed to lock wallet")?;
        Ok(())
    }

    pub async fn find_by_id(&mut self, id: WalletId) -> Result<Option<Wallet>> {
        fetch_by_id(&mut *self.tx, id).await
    }

    pub async fn find_by_account_number(
        &mut self,
        account_number: AccountNumber,
    ) -> Result<Option<Wallet>> {
        fetch_by_account_number(&mut *self.tx, account_number).await
    }

    /// Insert a new wallet.
    pub async fn insert(&mut self, wallet: &Wallet) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO wallets (id, account_number, user_name, total_inventory, blocked_inventory, withdrawal_balance, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(wallet.id.to_string())
        .bind(i64::from(wallet.account_number.get()))
        .bind(&wallet.user_name)
        .bind(wallet.total_inventory)
        .bind(wallet.blocked_inventory)
        .bind(wallet.withdrawal_balance)
        .bind(wallet.created_at.to_rfc3339())
        .bind(wallet.updated_at.to_rfc3339())
        .execute(&mut *self.tx)
        .await
        .context("Failed to save wallet")?;
        Ok(())
    }

    /// Persist the mutable fields of an existing wallet.
    pub async fn update(&mut self, wallet: &Wallet) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE wallets
            SET user_name = ?, total_inventory = ?, blocked_inventory = ?, withdrawal_balance = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&wallet.user_name)
        .bind(wallet.total_inventory)
        .bind(wallet.blocked_inventory)
        .bind(wallet.withdrawal_balance)
        .bind(wallet.updated_at.to_rfc3339())
        .bind(wallet.id.to_string())
        .execute(&mut *self.tx)
        .await
        .context("Failed to update wallet")?;

        if result.rows_affected() != 1 {
            bail!("Wallet {} vanished during update", wallet.id);
        }
        Ok(())
    }

    /// Permanently remove a wallet.
    pub async fn delete(&mut self, id: WalletId) -> Result<()> {
        sqlx::query("DELETE FROM wallets WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *self.tx)
            .await
            .context("Failed to delete wallet")?;
        Ok(())
    }

    pub async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .context("Failed to commit transaction")
    }
}

/// True when the error chain bottoms out in lock contention or pool
/// exhaustion, i.e. the same unit of work may succeed if retried.
pub fn is_contention(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| match cause.downcast_ref::<sqlx::Error>() {
            Some(sqlx::Error::Database(db)) => db
                .code()
                .is_some_and(|code| CONTENTION_CODES.iter().any(|c| *c == code)),
            Some(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        })
}

/// True when the error chain contains a UNIQUE constraint failure.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| match cause.downcast_ref::<sqlx::Error>() {
            Some(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        })
}

async fn fetch_by_id<'e, E>(executor: E, id: WalletId) -> Result<Option<Wallet>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(SELECT_BY_ID)
        .bind(id.to_string())
        .fetch_optional(executor)
        .await
        .context("Failed to fetch wallet")?;

    row.as_ref().map(row_to_wallet).transpose()
}

async fn fetch_by_account_number<'e, E>(
    executor: E,
    account_number: AccountNumber,
) -> Result<Option<Wallet>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(SELECT_BY_ACCOUNT_NUMBER)
        .bind(i64::from(account_number.get()))
        .fetch_optional(executor)
        .await
        .context("Failed to fetch wallet by account number")?;

    row.as_ref().map(row_to_wallet).transpose()
}

fn row_to_wallet(row: &SqliteRow) -> Result<Wallet> {
    let id_str: String = row.get("id");
    let account_number: i64 = row.get("account_number");
    let created_at_str: String = row.get("created_at");
    let updated_at_str: String = row.get("updated_at");

    Ok(Wallet {
        id: Uuid::parse_str(&id_str).context("Invalid wallet ID")?,
        account_number: AccountNumber::try_from(account_number)
            .context("Invalid account number")?,
        user_name: row.get("user_name"),
        total_inventory: row.get("total_inventory"),
        blocked_inventory: row.get("blocked_inventory"),
        withdrawal_balance: row.get("withdrawal_balance"),
        created_at: DateTime::parse_from_rfc3339(&created_at_str)
            .context("Invalid created_at timestamp")?
            .with_timezone(&Utc),
        updated_at: DateTime::parse_from_rfc3339(&updated_at_str)
            .context("Invalid updated_at timestamp")?
            .with_timezone(&Utc),
    })
}

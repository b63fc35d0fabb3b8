use serde::Serialize;
use thiserror::Error;

use crate::domain::{AccountNumber, Amount, WalletError, WalletId};
use crate::storage;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Wallet not found: {0}")]
    WalletNotFound(WalletId),

    #[error("No wallet with account number {0}")]
    AccountNotFound(AccountNumber),

    #[error("No source wallet with account number {0}")]
    SourceAccountNotFound(AccountNumber),

    #[error("No destination wallet with account number {0}")]
    DestinationAccountNotFound(AccountNumber),

    #[error("Account number {0} already exists")]
    DuplicateAccount(AccountNumber),

    #[error(
        "Insufficient funds in account {account_number}: withdrawal balance {available}, required {requested}"
    )]
    InsufficientFunds {
        account_number: AccountNumber,
        available: Amount,
        requested: Amount,
    },

    #[error("Cannot block {requested} in account {account_number}: the maximum blockable amount is {total}")]
    ExceedsTotal {
        account_number: AccountNumber,
        total: Amount,
        requested: Amount,
    },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Concurrent update conflict")]
    ConcurrencyConflict,

    #[error("Gave up on {operation} after {attempts} conflicting attempts")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
    },

    #[error("Database error: {0}")]
    Database(anyhow::Error),
}

/// Coarse classification of a [`LedgerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    DuplicateAccount,
    InsufficientFunds,
    ExceedsTotal,
    Validation,
    ConcurrencyConflict,
    Internal,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::WalletNotFound(_)
            | LedgerError::AccountNotFound(_)
            | LedgerError::SourceAccountNotFound(_)
            | LedgerError::DestinationAccountNotFound(_) => ErrorKind::NotFound,
            LedgerError::DuplicateAccount(_) => ErrorKind::DuplicateAccount,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::ExceedsTotal { .. } => ErrorKind::ExceedsTotal,
            LedgerError::Validation(_) => ErrorKind::Validation,
            LedgerError::ConcurrencyConflict => ErrorKind::ConcurrencyConflict,
            LedgerError::RetriesExhausted { .. } | LedgerError::Database(_) => ErrorKind::Internal,
        }
    }

    /// True for failures the caller caused; these are safe to show verbatim.
    pub fn is_business(&self) -> bool {
        !matches!(
            self.kind(),
            ErrorKind::ConcurrencyConflict | ErrorKind::Internal
        )
    }

    /// Attach the account to a rule violation raised by the wallet itself.
    pub fn from_wallet(account_number: AccountNumber, err: WalletError) -> Self {
        match err {
            WalletError::InsufficientFunds {
                available,
                requested,
            } => LedgerError::InsufficientFunds {
                account_number,
                available,
                requested,
            },
            WalletError::ExceedsTotal { total, requested } => LedgerError::ExceedsTotal {
                account_number,
                total,
                requested,
            },
            other => LedgerError::Validation(other.to_string()),
        }
    }
}

impl From<WalletError> for LedgerError {
    fn from(err: WalletError) -> Self {
        LedgerError::Validation(err.to_string())
    }
}

impl From<anyhow::Error> for LedgerError {
    fn from(err: anyhow::Error) -> Self {
        if storage::is_contention(&err) {
            LedgerError::ConcurrencyConflict
        } else {
            LedgerError::Database(err)
        }
    }
}

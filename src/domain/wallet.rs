use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Amount, checked_credit, checked_debit};

pub type WalletId = Uuid;

/// Six-digit external account key. Immutable once a wallet is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct AccountNumber(u32);

impl AccountNumber {
    pub const MIN: u32 = 100_000;
    pub const MAX: u32 = 999_999;

    pub fn new(value: u32) -> Result<Self, WalletError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(WalletError::InvalidAccountNumber(i64::from(value)))
        }
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for AccountNumber {
    type Error = WalletError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<i64> for AccountNumber {
    type Error = WalletError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u32::try_from(value)
            .map_err(|_| WalletError::InvalidAccountNumber(value))
            .and_then(Self::new)
    }
}

impl From<AccountNumber> for u32 {
    fn from(account_number: AccountNumber) -> Self {
        account_number.0
    }
}

impl FromStr for AccountNumber {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: i64 = s
            .trim()
            .parse()
            .map_err(|_| WalletError::MalformedAccountNumber(s.to_string()))?;
        Self::try_from(value)
    }
}

impl fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wallet {
    pub id: WalletId,
    pub account_number: AccountNumber,
    pub user_name: String,
    /// Gross balance.
    pub total_inventory: Amount,
    /// Portion of the total that is frozen.
    pub blocked_inventory: Amount,
    /// Spendable balance, always `total_inventory - blocked_inventory`.
    pub withdrawal_balance: Amount,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Build a new wallet, deriving the withdrawal balance from the total and
    /// blocked amounts.
    pub fn new(
        account_number: AccountNumber,
        user_name: impl Into<String>,
        total_inventory: Amount,
        blocked_inventory: Amount,
    ) -> Result<Self, WalletError> {
        let user_name = validate_user_name(user_name.into())?;
        if total_inventory < 0 {
            return Err(WalletError::NegativeAmount(total_inventory));
        }
        if blocked_inventory < 0 {
            return Err(WalletError::NegativeAmount(blocked_inventory));
        }
        if blocked_inventory > total_inventory {
            return Err(WalletError::ExceedsTotal {
                total: total_inventory,
                requested: blocked_inventory,
            });
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            account_number,
            user_name,
            total_inventory,
            blocked_inventory,
            withdrawal_balance: total_inventory - blocked_inventory,
            created_at: now,
            updated_at: now,
        })
    }

    /// Credit `amount` to both the total and the spendable balance.
    pub fn deposit(&mut self, amount: Amount) -> Result<(), WalletError> {
        ensure_positive(amount)?;
        let total = checked_credit(self.total_inventory, amount).ok_or(WalletError::Overflow)?;
        let withdrawal =
            checked_credit(self.withdrawal_balance, amount).ok_or(WalletError::Overflow)?;

        self.total_inventory = total;
        self.withdrawal_balance = withdrawal;
        self.touch();
        Ok(())
    }

    /// Debit `amount` from both the total and the spendable balance.
    pub fn withdraw(&mut self, amount: Amount) -> Result<(), WalletError> {
        self.ensure_spendable(amount)?;
        self.debit(amount)?;
        self.touch();
        Ok(())
    }

    /// Set the blocked amount (absolute, not a delta) and recompute the
    /// spendable balance.
    pub fn block(&mut self, blocked_inventory: Amount) -> Result<(), WalletError> {
        if blocked_inventory < 0 {
            return Err(WalletError::NegativeAmount(blocked_inventory));
        }
        if blocked_inventory > self.total_inventory {
            return Err(WalletError::ExceedsTotal {
                total: self.total_inventory,
                requested: blocked_inventory,
            });
        }

        self.blocked_inventory = blocked_inventory;
        self.withdrawal_balance = self.total_inventory - blocked_inventory;
        self.touch();
        Ok(())
    }

    pub fn rename(&mut self, user_name: impl Into<String>) -> Result<(), WalletError> {
        self.user_name = validate_user_name(user_name.into())?;
        self.touch();
        Ok(())
    }

    /// Check that `amount` is positive and covered by the spendable balance.
    pub fn ensure_spendable(&self, amount: Amount) -> Result<(), WalletError> {
        ensure_positive(amount)?;
        if amount > self.withdrawal_balance {
            return Err(WalletError::InsufficientFunds {
                available: self.withdrawal_balance,
                requested: amount,
            });
        }
        Ok(())
    }

    /// Verify the balance invariants hold for this wallet.
    pub fn check_invariants(&self) -> Result<(), WalletError> {
        if self.total_inventory < 0 || self.withdrawal_balance < 0 {
            return Err(WalletError::InvariantViolated(
                "balances must be non-negative",
            ));
        }
        if self.blocked_inventory < 0 || self.blocked_inventory > self.total_inventory {
            return Err(WalletError::InvariantViolated(
                "blocked inventory must be within 0..=total",
            ));
        }
        if self.withdrawal_balance != self.total_inventory - self.blocked_inventory {
            return Err(WalletError::InvariantViolated(
                "withdrawal balance must equal total minus blocked",
            ));
        }
        Ok(())
    }

    /// Remove `amount` from both balances. Callers check spendability first;
    /// a debit that would still go below zero leaves the wallet untouched.
    fn debit(&mut self, amount: Amount) -> Result<(), WalletError> {
        let total = checked_debit(self.total_inventory, amount)
            .ok_or(WalletError::InvariantViolated("debit exceeds total inventory"))?;
        let withdrawal = checked_debit(self.withdrawal_balance, amount).ok_or(
            WalletError::InvariantViolated("debit exceeds withdrawal balance"),
        )?;

        self.total_inventory = total;
        self.withdrawal_balance = withdrawal;
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Move `amount` from `from` to `to`. Both wallets are validated before either
/// is touched, so a failure leaves both unchanged.
pub fn transfer_between(
    from: &mut Wallet,
    to: &mut Wallet,
    amount: Amount,
) -> Result<(), WalletError> {
    from.ensure_spendable(amount)?;
    let to_total = checked_credit(to.total_inventory, amount).ok_or(WalletError::Overflow)?;
    let to_withdrawal =
        checked_credit(to.withdrawal_balance, amount).ok_or(WalletError::Overflow)?;

    from.debit(amount)?;
    from.touch();
    to.total_inventory = to_total;
    to.withdrawal_balance = to_withdrawal;
    to.touch();
    Ok(())
}

fn ensure_positive(amount: Amount) -> Result<(), WalletError> {
    if amount <= 0 {
        return Err(WalletError::NonPositiveAmount(amount));
    }
    Ok(())
}

fn validate_user_name(user_name: String) -> Result<String, WalletError> {
    let trimmed = user_name.trim();
    if trimmed.is_empty() {
        return Err(WalletError::EmptyUserName);
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    InvalidAccountNumber(i64),
    MalformedAccountNumber(String),
    EmptyUserName,
    NonPositiveAmount(Amount),
    NegativeAmount(Amount),
    InsufficientFunds { available: Amount, requested: Amount },
    ExceedsTotal { total: Amount, requested: Amount },
    Overflow,
    InvariantViolated(&'static str),
}

impl fmt::Display for WalletError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletError::InvalidAccountNumber(n) => write!(
                f,
                "account number {} must be a six-digit number ({}-{})",
                n,
                AccountNumber::MIN,
                AccountNumber::MAX
            ),
            WalletError::MalformedAccountNumber(s) => {
                write!(f, "'{}' is not a valid account number", s)
            }
            WalletError::EmptyUserName => write!(f, "user name must not be empty"),
            WalletError::NonPositiveAmount(a) => {
                write!(f, "amount must be greater than zero, got {}", a)
            }
            WalletError::NegativeAmount(a) => write!(f, "amount must not be negative, got {}", a),
            WalletError::InsufficientFunds {
                available,
                requested,
            } => write!(
                f,
                "insufficient funds: available {}, requested {}",
                available, requested
            ),
            WalletError::ExceedsTotal { total, requested } => write!(
                f,
                "cannot block {}: the maximum blockable amount is {}",
                requested, total
            ),
            WalletError::Overflow => write!(f, "balance would overflow"),
            WalletError::InvariantViolated(what) => write!(f, "invariant violated: {}", what),
        }
    }
}

impl std::error::Error for WalletError {}

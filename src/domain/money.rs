/// Balances are integer amounts in the smallest currency unit.
/// No currency is attached; 1 unit is whatever the deployment says it is.
pub type Amount = i64;

/// Add `amount` to `balance`, refusing to wrap.
pub fn checked_credit(balance: Amount, amount: Amount) -> Option<Amount> {
    balance.checked_add(amount)
}

/// Subtract `amount` from `balance`, refusing to go below zero.
pub fn checked_debit(balance: Amount, amount: Amount) -> Option<Amount> {
    balance.checked_sub(amount).filter(|remaining| *remaining >= 0)
}

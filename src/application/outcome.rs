use serde::Serialize;
use tracing::error;

use crate::domain::Amount;

use super::{ErrorKind, LedgerError};

pub const SUCCESS_MESSAGE: &str = "Completed successfully";
pub const INTERNAL_ERROR_MESSAGE: &str = "The operation could not be completed, please try again";

/// What a caller of the ledger receives: success flag, optional payload and a
/// human-readable message. Carries no transport concepts.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: String,
    /// Failure classification, absent on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

impl<T> Outcome<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: SUCCESS_MESSAGE.to_string(),
            error: None,
        }
    }

    pub fn failed(err: &LedgerError) -> Self {
        let message = if err.is_business() {
            err.to_string()
        } else {
            error!(error = %err, kind = ?err.kind(), "ledger operation failed");
            INTERNAL_ERROR_MESSAGE.to_string()
        };

        Self {
            success: false,
            data: None,
            message,
            error: Some(err.kind()),
        }
    }

    pub fn from_result(result: Result<T, LedgerError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::failed(&err),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            success: self.success,
            data: self.data.map(f),
            message: self.message,
            error: self.error,
        }
    }
}

impl Outcome<Amount> {
    /// Like [`Outcome::from_result`], but the payload is always a number:
    /// failures report a balance of zero. Check `success`, not the number.
    pub fn balance(result: Result<Amount, LedgerError>) -> Self {
        let mut outcome = Self::from_result(result);
        if outcome.data.is_none() {
            outcome.data = Some(0);
        }
        outcome
    }
}

impl<T> From<Result<T, LedgerError>> for Outcome<T> {
    fn from(result: Result<T, LedgerError>) -> Self {
        Self::from_result(result)
    }
}

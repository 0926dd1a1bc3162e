use thiserror::Error;

use crate::context::Interrupted;
use crate::domain::{AccountId, Currency, MinorUnits};
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Transfer not found: {0}")]
    TransferNotFound(i64),

    #[error("Account [{account_id}] currency mismatch: {actual} vs {expected}")]
    CurrencyMismatch {
        account_id: AccountId,
        expected: Currency,
        actual: Currency,
    },

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(MinorUnits),

    #[error("Invalid account id: {0}")]
    InvalidAccountId(AccountId),

    #[error("Cannot transfer from account {0} to itself")]
    SameAccount(AccountId),

    #[error("Owner must not be empty")]
    EmptyOwner,

    #[error("Invalid page: page_id must be >= 1 and page_size between {min} and {max}")]
    InvalidPage { min: i64, max: i64 },

    #[error("Invalid limit: {0} (must be at least 1)")]
    InvalidLimit(i64),

    #[error("Request interrupted: {0}")]
    Interrupted(Interrupted),

    #[error("Database error: {0}")]
    Store(StoreError),
}

impl AppError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AppError::AccountNotFound(_) | AppError::TransferNotFound(_)
        )
    }

    /// True for failures caused by the request itself rather than the system.
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            AppError::CurrencyMismatch { .. }
                | AppError::UnsupportedCurrency(_)
                | AppError::InvalidAmount(_)
                | AppError::InvalidAccountId(_)
                | AppError::SameAccount(_)
                | AppError::EmptyOwner
                | AppError::InvalidPage { .. }
                | AppError::InvalidLimit(_)
        )
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound {
                entity: "account",
                id,
            } => AppError::AccountNotFound(id),
            StoreError::NotFound {
                entity: "transfer",
                id,
            } => AppError::TransferNotFound(id),
            StoreError::SameAccount(id) => AppError::SameAccount(id),
            StoreError::Interrupted(reason) => AppError::Interrupted(reason),
            other => AppError::Store(other),
        }
    }
}

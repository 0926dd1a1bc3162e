use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::domain::{
    Account, AccountId, Currency, Entry, EntryId, MinorUnits, Transfer, TransferId,
};

use super::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAccountParams {
    pub owner: String,
    /// Starting balance, also kept as the account's opening balance.
    pub balance: MinorUnits,
    pub currency: Currency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListAccountsParams {
    pub limit: i64,
    pub offset: i64,
}

/// Sets the balance of account `id` to exactly `balance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateAccountParams {
    pub id: AccountId,
    pub balance: MinorUnits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateEntryParams {
    pub account_id: AccountId,
    pub amount: MinorUnits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListEntriesParams {
    pub account_id: AccountId,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateTransferParams {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: MinorUnits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListTransfersParams {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub limit: i64,
    pub offset: i64,
}

/// Single-row ledger operations, available both on the pool and inside an
/// atomic scope.
///
/// Lookups of a missing row fail with [`StoreError::NotFound`]; creating a
/// row that references a missing account fails with `NotFound` for that
/// account rather than a bare foreign-key error.
#[async_trait]
pub trait Queries: Send + Sync {
    async fn create_account(
        &self,
        ctx: &Context,
        params: CreateAccountParams,
    ) -> Result<Account, StoreError>;

    async fn get_account(&self, ctx: &Context, id: AccountId) -> Result<Account, StoreError>;

    async fn list_accounts(
        &self,
        ctx: &Context,
        params: ListAccountsParams,
    ) -> Result<Vec<Account>, StoreError>;

    async fn update_account(
        &self,
        ctx: &Context,
        params: UpdateAccountParams,
    ) -> Result<Account, StoreError>;

    async fn create_entry(
        &self,
        ctx: &Context,
        params: CreateEntryParams,
    ) -> Result<Entry, StoreError>;

    async fn get_entry(&self, ctx: &Context, id: EntryId) -> Result<Entry, StoreError>;

    async fn list_entries(
        &self,
        ctx: &Context,
        params: ListEntriesParams,
    ) -> Result<Vec<Entry>, StoreError>;

    async fn create_transfer(
        &self,
        ctx: &Context,
        params: CreateTransferParams,
    ) -> Result<Transfer, StoreError>;

    async fn get_transfer(&self, ctx: &Context, id: TransferId) -> Result<Transfer, StoreError>;

    async fn list_transfers(
        &self,
        ctx: &Context,
        params: ListTransfersParams,
    ) -> Result<Vec<Transfer>, StoreError>;
}

/// Operations that only make sense inside an atomic scope.
#[async_trait]
pub trait TxQueries: Queries {
    /// Read an account and hold its lock until the scope commits or rolls back.
    /// Any other scope locking or updating the same account waits until then.
    async fn get_account_for_update(
        &self,
        ctx: &Context,
        id: AccountId,
    ) -> Result<Account, StoreError>;
}

/// Turn a foreign-key failure on insert into `NotFound` for the first
/// referenced account that does not exist. Other errors pass through, and an
/// interruption during the lookup replaces the constraint failure.
pub(super) async fn resolve_missing_account<Q>(
    queries: &Q,
    ctx: &Context,
    referenced: &[AccountId],
    err: StoreError,
) -> StoreError
where
    Q: Queries + ?Sized,
{
    if !err.is_foreign_key_violation() {
        return err;
    }

    for &id in referenced {
        match queries.get_account(ctx, id).await {
            Ok(_) => continue,
            Err(lookup_err) if lookup_err.is_not_found() => return lookup_err,
            Err(lookup_err @ StoreError::Interrupted(_)) => return lookup_err,
            Err(_) => break,
        }
    }

    err
}

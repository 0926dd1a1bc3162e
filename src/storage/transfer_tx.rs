use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::context::Context;
use crate::domain::{Account, AccountId, Entry, MinorUnits, Transfer};

use super::{
    CreateEntryParams, CreateTransferParams, ConstraintKind, Store, StoreError, TxQueries,
    UpdateAccountParams,
};

/// Input of a money transfer. The caller guarantees `amount > 0` and that
/// both accounts share a currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTxParams {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: MinorUnits,
}

/// Everything a committed transfer produced. Accounts carry their post-update balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTxResult {
    pub transfer: Transfer,
    pub from_account: Account,
    pub to_account: Account,
    pub from_entry: Entry,
    pub to_entry: Entry,
}

impl Store {
    /// Move `amount` from one account to another in a single atomic scope:
    /// record the transfer, write both entries, then update both balances.
    ///
    /// Self-transfers are refused before any scope is opened.
    #[instrument(
        skip(self, ctx, params),
        fields(from = params.from_account_id, to = params.to_account_id, amount = params.amount)
    )]
    pub async fn transfer_tx(
        &self,
        ctx: &Context,
        params: TransferTxParams,
    ) -> Result<TransferTxResult, StoreError> {
        if params.from_account_id == params.to_account_id {
            return Err(StoreError::SameAccount(params.from_account_id));
        }

        let result = self
            .run_atomic(ctx, move |tx, ctx| {
                Box::pin(async move { execute_transfer(tx, ctx, params).await })
            })
            .await?;

        debug!(transfer_id = result.transfer.id, "transfer committed");
        Ok(result)
    }
}

/// The transfer steps, run against an already-open scope.
///
/// Account locks are taken in ascending id order whatever the direction, so
/// two transfers between the same pair of accounts always contend for the
/// same first lock and cannot wait on each other in a cycle.
pub async fn execute_transfer<Q>(
    tx: &Q,
    ctx: &Context,
    params: TransferTxParams,
) -> Result<TransferTxResult, StoreError>
where
    Q: TxQueries + ?Sized,
{
    let TransferTxParams {
        from_account_id,
        to_account_id,
        amount,
    } = params;

    let transfer = tx
        .create_transfer(
            ctx,
            CreateTransferParams {
                from_account_id,
                to_account_id,
                amount,
            },
        )
        .await?;

    let from_entry = tx
        .create_entry(
            ctx,
            CreateEntryParams {
                account_id: from_account_id,
                amount: -amount,
            },
        )
        .await?;

    let to_entry = tx
        .create_entry(
            ctx,
            CreateEntryParams {
                account_id: to_account_id,
                amount,
            },
        )
        .await?;

    let (from_account, to_account) = if from_account_id < to_account_id {
        let from_account = add_money(tx, ctx, from_account_id, -amount).await?;
        let to_account = add_money(tx, ctx, to_account_id, amount).await?;
        (from_account, to_account)
    } else {
        let to_account = add_money(tx, ctx, to_account_id, amount).await?;
        let from_account = add_money(tx, ctx, from_account_id, -amount).await?;
        (from_account, to_account)
    };

    Ok(TransferTxResult {
        transfer,
        from_account,
        to_account,
        from_entry,
        to_entry,
    })
}

/// Lock one account and persist `balance + delta`.
async fn add_money<Q>(
    tx: &Q,
    ctx: &Context,
    account_id: AccountId,
    delta: MinorUnits,
) -> Result<Account, StoreError>
where
    Q: TxQueries + ?Sized,
{
    let account = tx.get_account_for_update(ctx, account_id).await?;

    let balance = account
        .balance
        .checked_add(delta)
        .ok_or_else(|| StoreError::Constraint {
            kind: ConstraintKind::Check,
            operation: "transfer_tx",
            message: format!("balance of account {} would overflow", account_id),
        })?;

    tx.update_account(
        ctx,
        UpdateAccountParams {
            id: account_id,
            balance,
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::domain::{Currency, EntryId, TransferId};
    use crate::storage::{
        CreateAccountParams, ListAccountsParams, ListEntriesParams, ListTransfersParams, Queries,
    };

    /// In-memory scope that records the order in which accounts get locked.
    #[derive(Default)]
    struct RecordingTx {
        accounts: Mutex<HashMap<AccountId, Account>>,
        next_id: Mutex<i64>,
        locked: Mutex<Vec<AccountId>>,
        fail_lock_on: Option<AccountId>,
    }

    impl RecordingTx {
        fn with_accounts(balances: &[(AccountId, MinorUnits)]) -> Self {
            let accounts = balances
                .iter()
                .map(|&(id, balance)| {
                    let account = Account {
                        id,
                        owner: format!("owner-{}", id),
                        balance,
                        currency: Currency::Eur,
                        created_at: Utc::now(),
                    };
                    (id, account)
                })
                .collect();
            Self {
                accounts: Mutex::new(accounts),
                ..Default::default()
            }
        }

        fn next_id(&self) -> i64 {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            *next
        }

        fn locked(&self) -> Vec<AccountId> {
            self.locked.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Queries for RecordingTx {
        async fn create_account(
            &self,
            _ctx: &Context,
            _params: CreateAccountParams,
        ) -> Result<Account, StoreError> {
            unimplemented!("not used by transfers")
        }

        async fn get_account(&self, _ctx: &Context, id: AccountId) -> Result<Account, StoreError> {
            self.accounts
                .lock()
                .unwrap()
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("account", id))
        }

        async fn list_accounts(
            &self,
            _ctx: &Context,
            _params: ListAccountsParams,
        ) -> Result<Vec<Account>, StoreError> {
            unimplemented!("not used by transfers")
        }

        async fn update_account(
            &self,
            _ctx: &Context,
            params: UpdateAccountParams,
        ) -> Result<Account, StoreError> {
            let mut accounts = self.accounts.lock().unwrap();
            let account = accounts
                .get_mut(&params.id)
                .ok_or_else(|| StoreError::not_found("account", params.id))?;
            account.balance = params.balance;
            Ok(account.clone())
        }

        async fn create_entry(
            &self,
            _ctx: &Context,
            params: CreateEntryParams,
        ) -> Result<Entry, StoreError> {
            Ok(Entry {
                id: self.next_id(),
                account_id: params.account_id,
                amount: params.amount,
                created_at: Utc::now(),
            })
        }

        async fn get_entry(&self, _ctx: &Context, _id: EntryId) -> Result<Entry, StoreError> {
            unimplemented!("not used by transfers")
        }

        async fn list_entries(
            &self,
            _ctx: &Context,
            _params: ListEntriesParams,
        ) -> Result<Vec<Entry>, StoreError> {
            unimplemented!("not used by transfers")
        }

        async fn create_transfer(
            &self,
            _ctx: &Context,
            params: CreateTransferParams,
        ) -> Result<Transfer, StoreError> {
            Ok(Transfer {
                id: self.next_id(),
                from_account_id: params.from_account_id,
                to_account_id: params.to_account_id,
                amount: params.amount,
                created_at: Utc::now(),
            })
        }

        async fn get_transfer(
            &self,
            _ctx: &Context,
            _id: TransferId,
        ) -> Result<Transfer, StoreError> {
            unimplemented!("not used by transfers")
        }

        async fn list_transfers(
            &self,
            _ctx: &Context,
            _params: ListTransfersParams,
        ) -> Result<Vec<Transfer>, StoreError> {
            unimplemented!("not used by transfers")
        }
    }

    #[async_trait]
    impl TxQueries for RecordingTx {
        async fn get_account_for_update(
            &self,
            ctx: &Context,
            id: AccountId,
        ) -> Result<Account, StoreError> {
            if self.fail_lock_on == Some(id) {
                return Err(StoreError::Busy {
                    operation: "get_account_for_update",
                    message: "forced".into(),
                });
            }
            self.locked.lock().unwrap().push(id);
            self.get_account(ctx, id).await
        }
    }

    fn params(from: AccountId, to: AccountId, amount: MinorUnits) -> TransferTxParams {
        TransferTxParams {
            from_account_id: from,
            to_account_id: to,
            amount,
        }
    }

    #[tokio::test]
    async fn test_locks_ascending_when_from_is_lower() {
        let tx = RecordingTx::with_accounts(&[(1, 100), (2, 50)]);
        let ctx = Context::background();

        execute_transfer(&tx, &ctx, params(1, 2, 30)).await.unwrap();

        assert_eq!(tx.locked(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_locks_ascending_when_from_is_higher() {
        let tx = RecordingTx::with_accounts(&[(1, 100), (2, 50)]);
        let ctx = Context::background();

        let result = execute_transfer(&tx, &ctx, params(2, 1, 30)).await.unwrap();

        assert_eq!(tx.locked(), vec![1, 2]);
        assert_eq!(result.from_account.id, 2);
        assert_eq!(result.from_account.balance, 20);
        assert_eq!(result.to_account.id, 1);
        assert_eq!(result.to_account.balance, 130);
    }

    #[tokio::test]
    async fn test_entries_mirror_amount() {
        let tx = RecordingTx::with_accounts(&[(7, 0), (3, 0)]);
        let ctx = Context::background();

        let result = execute_transfer(&tx, &ctx, params(7, 3, 45)).await.unwrap();

        assert_eq!(result.transfer.amount, 45);
        assert_eq!(result.from_entry.account_id, 7);
        assert_eq!(result.from_entry.amount, -45);
        assert_eq!(result.to_entry.account_id, 3);
        assert_eq!(result.to_entry.amount, 45);
        assert_eq!(result.from_entry.amount + result.to_entry.amount, 0);
        // Overdraft is not checked by the core.
        assert_eq!(result.from_account.balance, -45);
    }

    #[tokio::test]
    async fn test_lock_failure_stops_remaining_updates() {
        let mut tx = RecordingTx::with_accounts(&[(1, 100), (2, 50)]);
        tx.fail_lock_on = Some(2);
        let ctx = Context::background();

        let err = execute_transfer(&tx, &ctx, params(1, 2, 30)).await.unwrap_err();

        assert!(matches!(err, StoreError::Busy { .. }));
        assert_eq!(tx.locked(), vec![1]);
    }

    #[tokio::test]
    async fn test_balance_overflow_is_rejected() {
        let tx = RecordingTx::with_accounts(&[(1, 0), (2, i64::MAX)]);
        let ctx = Context::background();

        let err = execute_transfer(&tx, &ctx, params(1, 2, 1)).await.unwrap_err();

        assert!(matches!(
            err,
            StoreError::Constraint {
                kind: ConstraintKind::Check,
                ..
            }
        ));
    }
}

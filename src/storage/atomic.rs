//! Atomic scopes: run a unit of work inside one database transaction and
//! commit it only if every step succeeded.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use sqlx::{Sqlite, Transaction};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::context::Context;
use crate::domain::{Account, AccountId, Entry, EntryId, Transfer, TransferId};

use super::queries::resolve_missing_account;
use super::{
    sql, CreateAccountParams, CreateEntryParams, CreateTransferParams, ListAccountsParams,
    ListEntriesParams, ListTransfersParams, Queries, Store, StoreError, TxQueries,
    UpdateAccountParams,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Scope-bound store handle. Every operation runs inside the open transaction.
///
/// Only obtainable through [`Store::run_atomic`], which also decides whether
/// the transaction commits or rolls back.
pub struct Tx {
    conn: Mutex<Transaction<'static, Sqlite>>,
}

impl Store {
    /// Run `work` inside a new atomic scope.
    ///
    /// * `work` succeeds: the scope commits and its value is returned.
    /// * `work` fails: the scope rolls back and the failure is returned
    ///   unchanged, or as [`StoreError::Rollback`] if the rollback failed too.
    /// * `ctx` finishes before commit: the scope rolls back and the
    ///   interruption is returned.
    ///
    /// Nothing is retried here.
    #[instrument(skip_all)]
    pub async fn run_atomic<T, F>(&self, ctx: &Context, work: F) -> Result<T, StoreError>
    where
        T: Send,
        F: for<'t> FnOnce(&'t Tx, &'t Context) -> BoxFuture<'t, Result<T, StoreError>> + Send,
    {
        let transaction = ctx
            .run(async {
                self.pool()
                    .begin()
                    .await
                    .map_err(|e| StoreError::from_sqlx("begin", e))
            })
            .await?;
        debug!("scope opened");

        let tx = Tx {
            conn: Mutex::new(transaction),
        };

        let outcome = match work(&tx, ctx).await {
            Ok(value) => match ctx.err() {
                Some(reason) => Err(StoreError::from(reason)),
                None => Ok(value),
            },
            Err(err) => Err(err),
        };

        let transaction = tx.conn.into_inner();
        match outcome {
            Ok(value) => {
                transaction
                    .commit()
                    .await
                    .map_err(|e| StoreError::from_sqlx("commit", e))?;
                debug!("scope committed");
                Ok(value)
            }
            Err(err) => {
                let rollback = transaction
                    .rollback()
                    .await
                    .map_err(|e| StoreError::from_sqlx("rollback", e));
                warn!(error = %err, rollback_failed = rollback.is_err(), "scope rolled back");
                Err(err.with_rollback(rollback))
            }
        }
    }
}

#[async_trait]
impl Queries for Tx {
    async fn create_account(
        &self,
        ctx: &Context,
        params: CreateAccountParams,
    ) -> Result<Account, StoreError> {
        ctx.run(async {
            let mut conn = self.conn.lock().await;
            sql::insert_account(&mut **conn, &params)
                .await
                .map_err(|e| StoreError::from_sqlx("create_account", e))
        })
        .await
    }

    async fn get_account(&self, ctx: &Context, id: AccountId) -> Result<Account, StoreError> {
        ctx.run(async {
            let mut conn = self.conn.lock().await;
            sql::select_account(&mut **conn, id)
                .await
                .map_err(|e| StoreError::from_sqlx("get_account", e))?
                .ok_or_else(|| StoreError::not_found("account", id))
        })
        .await
    }

    async fn list_accounts(
        &self,
        ctx: &Context,
        params: ListAccountsParams,
    ) -> Result<Vec<Account>, StoreError> {
        ctx.run(async {
            let mut conn = self.conn.lock().await;
            sql::select_accounts(&mut **conn, &params)
                .await
                .map_err(|e| StoreError::from_sqlx("list_accounts", e))
        })
        .await
    }

    async fn update_account(
        &self,
        ctx: &Context,
        params: UpdateAccountParams,
    ) -> Result<Account, StoreError> {
        ctx.run(async {
            let mut conn = self.conn.lock().await;
            sql::update_account_balance(&mut **conn, &params)
                .await
                .map_err(|e| StoreError::from_sqlx("update_account", e))?
                .ok_or_else(|| StoreError::not_found("account", params.id))
        })
        .await
    }

    async fn create_entry(
        &self,
        ctx: &Context,
        params: CreateEntryParams,
    ) -> Result<Entry, StoreError> {
        let result = ctx
            .run(async {
                let mut conn = self.conn.lock().await;
                sql::insert_entry(&mut **conn, &params)
                    .await
                    .map_err(|e| StoreError::from_sqlx("create_entry", e))
            })
            .await;

        match result {
            Ok(entry) => Ok(entry),
            Err(err) => Err(resolve_missing_account(self, ctx, &[params.account_id], err).await),
        }
    }

    async fn get_entry(&self, ctx: &Context, id: EntryId) -> Result<Entry, StoreError> {
        ctx.run(async {
            let mut conn = self.conn.lock().await;
            sql::select_entry(&mut **conn, id)
                .await
                .map_err(|e| StoreError::from_sqlx("get_entry", e))?
                .ok_or_else(|| StoreError::not_found("entry", id))
        })
        .await
    }

    async fn list_entries(
        &self,
        ctx: &Context,
        params: ListEntriesParams,
    ) -> Result<Vec<Entry>, StoreError> {
        ctx.run(async {
            let mut conn = self.conn.lock().await;
            sql::select_entries(&mut **conn, &params)
                .await
                .map_err(|e| StoreError::from_sqlx("list_entries", e))
        })
        .await
    }

    async fn create_transfer(
        &self,
        ctx: &Context,
        params: CreateTransferParams,
    ) -> Result<Transfer, StoreError> {
        let result = ctx
            .run(async {
                let mut conn = self.conn.lock().await;
                sql::insert_transfer(&mut **conn, &params)
                    .await
                    .map_err(|e| StoreError::from_sqlx("create_transfer", e))
            })
            .await;

        match result {
            Ok(transfer) => Ok(transfer),
            Err(err) => {
                let referenced = [params.from_account_id, params.to_account_id];
                Err(resolve_missing_account(self, ctx, &referenced, err).await)
            }
        }
    }

    async fn get_transfer(&self, ctx: &Context, id: TransferId) -> Result<Transfer, StoreError> {
        ctx.run(async {
            let mut conn = self.conn.lock().await;
            sql::select_transfer(&mut **conn, id)
                .await
                .map_err(|e| StoreError::from_sqlx("get_transfer", e))?
                .ok_or_else(|| StoreError::not_found("transfer", id))
        })
        .await
    }

    async fn list_transfers(
        &self,
        ctx: &Context,
        params: ListTransfersParams,
    ) -> Result<Vec<Transfer>, StoreError> {
        ctx.run(async {
            let mut conn = self.conn.lock().await;
            sql::select_transfers(&mut **conn, &params)
                .await
                .map_err(|e| StoreError::from_sqlx("list_transfers", e))
        })
        .await
    }
}

#[async_trait]
impl TxQueries for Tx {
    async fn get_account_for_update(
        &self,
        ctx: &Context,
        id: AccountId,
    ) -> Result<Account, StoreError> {
        ctx.run(async {
            let mut conn = self.conn.lock().await;
            sql::select_account_for_update(&mut **conn, id)
                .await
                .map_err(|e| StoreError::from_sqlx("get_account_for_update", e))?
                .ok_or_else(|| StoreError::not_found("account", id))
        })
        .await
    }
}

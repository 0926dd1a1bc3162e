use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use crate::context::Context;
use crate::domain::{
    Account, AccountId, BalanceDrift, Entry, EntryId, IntegrityStats, Transfer, TransferId,
};

use super::queries::resolve_missing_account;
use super::{
    sql, CreateAccountParams, CreateEntryParams, CreateTransferParams, ListAccountsParams,
    ListEntriesParams, ListTransfersParams, Queries, StoreError, UpdateAccountParams,
    MIGRATION_001_INITIAL,
};

/// Connection settings for the SQLite pool.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub max_connections: u32,
    /// How long a writer waits for another scope's lock before giving up.
    pub busy_timeout: Duration,
    pub create_if_missing: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_connections: 8,
            busy_timeout: Duration::from_secs(5),
            create_if_missing: false,
        }
    }
}

/// Ledger store backed by a SQLite connection pool.
///
/// Implements [`Queries`] directly on the pool: each call runs as its own
/// implicit transaction. Use [`Store::run_atomic`] for multi-step work.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Create a new store with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL or path.
    pub async fn connect(database_url: &str, options: &StoreOptions) -> Result<Self, StoreError> {
        let connect_options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StoreError::from_sqlx("connect", e))?
            .create_if_missing(options.create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(options.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections)
            .connect_with(connect_options)
            .await
            .map_err(|e| StoreError::from_sqlx("connect", e))?;

        debug!(database_url, max_connections = options.max_connections, "connected");
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("migrate", e))?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str, options: &StoreOptions) -> Result<Self, StoreError> {
        let store = Self::connect(database_url, options).await?;
        store.migrate().await?;
        Ok(store)
    }

    pub(super) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Gather counters for a ledger integrity check.
    #[instrument(skip(self, ctx))]
    pub async fn integrity_stats(&self, ctx: &Context) -> Result<IntegrityStats, StoreError> {
        ctx.run(async {
            let accounts = sqlx::query(
                "SELECT COUNT(*) AS count, COALESCE(SUM(balance), 0) AS total FROM accounts",
            )
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("integrity_stats", e))?;

            let transfers = sqlx::query(
                r#"
                SELECT
                    COUNT(*) AS count,
                    COALESCE(SUM(CASE WHEN amount <= 0 THEN 1 ELSE 0 END), 0) AS invalid
                FROM transfers
                "#,
            )
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("integrity_stats", e))?;

            let entries = sqlx::query(
                "SELECT COUNT(*) AS count, COALESCE(SUM(amount), 0) AS total FROM entries",
            )
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("integrity_stats", e))?;

            let dangling: i64 = sqlx::query(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM entries e
                     WHERE NOT EXISTS (SELECT 1 FROM accounts a WHERE a.id = e.account_id))
                  + (SELECT COUNT(*) FROM transfers t
                     WHERE NOT EXISTS (SELECT 1 FROM accounts a WHERE a.id = t.from_account_id)
                        OR NOT EXISTS (SELECT 1 FROM accounts a WHERE a.id = t.to_account_id))
                    AS dangling
                "#,
            )
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("integrity_stats", e))?
            .get("dangling");

            let drifted_accounts = sqlx::query(
                r#"
                SELECT id, balance, expected
                FROM (
                    SELECT
                        a.id,
                        a.balance,
                        a.opening_balance
                          + COALESCE((SELECT SUM(e.amount) FROM entries e WHERE e.account_id = a.id), 0)
                          AS expected
                    FROM accounts a
                )
                WHERE balance != expected
                ORDER BY id
                "#,
            )
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("integrity_stats", e))?
            .iter()
            .map(|row| BalanceDrift {
                account_id: row.get("id"),
                balance: row.get("balance"),
                expected: row.get("expected"),
            })
            .collect();

            Ok(IntegrityStats {
                account_count: accounts.get("count"),
                total_balance: accounts.get("total"),
                transfer_count: transfers.get("count"),
                invalid_amounts: transfers.get("invalid"),
                entry_count: entries.get("count"),
                entry_total: entries.get("total"),
                dangling_references: dangling,
                drifted_accounts,
            })
        })
        .await
    }
}

#[async_trait]
impl Queries for Store {
    async fn create_account(
        &self,
        ctx: &Context,
        params: CreateAccountParams,
    ) -> Result<Account, StoreError> {
        ctx.run(async {
            sql::insert_account(&self.pool, &params)
                .await
                .map_err(|e| StoreError::from_sqlx("create_account", e))
        })
        .await
    }

    async fn get_account(&self, ctx: &Context, id: AccountId) -> Result<Account, StoreError> {
        ctx.run(async {
            sql::select_account(&self.pool, id)
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
            sql::select_accounts(&self.pool, &params)
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
            sql::update_account_balance(&self.pool, &params)
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
                sql::insert_entry(&self.pool, &params)
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
            sql::select_entry(&self.pool, id)
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
            sql::select_entries(&self.pool, &params)
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
                sql::insert_transfer(&self.pool, &params)
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
            sql::select_transfer(&self.pool, id)
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
            sql::select_transfers(&self.pool, &params)
                .await
                .map_err(|e| StoreError::from_sqlx("list_transfers", e))
        })
        .await
    }
}

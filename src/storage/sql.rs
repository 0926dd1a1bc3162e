//! Raw SQL for single-row ledger operations.
//!
//! Every function runs exactly one statement against any SQLite executor, so
//! the same code serves the pool (plain reads and writes) and an open
//! transaction (scope-bound handle).

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};

use crate::domain::{Account, AccountId, Currency, Entry, EntryId, Transfer, TransferId};

use super::{
    CreateAccountParams, CreateEntryParams, CreateTransferParams, ListAccountsParams,
    ListEntriesParams, ListTransfersParams, UpdateAccountParams,
};

// ========================
// Accounts
// ========================

pub(super) async fn insert_account<'e, E: SqliteExecutor<'e>>(
    executor: E,
    params: &CreateAccountParams,
) -> Result<Account, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO accounts (owner, balance, opening_balance, currency, created_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id, owner, balance, currency, created_at
        "#,
    )
    .bind(&params.owner)
    .bind(params.balance)
    .bind(params.balance)
    .bind(params.currency.as_str())
    .bind(Utc::now().to_rfc3339())
    .fetch_one(executor)
    .await?;

    row_to_account(&row)
}

pub(super) async fn select_account<'e, E: SqliteExecutor<'e>>(
    executor: E,
    id: AccountId,
) -> Result<Option<Account>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, owner, balance, currency, created_at
        FROM accounts
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(row_to_account).transpose()
}

/// Locking read. SQLite has no `SELECT ... FOR UPDATE`; a no-op write takes
/// the database write lock and holds it until the surrounding transaction ends.
pub(super) async fn select_account_for_update<'e, E: SqliteExecutor<'e>>(
    executor: E,
    id: AccountId,
) -> Result<Option<Account>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        UPDATE accounts
        SET balance = balance
        WHERE id = ?
        RETURNING id, owner, balance, currency, created_at
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(row_to_account).transpose()
}

pub(super) async fn select_accounts<'e, E: SqliteExecutor<'e>>(
    executor: E,
    params: &ListAccountsParams,
) -> Result<Vec<Account>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, owner, balance, currency, created_at
        FROM accounts
        ORDER BY id
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(params.limit)
    .bind(params.offset)
    .fetch_all(executor)
    .await?;

    rows.iter().map(row_to_account).collect()
}

pub(super) async fn update_account_balance<'e, E: SqliteExecutor<'e>>(
    executor: E,
    params: &UpdateAccountParams,
) -> Result<Option<Account>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        UPDATE accounts
        SET balance = ?
        WHERE id = ?
        RETURNING id, owner, balance, currency, created_at
        "#,
    )
    .bind(params.balance)
    .bind(params.id)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(row_to_account).transpose()
}

fn row_to_account(row: &SqliteRow) -> Result<Account, sqlx::Error> {
    let currency_code: String = row.try_get("currency")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Account {
        id: row.try_get("id")?,
        owner: row.try_get("owner")?,
        balance: row.try_get("balance")?,
        currency: Currency::from_code(&currency_code).ok_or_else(|| {
            sqlx::Error::Decode(format!("unsupported currency: {}", currency_code).into())
        })?,
        created_at: parse_timestamp(&created_at)?,
    })
}

// ========================
// Entries
// ========================

pub(super) async fn insert_entry<'e, E: SqliteExecutor<'e>>(
    executor: E,
    params: &CreateEntryParams,
) -> Result<Entry, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO entries (account_id, amount, created_at)
        VALUES (?, ?, ?)
        RETURNING id, account_id, amount, created_at
        "#,
    )
    .bind(params.account_id)
    .bind(params.amount)
    .bind(Utc::now().to_rfc3339())
    .fetch_one(executor)
    .await?;

    row_to_entry(&row)
}

pub(super) async fn select_entry<'e, E: SqliteExecutor<'e>>(
    executor: E,
    id: EntryId,
) -> Result<Option<Entry>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, account_id, amount, created_at
        FROM entries
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(row_to_entry).transpose()
}

pub(super) async fn select_entries<'e, E: SqliteExecutor<'e>>(
    executor: E,
    params: &ListEntriesParams,
) -> Result<Vec<Entry>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, account_id, amount, created_at
        FROM entries
        WHERE account_id = ?
        ORDER BY id
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(params.account_id)
    .bind(params.limit)
    .bind(params.offset)
    .fetch_all(executor)
    .await?;

    rows.iter().map(row_to_entry).collect()
}

fn row_to_entry(row: &SqliteRow) -> Result<Entry, sqlx::Error> {
    let created_at: String = row.try_get("created_at")?;

    Ok(Entry {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        amount: row.try_get("amount")?,
        created_at: parse_timestamp(&created_at)?,
    })
}

// ========================
// Transfers
// ========================

pub(super) async fn insert_transfer<'e, E: SqliteExecutor<'e>>(
    executor: E,
    params: &CreateTransferParams,
) -> Result<Transfer, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO transfers (from_account_id, to_account_id, amount, created_at)
        VALUES (?, ?, ?, ?)
        RETURNING id, from_account_id, to_account_id, amount, created_at
        "#,
    )
    .bind(params.from_account_id)
    .bind(params.to_account_id)
    .bind(params.amount)
    .bind(Utc::now().to_rfc3339())
    .fetch_one(executor)
    .await?;

    row_to_transfer(&row)
}

pub(super) async fn select_transfer<'e, E: SqliteExecutor<'e>>(
    executor: E,
    id: TransferId,
) -> Result<Option<Transfer>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, from_account_id, to_account_id, amount, created_at
        FROM transfers
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(row_to_transfer).transpose()
}

/// Transfers leaving `from_account_id` or arriving at `to_account_id`.
pub(super) async fn select_transfers<'e, E: SqliteExecutor<'e>>(
    executor: E,
    params: &ListTransfersParams,
) -> Result<Vec<Transfer>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, from_account_id, to_account_id, amount, created_at
        FROM transfers
        WHERE from_account_id = ? OR to_account_id = ?
        ORDER BY id
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(params.from_account_id)
    .bind(params.to_account_id)
    .bind(params.limit)
    .bind(params.offset)
    .fetch_all(executor)
    .await?;

    rows.iter().map(row_to_transfer).collect()
}

fn row_to_transfer(row: &SqliteRow) -> Result<Transfer, sqlx::Error> {
    let created_at: String = row.try_get("created_at")?;

    Ok(Transfer {
        id: row.try_get("id")?,
        from_account_id: row.try_get("from_account_id")?,
        to_account_id: row.try_get("to_account_id")?,
        amount: row.try_get("amount")?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;
use tesoro::application::BankService;
use tesoro::context::Context;
use tesoro::domain::{Account, AccountId, Currency, MinorUnits};
use tesoro::storage::{CreateAccountParams, Queries, Store, StoreOptions};

/// Options generous enough that concurrent tests never hit the busy timeout.
pub fn test_options() -> StoreOptions {
    StoreOptions {
        max_connections: 10,
        busy_timeout: Duration::from_secs(30),
        create_if_missing: true,
    }
}

/// Helper to create a migrated store on a temporary database
pub async fn test_store() -> Result<(Store, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let url = format!("sqlite:{}", db_path.display());
    let store = Store::init(&url, &test_options()).await?;
    Ok((store, temp_dir))
}

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(BankService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = BankService::init(db_path.to_str().unwrap(), test_options()).await?;
    Ok((service, temp_dir))
}

pub async fn create_account(
    store: &Store,
    owner: &str,
    balance: MinorUnits,
    currency: Currency,
) -> Result<Account> {
    let ctx = Context::background();
    let account = store
        .create_account(
            &ctx,
            CreateAccountParams {
                owner: owner.to_string(),
                balance,
                currency,
            },
        )
        .await?;
    Ok(account)
}

pub async fn balance_of(store: &Store, id: AccountId) -> Result<MinorUnits> {
    let ctx = Context::background();
    Ok(store.get_account(&ctx, id).await?.balance)
}

/// (transfer count, entry count) currently committed.
pub async fn row_counts(store: &Store) -> Result<(i64, i64)> {
    let ctx = Context::background();
    let stats = store.integrity_stats(&ctx).await?;
    Ok((stats.transfer_count, stats.entry_count))
}

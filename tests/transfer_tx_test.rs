mod common;

use std::time::Duration;

use anyhow::Result;
use common::{balance_of, create_account, row_counts, test_store};
use tesoro::context::Context;
use tesoro::domain::Currency;
use tesoro::storage::{
    ListEntriesParams, ListTransfersParams, Queries, StoreError, TransferTxParams,
};

fn params(from: i64, to: i64, amount: i64) -> TransferTxParams {
    TransferTxParams {
        from_account_id: from,
        to_account_id: to,
        amount,
    }
}

#[tokio::test]
async fn test_transfer_between_two_accounts() -> Result<()> {
    let (store, _temp) = test_store().await?;
    let ctx = Context::background();

    let a = create_account(&store, "alice", 100, Currency::Usd).await?;
    let b = create_account(&store, "bob", 50, Currency::Usd).await?;

    let result = store.transfer_tx(&ctx, params(a.id, b.id, 30)).await?;

    assert_eq!(result.transfer.from_account_id, a.id);
    assert_eq!(result.transfer.to_account_id, b.id);
    assert_eq!(result.transfer.amount, 30);

    assert_eq!(result.from_entry.account_id, a.id);
    assert_eq!(result.from_entry.amount, -30);
    assert_eq!(result.to_entry.account_id, b.id);
    assert_eq!(result.to_entry.amount, 30);

    assert_eq!(result.from_account.id, a.id);
    assert_eq!(result.from_account.balance, 70);
    assert_eq!(result.to_account.id, b.id);
    assert_eq!(result.to_account.balance, 80);

    // Committed state matches the returned result
    assert_eq!(balance_of(&store, a.id).await?, 70);
    assert_eq!(balance_of(&store, b.id).await?, 80);
    assert_eq!(store.get_transfer(&ctx, result.transfer.id).await?, result.transfer);
    assert_eq!(store.get_entry(&ctx, result.from_entry.id).await?, result.from_entry);
    assert_eq!(store.get_entry(&ctx, result.to_entry.id).await?, result.to_entry);

    Ok(())
}

#[tokio::test]
async fn test_transfer_from_higher_to_lower_id() -> Result<()> {
    let (store, _temp) = test_store().await?;
    let ctx = Context::background();

    let a = create_account(&store, "alice", 100, Currency::Eur).await?;
    let b = create_account(&store, "bob", 50, Currency::Eur).await?;

    let result = store.transfer_tx(&ctx, params(b.id, a.id, 20)).await?;

    assert_eq!(result.from_account.id, b.id);
    assert_eq!(result.from_account.balance, 30);
    assert_eq!(result.to_account.id, a.id);
    assert_eq!(result.to_account.balance, 120);
    assert_eq!(result.from_entry.amount, -20);
    assert_eq!(result.to_entry.amount, 20);

    Ok(())
}

#[tokio::test]
async fn test_sequential_transfers_keep_ledger_consistent() -> Result<()> {
    let (store, _temp) = test_store().await?;
    let ctx = Context::background();

    let a = create_account(&store, "alice", 1000, Currency::Try).await?;
    let b = create_account(&store, "bob", 1000, Currency::Try).await?;

    let amounts = [10, 25, 5, 60, 1];
    for (i, &amount) in amounts.iter().enumerate() {
        let (from, to) = if i % 2 == 0 { (a.id, b.id) } else { (b.id, a.id) };
        let before_from = balance_of(&store, from).await?;
        let before_to = balance_of(&store, to).await?;

        let result = store.transfer_tx(&ctx, params(from, to, amount)).await?;

        assert_eq!(result.from_entry.amount + result.to_entry.amount, 0);
        assert_eq!(result.from_account.balance, before_from - amount);
        assert_eq!(result.to_account.balance, before_to + amount);
    }

    // balance = opening balance + sum of its entries
    for account in [&a, &b] {
        let entries = store
            .list_entries(
                &ctx,
                ListEntriesParams {
                    account_id: account.id,
                    limit: 100,
                    offset: 0,
                },
            )
            .await?;
        let net: i64 = entries.iter().map(|e| e.amount).sum();
        assert_eq!(entries.len(), amounts.len());
        assert_eq!(balance_of(&store, account.id).await?, account.balance + net);
    }

    let transfers = store
        .list_transfers(
            &ctx,
            ListTransfersParams {
                from_account_id: a.id,
                to_account_id: a.id,
                limit: 100,
                offset: 0,
            },
        )
        .await?;
    assert_eq!(transfers.len(), amounts.len());
    assert_eq!(row_counts(&store).await?, (5, 10));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transfers_same_direction() -> Result<()> {
    let (store, _temp) = test_store().await?;

    let a = create_account(&store, "alice", 1000, Currency::Usd).await?;
    let b = create_account(&store, "bob", 1000, Currency::Usd).await?;

    let n = 5;
    let amount = 10;
    let mut handles = Vec::new();
    for _ in 0..n {
        let store = store.clone();
        let (from, to) = (a.id, b.id);
        handles.push(tokio::spawn(async move {
            let ctx = Context::background();
            store.transfer_tx(&ctx, params(from, to, amount)).await
        }));
    }

    let mut seen_from_balances = Vec::new();
    for handle in handles {
        let result = handle.await??;
        assert_eq!(result.transfer.amount, amount);
        assert_eq!(result.from_entry.amount, -amount);
        assert_eq!(result.to_entry.amount, amount);

        // Each commit observed a distinct intermediate balance
        let diff = 1000 - result.from_account.balance;
        assert_eq!(diff % amount, 0);
        let k = diff / amount;
        assert!((1..=n).contains(&k));
        assert!(!seen_from_balances.contains(&k));
        seen_from_balances.push(k);
    }

    assert_eq!(balance_of(&store, a.id).await?, 1000 - n * amount);
    assert_eq!(balance_of(&store, b.id).await?, 1000 + n * amount);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_direction_transfers_do_not_deadlock() -> Result<()> {
    let (store, _temp) = test_store().await?;

    let a = create_account(&store, "alice", 500, Currency::Usd).await?;
    let b = create_account(&store, "bob", 500, Currency::Usd).await?;

    let n = 10;
    let amount = 10;
    let mut handles = Vec::new();
    for i in 0..n {
        let store = store.clone();
        let (from, to) = if i % 2 == 1 { (b.id, a.id) } else { (a.id, b.id) };
        handles.push(tokio::spawn(async move {
            let ctx = Context::background();
            store.transfer_tx(&ctx, params(from, to, amount)).await
        }));
    }

    let all = async {
        for handle in handles {
            handle.await??;
        }
        Ok::<_, anyhow::Error>(())
    };
    tokio::time::timeout(Duration::from_secs(60), all)
        .await
        .expect("concurrent transfers hung")?;

    // Same number of transfers each way: balances are back where they started
    assert_eq!(balance_of(&store, a.id).await?, 500);
    assert_eq!(balance_of(&store, b.id).await?, 500);
    assert_eq!(row_counts(&store).await?, (n, n * 2));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_total_balance_is_conserved() -> Result<()> {
    let (store, _temp) = test_store().await?;

    let accounts = vec![
        create_account(&store, "alice", 300, Currency::Eur).await?,
        create_account(&store, "bob", 200, Currency::Eur).await?,
        create_account(&store, "carol", 100, Currency::Eur).await?,
    ];
    let ids: Vec<i64> = accounts.iter().map(|a| a.id).collect();

    let mut handles = Vec::new();
    for i in 0..12usize {
        let store = store.clone();
        let from = ids[i % 3];
        let to = ids[(i + 1 + i / 3 % 2) % 3];
        let amount = (i as i64 % 4 + 1) * 7;
        handles.push(tokio::spawn(async move {
            let ctx = Context::background();
            store.transfer_tx(&ctx, params(from, to, amount)).await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let mut total = 0;
    for id in &ids {
        total += balance_of(&store, *id).await?;
    }
    assert_eq!(total, 600);

    let report = tesoro::domain::build_integrity_report(
        &store.integrity_stats(&Context::background()).await?,
    );
    assert!(report.is_healthy(), "{:?}", report.issues);
    assert_eq!(report.total_balance, 600);

    Ok(())
}

#[tokio::test]
async fn test_unknown_source_account_is_not_found() -> Result<()> {
    let (store, _temp) = test_store().await?;
    let ctx = Context::background();

    let b = create_account(&store, "bob", 50, Currency::Usd).await?;
    let missing = b.id + 100;

    let err = store
        .transfer_tx(&ctx, params(missing, b.id, 30))
        .await
        .unwrap_err();

    assert!(
        matches!(err, StoreError::NotFound { entity: "account", id } if id == missing),
        "unexpected error: {err:?}"
    );
    assert_eq!(balance_of(&store, b.id).await?, 50);
    assert_eq!(row_counts(&store).await?, (0, 0));

    Ok(())
}

#[tokio::test]
async fn test_unknown_destination_account_is_not_found() -> Result<()> {
    let (store, _temp) = test_store().await?;
    let ctx = Context::background();

    let a = create_account(&store, "alice", 100, Currency::Usd).await?;
    let missing = a.id + 100;

    let err = store
        .transfer_tx(&ctx, params(a.id, missing, 30))
        .await
        .unwrap_err();

    assert!(
        matches!(err, StoreError::NotFound { entity: "account", id } if id == missing),
        "unexpected error: {err:?}"
    );
    assert_eq!(balance_of(&store, a.id).await?, 100);
    assert_eq!(row_counts(&store).await?, (0, 0));

    Ok(())
}

#[tokio::test]
async fn test_self_transfer_is_rejected() -> Result<()> {
    let (store, _temp) = test_store().await?;
    let ctx = Context::background();

    let a = create_account(&store, "alice", 100, Currency::Usd).await?;

    let err = store
        .transfer_tx(&ctx, params(a.id, a.id, 30))
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::SameAccount(id) if id == a.id));
    assert_eq!(balance_of(&store, a.id).await?, 100);
    assert_eq!(row_counts(&store).await?, (0, 0));

    Ok(())
}

#[tokio::test]
async fn test_overdraft_is_allowed_by_the_core() -> Result<()> {
    let (store, _temp) = test_store().await?;
    let ctx = Context::background();

    let a = create_account(&store, "alice", 10, Currency::Usd).await?;
    let b = create_account(&store, "bob", 0, Currency::Usd).await?;

    let result = store.transfer_tx(&ctx, params(a.id, b.id, 25)).await?;

    assert_eq!(result.from_account.balance, -15);
    assert_eq!(result.to_account.balance, 25);

    Ok(())
}

#[tokio::test]
async fn test_non_positive_amount_is_refused_by_schema() -> Result<()> {
    let (store, _temp) = test_store().await?;
    let ctx = Context::background();

    let a = create_account(&store, "alice", 100, Currency::Usd).await?;
    let b = create_account(&store, "bob", 100, Currency::Usd).await?;

    let err = store
        .transfer_tx(&ctx, params(a.id, b.id, 0))
        .await
        .unwrap_err();

    assert!(
        matches!(err, StoreError::Constraint { .. }),
        "unexpected error: {err:?}"
    );
    assert_eq!(row_counts(&store).await?, (0, 0));
    assert_eq!(balance_of(&store, a.id).await?, 100);

    Ok(())
}

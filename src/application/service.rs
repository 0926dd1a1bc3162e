use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::config::Config;
use crate::context::Context;
use crate::domain::{
    build_integrity_report, net_change, Account, AccountId, Currency, Entry, IntegrityReport,
    MinorUnits, Transfer, TransferId,
};
use crate::storage::{
    CreateAccountParams, ListAccountsParams, ListEntriesParams, Queries, Store, StoreOptions,
    TransferTxParams, TransferTxResult,
};

use super::AppError;

pub const MIN_PAGE_SIZE: i64 = 5;
pub const MAX_PAGE_SIZE: i64 = 10;

/// Application service providing high-level banking operations.
/// This is the primary interface for any client (CLI, API, etc.).
#[derive(Debug, Clone)]
pub struct BankService {
    store: Store,
}

/// A transfer as requested by a client. The currency is the one the client
/// believes both accounts hold; it is checked before any money moves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: MinorUnits,
    pub currency: String,
}

/// An account together with its oldest ledger entries, in the order they were written.
#[derive(Debug, Clone, Serialize)]
pub struct AccountStatement {
    pub account: Account,
    pub entries: Vec<Entry>,
    /// Net effect of the listed entries on the balance.
    pub net_change: MinorUnits,
}

impl BankService {
    /// Create a new service with the given store.
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str, options: StoreOptions) -> Result<Self, AppError> {
        let options = StoreOptions {
            create_if_missing: true,
            ..options
        };
        let store = Store::init(&format!("sqlite:{}", database_path), &options).await?;
        Ok(Self::new(store))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str, options: StoreOptions) -> Result<Self, AppError> {
        let store = Store::connect(&format!("sqlite:{}", database_path), &options).await?;
        Ok(Self::new(store))
    }

    pub async fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::connect(&config.database, config.store_options()).await
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    // ========================
    // Account operations
    // ========================

    /// Open a new account. Balances normally start at zero; a non-negative
    /// opening balance may be given when migrating existing funds.
    #[instrument(skip(self, ctx))]
    pub async fn create_account(
        &self,
        ctx: &Context,
        owner: &str,
        currency: &str,
        opening_balance: MinorUnits,
    ) -> Result<Account, AppError> {
        let owner = owner.trim();
        if owner.is_empty() {
            return Err(AppError::EmptyOwner);
        }
        let currency = parse_currency(currency)?;
        if opening_balance < 0 {
            return Err(AppError::InvalidAmount(opening_balance));
        }

        let account = self
            .store
            .create_account(
                ctx,
                CreateAccountParams {
                    owner: owner.to_string(),
                    balance: opening_balance,
                    currency,
                },
            )
            .await?;

        info!(account_id = account.id, "account created");
        Ok(account)
    }

    pub async fn get_account(&self, ctx: &Context, id: AccountId) -> Result<Account, AppError> {
        if id < 1 {
            return Err(AppError::InvalidAccountId(id));
        }
        Ok(self.store.get_account(ctx, id).await?)
    }

    /// List accounts one page at a time. Pages start at 1.
    pub async fn list_accounts(
        &self,
        ctx: &Context,
        page_id: i64,
        page_size: i64,
    ) -> Result<Vec<Account>, AppError> {
        if page_id < 1 || !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(AppError::InvalidPage {
                min: MIN_PAGE_SIZE,
                max: MAX_PAGE_SIZE,
            });
        }

        Ok(self
            .store
            .list_accounts(
                ctx,
                ListAccountsParams {
                    limit: page_size,
                    offset: (page_id - 1) * page_size,
                },
            )
            .await?)
    }

    /// Get an account with up to `limit` of its oldest entries.
    pub async fn account_statement(
        &self,
        ctx: &Context,
        id: AccountId,
        limit: i64,
    ) -> Result<AccountStatement, AppError> {
        if limit < 1 {
            return Err(AppError::InvalidLimit(limit));
        }
        let account = self.get_account(ctx, id).await?;
        let entries = self
            .store
            .list_entries(
                ctx,
                ListEntriesParams {
                    account_id: id,
                    limit,
                    offset: 0,
                },
            )
            .await?;

        Ok(AccountStatement {
            net_change: net_change(id, &entries),
            account,
            entries,
        })
    }

    // ========================
    // Transfer operations
    // ========================

    /// Validate a transfer request and execute it atomically.
    #[instrument(skip(self, ctx))]
    pub async fn transfer(
        &self,
        ctx: &Context,
        request: TransferRequest,
    ) -> Result<TransferTxResult, AppError> {
        if request.amount <= 0 {
            return Err(AppError::InvalidAmount(request.amount));
        }
        for id in [request.from_account_id, request.to_account_id] {
            if id < 1 {
                return Err(AppError::InvalidAccountId(id));
            }
        }
        if request.from_account_id == request.to_account_id {
            return Err(AppError::SameAccount(request.from_account_id));
        }
        let currency = parse_currency(&request.currency)?;

        self.valid_account(ctx, request.from_account_id, currency)
            .await?;
        self.valid_account(ctx, request.to_account_id, currency)
            .await?;

        let result = self
            .store
            .transfer_tx(
                ctx,
                TransferTxParams {
                    from_account_id: request.from_account_id,
                    to_account_id: request.to_account_id,
                    amount: request.amount,
                },
            )
            .await?;

        info!(transfer_id = result.transfer.id, "transfer recorded");
        Ok(result)
    }

    pub async fn get_transfer(&self, ctx: &Context, id: TransferId) -> Result<Transfer, AppError> {
        Ok(self.store.get_transfer(ctx, id).await?)
    }

    /// The account must exist and hold `currency`.
    async fn valid_account(
        &self,
        ctx: &Context,
        id: AccountId,
        currency: Currency,
    ) -> Result<Account, AppError> {
        let account = self.store.get_account(ctx, id).await?;
        if account.currency != currency {
            return Err(AppError::CurrencyMismatch {
                account_id: id,
                expected: currency,
                actual: account.currency,
            });
        }
        Ok(account)
    }

    // ========================
    // Integrity operations
    // ========================

    /// Check ledger integrity and return a report.
    pub async fn check_integrity(&self, ctx: &Context) -> Result<IntegrityReport, AppError> {
        let stats = self.store.integrity_stats(ctx).await?;
        Ok(build_integrity_report(&stats))
    }
}

fn parse_currency(code: &str) -> Result<Currency, AppError> {
    Currency::from_code(code).ok_or_else(|| AppError::UnsupportedCurrency(code.to_string()))
}

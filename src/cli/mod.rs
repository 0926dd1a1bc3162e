use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::application::{AppError, BankService, TransferRequest};
use crate::config::Config;
use crate::context::Context;
use crate::domain::{format_minor, parse_minor, Account, ParseAmountError};

/// Process exit status for a failed command: 2 when the request itself was
/// rejected, 3 when something it names does not exist, 1 otherwise.
pub fn exit_status(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<ParseAmountError>().is_some() {
        return 2;
    }
    match err.downcast_ref::<AppError>() {
        Some(app_err) if app_err.is_invalid_request() => 2,
        Some(app_err) if app_err.is_not_found() => 3,
        _ => 1,
    }
}

/// Tesoro - double-entry money transfers
#[derive(Parser)]
#[command(name = "tesoro")]
#[command(about = "Accounts and atomic money transfers on a double-entry ledger")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Move money from one account to another
    Transfer {
        /// Amount to transfer (e.g., "30.00" or "30")
        amount: String,

        /// Source account ID
        #[arg(long)]
        from: i64,

        /// Destination account ID
        #[arg(long)]
        to: i64,

        /// Currency both accounts must hold (USD, EUR, TRY)
        #[arg(short, long)]
        currency: String,
    },

    /// Show a recorded transfer
    #[command(name = "show")]
    ShowTransfer {
        /// Transfer ID
        id: i64,
    },

    /// Verify ledger integrity
    Check,
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open a new account
    Create {
        /// Account owner
        owner: String,

        /// Currency code (USD, EUR, TRY)
        #[arg(short, long, default_value = "USD")]
        currency: String,

        /// Opening balance (e.g., "100.00"), defaults to zero
        #[arg(short, long)]
        balance: Option<String>,
    },

    /// Show an account
    Show {
        /// Account ID
        id: i64,
    },

    /// List accounts page by page
    List {
        /// Page number, starting at 1
        #[arg(long, default_value_t = 1)]
        page: i64,

        /// Accounts per page (5 to 10)
        #[arg(long, default_value_t = 5)]
        size: i64,
    },

    /// Show an account's ledger entries
    History {
        /// Account ID
        id: i64,

        /// Maximum number of entries to show
        #[arg(short, long, default_value_t = 50)]
        limit: i64,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let ctx = self.config.context();

        match self.command {
            Commands::Init => {
                let service =
                    BankService::init(&self.config.database, self.config.store_options()).await?;
                service.store().close().await;
                println!("Database initialized: {}", self.config.database);
            }

            Commands::Account(account_cmd) => {
                let service = BankService::from_config(&self.config).await?;
                run_account_command(&service, &ctx, account_cmd, self.json).await?;
            }

            Commands::Transfer {
                amount,
                from,
                to,
                currency,
            } => {
                let service = BankService::from_config(&self.config).await?;
                let amount =
                    parse_minor(&amount).context("Invalid amount format. Use '30.00' or '30'")?;

                let result = service
                    .transfer(
                        &ctx,
                        TransferRequest {
                            from_account_id: from,
                            to_account_id: to,
                            amount,
                            currency,
                        },
                    )
                    .await?;

                if self.json {
                    print_json(&result)?;
                } else {
                    println!(
                        "Transferred {} {}: #{} -> #{} (transfer {})",
                        format_minor(result.transfer.amount),
                        result.from_account.currency,
                        result.from_account.id,
                        result.to_account.id,
                        result.transfer.id
                    );
                    println!(
                        "  #{:<6} {:>14}",
                        result.from_account.id,
                        format_minor(result.from_account.balance)
                    );
                    println!(
                        "  #{:<6} {:>14}",
                        result.to_account.id,
                        format_minor(result.to_account.balance)
                    );
                }
            }

            Commands::ShowTransfer { id } => {
                let service = BankService::from_config(&self.config).await?;
                let transfer = service.get_transfer(&ctx, id).await?;

                if self.json {
                    print_json(&transfer)?;
                } else {
                    println!("Transfer: {}", transfer.id);
                    println!(
                        "  Date:    {}",
                        transfer.created_at.format("%Y-%m-%d %H:%M:%S")
                    );
                    println!("  From:    #{}", transfer.from_account_id);
                    println!("  To:      #{}", transfer.to_account_id);
                    println!("  Amount:  {}", format_minor(transfer.amount));
                }
            }

            Commands::Check => {
                let service = BankService::from_config(&self.config).await?;
                run_check_command(&service, &ctx, self.json).await?;
            }
        }

        Ok(())
    }
}

async fn run_account_command(
    service: &BankService,
    ctx: &Context,
    cmd: AccountCommands,
    json: bool,
) -> Result<()> {
    match cmd {
        AccountCommands::Create {
            owner,
            currency,
            balance,
        } => {
            let opening_balance = balance
                .map(|b| parse_minor(&b))
                .transpose()
                .context("Invalid balance format. Use '100.00' or '100'")?
                .unwrap_or(0);

            let account = service
                .create_account(ctx, &owner, &currency, opening_balance)
                .await?;

            if json {
                print_json(&account)?;
            } else {
                println!(
                    "Created account #{} for {} ({})",
                    account.id, account.owner, account.currency
                );
            }
        }

        AccountCommands::Show { id } => {
            let account = service.get_account(ctx, id).await?;
            if json {
                print_json(&account)?;
            } else {
                print_account(&account);
            }
        }

        AccountCommands::List { page, size } => {
            let accounts = service.list_accounts(ctx, page, size).await?;
            if json {
                print_json(&accounts)?;
            } else if accounts.is_empty() {
                println!("No accounts found.");
            } else {
                println!("{:<8} {:<20} {:>14} {:<8}", "ID", "OWNER", "BALANCE", "CURRENCY");
                println!("{}", "-".repeat(53));
                for account in accounts {
                    println!(
                        "{:<8} {:<20} {:>14} {:<8}",
                        account.id,
                        account.owner,
                        format_minor(account.balance),
                        account.currency
                    );
                }
            }
        }

        AccountCommands::History { id, limit } => {
            let statement = service.account_statement(ctx, id, limit).await?;
            if json {
                print_json(&statement)?;
            } else {
                print_account(&statement.account);
                println!();
                if statement.entries.is_empty() {
                    println!("No entries.");
                } else {
                    println!("{:<8} {:<20} {:>14}", "ENTRY", "DATE", "AMOUNT");
                    println!("{}", "-".repeat(44));
                    for entry in &statement.entries {
                        println!(
                            "{:<8} {:<20} {:>14}",
                            entry.id,
                            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                            format_minor(entry.amount)
                        );
                    }
                    println!("{}", "-".repeat(44));
                    println!(
                        "{:<29} {:>14}",
                        "Net change:",
                        format_minor(statement.net_change)
                    );
                }
            }
        }
    }

    Ok(())
}

async fn run_check_command(service: &BankService, ctx: &Context, json: bool) -> Result<()> {
    let report = service.check_integrity(ctx).await?;

    if json {
        print_json(&report)?;
    } else {
        println!("Checking ledger integrity...\n");
        println!("Accounts:  {}", report.account_count);
        println!("Transfers: {}", report.transfer_count);
        println!("Entries:   {}", report.entry_count);
        println!(
            "Total:     {}  {}",
            format_minor(report.total_balance),
            if report.is_balanced { "OK" } else { "UNBALANCED!" }
        );
        println!();
    }

    if report.is_healthy() {
        if !json {
            println!("Ledger is consistent.");
        }
    } else {
        if !json {
            println!("Issues found:");
            for issue in &report.issues {
                println!("  - {}", issue);
            }
        }
        anyhow::bail!("Ledger integrity check failed");
    }

    Ok(())
}

fn print_account(account: &Account) {
    println!("Account: #{}", account.id);
    println!("  Owner:    {}", account.owner);
    println!("  Currency: {}", account.currency);
    println!(
        "  Balance:  {} {}",
        format_minor(account.balance),
        account.currency
    );
    println!(
        "  Created:  {}",
        account.created_at.format("%Y-%m-%d %H:%M:%S")
    );
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

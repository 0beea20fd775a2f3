use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};

use crate::application::{AccountService, AppError};
use crate::config::Config;
use crate::domain::{
    HistoryQuery, Operation, SortField, SortOrder, UserId, format_cents, parse_cents,
};

/// Balance Ledger - per-user balances with an auditable operation log
#[derive(Parser)]
#[command(name = "balance-ledger")]
#[command(about = "Manage per-user balances backed by an atomic operation log")]
#[command(version)]
pub struct Cli {
    /// Database file path (overrides DATABASE_URL)
    #[arg(short, long)]
    pub database: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Show a user's balance
    Balance {
        /// User ID
        user: UserId,

        /// Display currency (e.g. "USD"); defaults to the base currency
        #[arg(short, long)]
        currency: Option<String>,
    },

    /// Credit a user, opening their balance if needed
    Deposit {
        /// User ID
        user: UserId,

        /// Amount (e.g., "50.00" or "50")
        amount: String,
    },

    /// Debit a user
    Withdraw {
        /// User ID
        user: UserId,

        /// Amount (e.g., "50.00" or "50")
        amount: String,
    },

    /// Move money between two users
    Transfer {
        /// Amount (e.g., "50.00" or "50")
        amount: String,

        /// Sending user ID
        #[arg(long)]
        from: UserId,

        /// Receiving user ID
        #[arg(long)]
        to: UserId,
    },

    /// List a user's operations
    History {
        /// User ID
        user: UserId,

        /// Operations per page
        #[arg(short, long, default_value_t = HistoryQuery::DEFAULT_LIMIT)]
        limit: u32,

        /// Page number, starting at 1
        #[arg(short, long, default_value_t = 1)]
        page: u32,

        /// Sort field: created_at, amount
        #[arg(long, default_value = "created_at")]
        sort: String,

        /// Sort direction: asc, desc
        #[arg(long, default_value = "desc")]
        order: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Verify that every balance matches its operation log
    Check,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let mut config = Config::from_env();
        if let Some(path) = &self.database {
            config = config.with_database_path(path);
        }

        let service = AccountService::init(&config).await.map_err(surface)?;

        match self.command {
            Commands::Init => {
                println!("Database initialized: {}", config.database_url);
            }

            Commands::Balance { user, currency } => {
                let view = service
                    .get_balance_by_user_id(user, currency.as_deref())
                    .await
                    .map_err(surface)?;

                if view.currency == service.base_currency() {
                    // Whole minor units: render as a decimal amount
                    println!(
                        "User {}: {} {}",
                        view.user_id,
                        format_cents(view.amount as i64),
                        view.currency
                    );
                } else {
                    println!(
                        "User {}: {:.2} {}",
                        view.user_id,
                        view.amount / 100.0,
                        view.currency
                    );
                }
            }

            Commands::Deposit { user, amount } => {
                let amount = parse_amount(&amount)?;
                let operation = service.increase_balance(user, amount).await.map_err(surface)?;
                println!(
                    "Deposited {} to user {} (operation {})",
                    format_cents(operation.amount),
                    user,
                    operation.id
                );
            }

            Commands::Withdraw { user, amount } => {
                let amount = parse_amount(&amount)?;
                let operation = service.decrease_balance(user, amount).await.map_err(surface)?;
                println!(
                    "Withdrew {} from user {} (operation {})",
                    format_cents(operation.amount),
                    user,
                    operation.id
                );
            }

            Commands::Transfer { amount, from, to } => {
                let amount = parse_amount(&amount)?;
                let operation = service
                    .transfer_money(from, to, amount)
                    .await
                    .map_err(surface)?;
                println!(
                    "Transferred {} from user {} to user {} (operation {})",
                    format_cents(operation.amount),
                    from,
                    to,
                    operation.id
                );
            }

            Commands::History {
                user,
                limit,
                page,
                sort,
                order,
                json,
            } => {
                let sort_by = SortField::from_str(&sort)
                    .ok_or_else(|| anyhow!("Invalid sort field '{sort}'. Use created_at or amount"))?;
                let order = SortOrder::from_str(&order)
                    .ok_or_else(|| anyhow!("Invalid sort order '{order}'. Use asc or desc"))?;
                let query = HistoryQuery::with_limit(limit)
                    .page(page)
                    .sorted_by(sort_by, order);

                let history = service.get_operations(user, query).await.map_err(surface)?;

                if json {
                    println!("{}", serde_json::to_string_pretty(&history)?);
                } else {
                    print_operations(user, &history.operations);
                    println!();
                    println!(
                        "Page {} ({} of {} operations)",
                        page,
                        history.operations.len(),
                        history.total
                    );
                }
            }

            Commands::Check => {
                let discrepancies = service.check_integrity().await.map_err(surface)?;
                if discrepancies.is_empty() {
                    println!("Ledger is consistent");
                } else {
                    println!("{:<12} {:>14} {:>14}", "USER", "STORED", "FROM LOG");
                    println!("{}", "-".repeat(42));
                    for d in &discrepancies {
                        println!(
                            "{:<12} {:>14} {:>14}",
                            d.user_id,
                            format_cents(d.stored),
                            format_cents(d.derived)
                        );
                    }
                    return Err(anyhow!(
                        "{} balance(s) do not match the operation log",
                        discrepancies.len()
                    ));
                }
            }
        }

        Ok(())
    }
}

fn parse_amount(input: &str) -> Result<i64> {
    parse_cents(input).context("Invalid amount format. Use '50.00' or '50'")
}

/// Client-correctable errors keep their message. Internal failures are logged
/// with their cause and reported without it.
fn surface(err: AppError) -> anyhow::Error {
    if err.is_client_error() {
        return anyhow!("{err}");
    }
    match &err {
        AppError::Database(cause) | AppError::Configuration(cause) => {
            tracing::error!(error = ?cause, "Internal failure");
        }
        _ => {}
    }
    anyhow!("internal error")
}

fn print_operations(user_id: UserId, operations: &[Operation]) {
    if operations.is_empty() {
        println!("No operations found.");
        return;
    }

    println!(
        "{:<8} {:<20} {:<12} {:>14} {:<10}",
        "ID", "DATE", "KIND", "AMOUNT", "COUNTERPART"
    );
    println!("{}", "-".repeat(68));
    for op in operations {
        let counterpart = if op.sender_id == Some(user_id) {
            op.recipient_id
        } else {
            op.sender_id
        };
        println!(
            "{:<8} {:<20} {:<12} {:>14} {:<10}",
            op.id,
            op.created_at.format("%Y-%m-%d %H:%M:%S"),
            op.description,
            format_cents(op.delta_for(user_id)),
            counterpart.map_or_else(|| "-".to_string(), |id| id.to_string())
        );
    }
}

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use crate::application::{LedgerConfig, LedgerService, Outcome};
use crate::domain::{AccountNumber, Amount};
use crate::logging::{LogFormat, init_logging};
use crate::storage::StoreOptions;

/// Wallet Ledger - total, blocked and withdrawable balances per account
#[derive(Parser)]
#[command(name = "wallet-ledger")]
#[command(about = "A wallet ledger tracking total, blocked and withdrawable balances")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "WALLET_LEDGER_DB", default_value = "wallet-ledger.db")]
    pub database: String,

    /// Default log level (RUST_LOG takes precedence)
    #[arg(long, env = "WALLET_LEDGER_LOG", default_value = "warn", global = true)]
    pub log_level: String,

    /// Log format: pretty or json
    #[arg(long, default_value = "pretty", global = true)]
    pub log_format: LogFormat,

    #[command(flatten)]
    pub tuning: TuningArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Concurrency and storage tuning.
#[derive(Args, Debug, Clone)]
pub struct TuningArgs {
    /// Attempts per mutation before a lock conflict is reported as a failure
    #[arg(long, env = "WALLET_LEDGER_MAX_ATTEMPTS", default_value_t = 5)]
    pub max_attempts: u32,

    /// Backoff step between attempts, in milliseconds
    #[arg(long, default_value_t = 20)]
    pub retry_backoff_ms: u64,

    /// How long to wait on a locked database, in milliseconds
    #[arg(long, default_value_t = 5000)]
    pub busy_timeout_ms: u64,

    /// Maximum pooled database connections
    #[arg(long, default_value_t = 8)]
    pub max_connections: u32,
}

impl TuningArgs {
    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig::default()
            .with_max_attempts(self.max_attempts)
            .with_retry_backoff(Duration::from_millis(self.retry_backoff_ms))
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            max_connections: self.max_connections.max(1),
            ..StoreOptions::default()
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Wallet management commands
    #[command(subcommand)]
    Wallet(WalletCommands),

    /// Credit an account
    Deposit {
        /// Account number (six digits)
        account: AccountNumber,

        /// Amount in the smallest currency unit
        amount: Amount,
    },

    /// Debit an account's withdrawal balance
    Withdraw {
        /// Account number (six digits)
        account: AccountNumber,

        /// Amount in the smallest currency unit
        amount: Amount,
    },

    /// Move money between two accounts
    Transfer {
        /// Amount in the smallest currency unit
        amount: Amount,

        /// Source account number
        #[arg(long)]
        from: AccountNumber,

        /// Destination account number
        #[arg(long)]
        to: AccountNumber,
    },

    /// Set the blocked amount of an account (absolute, not a delta)
    Block {
        /// Account number (six digits)
        account: AccountNumber,

        /// New blocked amount
        #[arg(allow_hyphen_values = true)]
        blocked: Amount,
    },

    /// Show the withdrawal balance of an account
    Balance {
        /// Account number (six digits)
        account: AccountNumber,
    },
}

#[derive(Subcommand)]
pub enum WalletCommands {
    /// Create a new wallet
    Create {
        /// Account number (six digits, must be unique)
        account: AccountNumber,

        /// Account holder name
        #[arg(short, long)]
        user_name: String,

        /// Total inventory
        #[arg(short, long, default_value_t = 0)]
        total: Amount,

        /// Blocked part of the total inventory
        #[arg(short, long, default_value_t = 0)]
        blocked: Amount,
    },

    /// List all wallets
    List,

    /// Show a wallet by ID
    Show {
        /// Wallet ID
        id: String,
    },

    /// Show a wallet by account number
    ShowAccount {
        /// Account number (six digits)
        account: AccountNumber,
    },

    /// Change the account holder name
    Rename {
        /// Wallet ID
        id: String,

        /// New account holder name
        user_name: String,
    },

    /// Permanently delete a wallet
    Delete {
        /// Wallet ID
        id: String,
    },
}

impl Cli {
    pub async fn run(self) -> Result<ExitCode> {
        init_logging(&self.log_level, self.log_format);

        let options = self.tuning.store_options();
        let config = self.tuning.ledger_config();

        let success = match self.command {
            Commands::Init => {
                LedgerService::init_with(&self.database, &options, config).await?;
                emit(&Outcome::ok(self.database))?
            }

            Commands::Wallet(wallet_cmd) => {
                let service = LedgerService::connect_with(&self.database, &options, config).await?;
                run_wallet_command(&service, wallet_cmd).await?
            }

            Commands::Deposit { account, amount } => {
                let service = LedgerService::connect_with(&self.database, &options, config).await?;
                emit(&Outcome::from_result(service.deposit(account, amount).await))?
            }

            Commands::Withdraw { account, amount } => {
                let service = LedgerService::connect_with(&self.database, &options, config).await?;
                emit(&Outcome::from_result(service.withdraw(account, amount).await))?
            }

            Commands::Transfer { amount, from, to } => {
                let service = LedgerService::connect_with(&self.database, &options, config).await?;
                emit(&Outcome::from_result(
                    service.transfer(from, to, amount).await,
                ))?
            }

            Commands::Block { account, blocked } => {
                let service = LedgerService::connect_with(&self.database, &options, config).await?;
                emit(&Outcome::from_result(
                    service.block_inventory(account, blocked).await,
                ))?
            }

            Commands::Balance { account } => {
                let service = LedgerService::connect_with(&self.database, &options, config).await?;
                emit(&Outcome::balance(
                    service.get_withdrawal_balance(account).await,
                ))?
            }
        };

        Ok(if success {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }
}

async fn run_wallet_command(service: &LedgerService, cmd: WalletCommands) -> Result<bool> {
    match cmd {
        WalletCommands::Create {
            account,
            user_name,
            total,
            blocked,
        } => emit(&Outcome::from_result(
            service
                .create_wallet(account, user_name, total, blocked)
                .await,
        )),

        WalletCommands::List => emit(&Outcome::from_result(service.list_wallets().await)),

        WalletCommands::Show { id } => {
            let id = parse_wallet_id(&id)?;
            emit(&Outcome::from_result(service.get_wallet(id).await))
        }

        WalletCommands::ShowAccount { account } => emit(&Outcome::from_result(
            service.get_wallet_by_account(account).await,
        )),

        WalletCommands::Rename { id, user_name } => {
            let id = parse_wallet_id(&id)?;
            emit(&Outcome::from_result(
                service.edit_user_name(id, user_name).await,
            ))
        }

        WalletCommands::Delete { id } => {
            let id = parse_wallet_id(&id)?;
            emit(&Outcome::from_result(service.delete_wallet(id).await))
        }
    }
}

fn parse_wallet_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).context("Invalid wallet ID format (expected UUID)")
}

/// Print the outcome as JSON on stdout and report whether it succeeded.
fn emit<T: Serialize>(outcome: &Outcome<T>) -> Result<bool> {
    let json = serde_json::to_string_pretty(outcome).context("Failed to serialize outcome")?;
    println!("{}", json);
    Ok(outcome.success)
}

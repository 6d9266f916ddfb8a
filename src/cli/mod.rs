pub mod accounts;
pub mod categories;
pub mod check;
pub mod import;
pub mod init;
pub mod query;

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::categories::CategoryRegistry;
use crate::error::Result;
use crate::models::{AccountKind, Period};
use crate::settings::{load_settings, shellexpand_path};
use crate::store::TransactionStore;

/// Resolved locations for one invocation.
pub struct Context {
    pub data_dir: PathBuf,
    pub categories_file: PathBuf,
}

impl Context {
    /// Stored settings, with `--data-dir` taking precedence.
    pub fn resolve(data_dir: Option<&str>) -> Self {
        let settings = load_settings();
        let data_dir = match data_dir {
            Some(dir) => PathBuf::from(shellexpand_path(dir)),
            None => settings.data_dir(),
        };
        let categories_file = settings.categories_path(&data_dir);
        Self {
            data_dir,
            categories_file,
        }
    }

    pub fn open(&self, account: &AccountArgs) -> Result<TransactionStore> {
        crate::accounts::open(&self.data_dir, account.kind, &account.account)
    }

    pub fn registry(&self) -> Result<CategoryRegistry> {
        CategoryRegistry::load(&self.categories_file)
    }
}

fn parse_day(raw: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| format!("expected YYYY-MM-DD, got '{raw}'"))
}

#[derive(Parser)]
#[command(
    name = "midas",
    version,
    about = "Keep personal bank-account ledgers: import statements, find duplicates, query and reconcile."
)]
pub struct Cli {
    /// Data directory for this invocation (overrides settings)
    #[arg(long = "data-dir", global = true)]
    pub data_dir: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone)]
pub struct AccountArgs {
    /// Account name
    #[arg(long)]
    pub account: String,
    /// Account kind
    #[arg(long, value_enum, default_value_t = AccountKind::Debit)]
    pub kind: AccountKind,
}

#[derive(Args, Clone)]
pub struct FilterArgs {
    #[command(flatten)]
    pub target: AccountArgs,
    /// Drop deposits (debit) or charges (credit)
    #[arg(long)]
    pub exclude_primary: bool,
    /// Drop withdrawals (debit) or payments (credit)
    #[arg(long)]
    pub exclude_secondary: bool,
    /// First day, inclusive: YYYY-MM-DD
    #[arg(long, value_parser = parse_day)]
    pub from: Option<NaiveDate>,
    /// Last day, inclusive: YYYY-MM-DD
    #[arg(long, value_parser = parse_day)]
    pub to: Option<NaiveDate>,
    /// Select records outside the date bounds
    #[arg(long)]
    pub outside_dates: bool,
    /// Description contains this text (repeat to match any of several)
    #[arg(long)]
    pub contains: Vec<String>,
    /// Description matches a keyword of this category or its subcategories
    #[arg(long, conflicts_with = "contains")]
    pub category: Option<String>,
    /// Select records that do NOT match --contains/--category
    #[arg(long)]
    pub not_matching: bool,
    /// Smallest amount, inclusive
    #[arg(long, allow_hyphen_values = true)]
    pub min: Option<f64>,
    /// Largest amount, inclusive
    #[arg(long, allow_hyphen_values = true)]
    pub max: Option<f64>,
    /// Select records outside the amount bounds
    #[arg(long)]
    pub outside_amounts: bool,
    /// Group results by period
    #[arg(long, value_enum)]
    pub group_by: Option<Period>,
}

#[derive(Args, Clone)]
pub struct OrderArgs {
    /// Order by date (default)
    #[arg(long)]
    pub by_date: bool,
    /// Order by signed amount
    #[arg(long)]
    pub by_amount: bool,
    /// Order by description
    #[arg(long)]
    pub by_description: bool,
    /// Newest / largest / last first
    #[arg(long)]
    pub desc: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up midas: choose a data directory and save settings.
    Init,
    /// Manage accounts.
    Accounts {
        #[command(subcommand)]
        command: AccountsCommands,
    },
    /// Import a bank statement CSV into an account.
    Import {
        /// Path to the statement file
        file: String,
        #[command(flatten)]
        target: AccountArgs,
    },
    /// Count matching transactions.
    Count(FilterArgs),
    /// Net amount of matching transactions.
    Sum(FilterArgs),
    /// Average net amount of matching transactions.
    Average(FilterArgs),
    /// List matching transactions.
    List {
        #[command(flatten)]
        filters: FilterArgs,
        #[command(flatten)]
        order: OrderArgs,
    },
    /// List transactions that match no category.
    Uncategorized(AccountArgs),
    /// Show the current balance of an account.
    Balance(AccountArgs),
    /// Check that transactions account for the change in balance.
    Check {
        #[command(flatten)]
        target: AccountArgs,
        /// Only sum transactions from this day: YYYY-MM-DD
        #[arg(long, value_parser = parse_day)]
        from: Option<NaiveDate>,
        /// Only sum transactions up to this day: YYYY-MM-DD
        #[arg(long, value_parser = parse_day)]
        to: Option<NaiveDate>,
    },
    /// Show adjacent transactions whose balances do not line up.
    Breaks(AccountArgs),
    /// Find (and optionally remove) possible duplicate transactions.
    Duplicates {
        #[command(flatten)]
        target: AccountArgs,
        /// Delete the second record of every pair
        #[arg(long)]
        remove: bool,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Manage categories.
    Categories {
        #[command(subcommand)]
        command: CategoriesCommands,
    },
}

#[derive(Subcommand)]
pub enum AccountsCommands {
    /// Create an empty account.
    Create {
        name: String,
        #[arg(long, value_enum, default_value_t = AccountKind::Debit)]
        kind: AccountKind,
    },
    /// List accounts.
    List {
        /// Only accounts of this kind
        #[arg(long, value_enum)]
        kind: Option<AccountKind>,
    },
    /// Delete an account and all of its transactions.
    Delete {
        name: String,
        #[arg(long, value_enum, default_value_t = AccountKind::Debit)]
        kind: AccountKind,
        /// Skip typing the account name to confirm
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum CategoriesCommands {
    /// Show the category tree.
    List,
    /// Add a category.
    Add {
        name: String,
        /// Nest under this category
        #[arg(long)]
        parent: Option<String>,
        /// Keywords matched against descriptions
        #[arg(long = "keyword")]
        keywords: Vec<String>,
    },
    /// Add keywords to a category.
    AddKeywords { name: String, keywords: Vec<String> },
    /// Remove keywords from a category.
    RemoveKeywords { name: String, keywords: Vec<String> },
    /// Show a category's keywords.
    Keywords {
        name: String,
        /// Leave out keywords inherited from subcategories
        #[arg(long)]
        own: bool,
    },
    /// Rename a category.
    Rename { name: String, new_name: String },
    /// Move a category under another one, or to the top level.
    Move {
        name: String,
        /// New parent; omit to move to the top level
        #[arg(long)]
        parent: Option<String>,
    },
    /// Remove a category and its subcategories.
    Remove { name: String },
}

mod accounts;
mod categories;
mod cli;
mod db;
mod error;
mod fmt;
mod importer;
mod models;
mod query;
mod reconciler;
mod settings;
mod store;

use std::sync::Once;

use clap::Parser;

use cli::{AccountsCommands, CategoriesCommands, Cli, Commands, Context};

static TRACING_INIT: Once = Once::new();

/// Logs go to stderr so command output stays clean. `RUST_LOG` overrides the
/// default of warnings only.
fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("midas=warn"));

        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    });
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let ctx = Context::resolve(cli.data_dir.as_deref());

    let result = match cli.command {
        Commands::Init => cli::init::run(&ctx),
        Commands::Accounts { command } => match command {
            AccountsCommands::Create { name, kind } => cli::accounts::create(&ctx, &name, kind),
            AccountsCommands::List { kind } => cli::accounts::list(&ctx, kind),
            AccountsCommands::Delete { name, kind, yes } => {
                cli::accounts::delete(&ctx, &name, kind, yes)
            }
        },
        Commands::Import { file, target } => cli::import::run(&ctx, &file, &target),
        Commands::Count(filters) => cli::query::count(&ctx, &filters),
        Commands::Sum(filters) => cli::query::sum(&ctx, &filters),
        Commands::Average(filters) => cli::query::average(&ctx, &filters),
        Commands::List { filters, order } => cli::query::list(&ctx, &filters, &order),
        Commands::Uncategorized(target) => cli::query::uncategorized(&ctx, &target),
        Commands::Balance(target) => cli::query::balance(&ctx, &target),
        Commands::Check { target, from, to } => cli::check::check(&ctx, &target, from, to),
        Commands::Breaks(target) => cli::check::breaks(&ctx, &target),
        Commands::Duplicates {
            target,
            remove,
            yes,
        } => cli::check::duplicates(&ctx, &target, remove, yes),
        Commands::Categories { command } => match command {
            CategoriesCommands::List => cli::categories::list(&ctx),
            CategoriesCommands::Add {
                name,
                parent,
                keywords,
            } => cli::categories::add(&ctx, &name, parent.as_deref(), &keywords),
            CategoriesCommands::AddKeywords { name, keywords } => {
                cli::categories::add_keywords(&ctx, &name, &keywords)
            }
            CategoriesCommands::RemoveKeywords { name, keywords } => {
                cli::categories::remove_keywords(&ctx, &name, &keywords)
            }
            CategoriesCommands::Keywords { name, own } => {
                cli::categories::keywords(&ctx, &name, own)
            }
            CategoriesCommands::Rename { name, new_name } => {
                cli::categories::rename(&ctx, &name, &new_name)
            }
            CategoriesCommands::Move { name, parent } => {
                cli::categories::move_to(&ctx, &name, parent.as_deref())
            }
            CategoriesCommands::Remove { name } => cli::categories::remove(&ctx, &name),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

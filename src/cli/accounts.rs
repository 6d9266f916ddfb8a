use colored::Colorize;
use comfy_table::{Cell, Table};
use dialoguer::Input;

use crate::accounts;
use crate::cli::Context;
use crate::error::Result;
use crate::fmt::money;
use crate::models::AccountKind;

pub fn create(ctx: &Context, name: &str, kind: AccountKind) -> Result<()> {
    accounts::create(&ctx.data_dir, kind, name)?;
    println!("Created {} account: {name}", kind.key());
    Ok(())
}

pub fn list(ctx: &Context, kind: Option<AccountKind>) -> Result<()> {
    let kinds: Vec<AccountKind> = match kind {
        Some(k) => vec![k],
        None => AccountKind::ALL.to_vec(),
    };

    let mut table = Table::new();
    table.set_header(vec!["Name", "Kind", "Transactions", "Balance"]);
    for kind in kinds {
        for name in accounts::list(&ctx.data_dir, kind)? {
            let store = accounts::open(&ctx.data_dir, kind, &name)?;
            let balance = match store.last()? {
                Some(last) => money(last.balance),
                None => String::new(),
            };
            table.add_row(vec![
                Cell::new(&name),
                Cell::new(kind.key()),
                Cell::new(store.len()?),
                Cell::new(balance),
            ]);
        }
    }
    println!("Accounts\n{table}");
    Ok(())
}

pub fn delete(ctx: &Context, name: &str, kind: AccountKind, yes: bool) -> Result<()> {
    // Fails early for a missing account, before asking anything.
    let count = accounts::open(&ctx.data_dir, kind, name)?.len()?;

    if !yes {
        println!(
            "{}",
            format!("This permanently deletes '{name}' and its {count} transactions.").yellow()
        );
        let typed: String = Input::new()
            .with_prompt("Type the account name to confirm")
            .allow_empty(true)
            .interact_text()
            .unwrap_or_default();
        if typed != name {
            println!("Names do not match. Nothing deleted.");
            return Ok(());
        }
    }

    accounts::delete(&ctx.data_dir, kind, name)?;
    println!("Deleted {} account: {name}", kind.key());
    Ok(())
}

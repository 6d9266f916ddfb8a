use chrono::NaiveDate;
use colored::Colorize;
use comfy_table::{Cell, Table};
use dialoguer::Confirm;

use crate::cli::{AccountArgs, Context};
use crate::error::Result;
use crate::fmt::{maybe_money, money};
use crate::models::DATE_FORMAT;
use crate::reconciler::{
    self, check_validity, check_validity_in_range, find_balance_breaks, find_possible_duplicates,
    remove_duplicates,
};

pub fn check(
    ctx: &Context,
    target: &AccountArgs,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<()> {
    let store = ctx.open(target)?;
    if store.is_empty()? {
        println!("{} No transactions yet.", "Valid.".green().bold());
        return Ok(());
    }

    let windowed = from.is_some() || to.is_some();
    let valid = if windowed {
        check_validity_in_range(&store, from, to)?
    } else {
        check_validity(&store)?
    };
    let result = if windowed {
        reconciler::reconcile_in_range(&store, from, to)?
    } else {
        reconciler::reconcile(&store)?
    };

    if valid {
        println!(
            "{} Transactions: {}  Balance change: {}",
            "Valid.".green().bold(),
            money(result.transactions_total),
            money(result.balance_change)
        );
    } else {
        println!(
            "{}\n  Transactions:   {}\n  Balance change: {}\n  Discrepancy:    {}",
            "INVALID".red().bold(),
            money(result.transactions_total),
            money(result.balance_change),
            money(result.discrepancy)
        );
    }
    Ok(())
}

pub fn breaks(ctx: &Context, target: &AccountArgs) -> Result<()> {
    let store = ctx.open(target)?;
    let breaks = find_balance_breaks(&store)?;
    if breaks.is_empty() {
        println!("{}", "Every balance follows from the one before it.".green());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["After", "Date", "Description", "Expected", "Balance"]);
    for b in &breaks {
        table.add_row(vec![
            Cell::new(b.previous.date.format(DATE_FORMAT)),
            Cell::new(b.record.date.format(DATE_FORMAT)),
            Cell::new(&b.record.description),
            Cell::new(money(b.expected)),
            Cell::new(money(b.record.balance).red()),
        ]);
    }
    println!("{table}");
    println!("{} breaks", breaks.len());
    Ok(())
}

pub fn duplicates(ctx: &Context, target: &AccountArgs, remove: bool, yes: bool) -> Result<()> {
    let store = ctx.open(target)?;
    let pairs = find_possible_duplicates(&store)?;
    if pairs.is_empty() {
        println!("No possible duplicates.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Date", "Kept", "Duplicate", "Amount", "Balance"]);
    for (a, b) in &pairs {
        table.add_row(vec![
            Cell::new(a.date.format(DATE_FORMAT)),
            Cell::new(&a.description),
            Cell::new(&b.description),
            Cell::new(maybe_money(a.primary.or(a.secondary))),
            Cell::new(money(a.balance)),
        ]);
    }
    println!("{table}");
    println!("{} possible duplicate pairs", pairs.len());

    if !remove {
        return Ok(());
    }
    let mut ids: Vec<String> = pairs.into_iter().map(|(_, dup)| dup.id).collect();
    ids.sort();
    ids.dedup();

    if !yes {
        let confirmed = Confirm::new()
            .with_prompt(format!("Permanently delete {} transactions?", ids.len()))
            .default(false)
            .interact()
            .unwrap_or(false);
        if !confirmed {
            println!("Nothing deleted.");
            return Ok(());
        }
    }

    let removed = remove_duplicates(&store, &ids)?;
    println!("Removed {removed} transactions.");
    Ok(())
}

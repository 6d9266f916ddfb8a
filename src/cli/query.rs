use std::fmt::Display;

use comfy_table::{Cell, CellAlignment, Table};

use crate::categories::CategoryRegistry;
use crate::cli::{AccountArgs, Context, FilterArgs, OrderArgs};
use crate::error::{MidasError, Result};
use crate::fmt::{maybe_money, money, signed_money};
use crate::models::{AccountKind, OrderBy, Side, TransactionRecord, DATE_FORMAT};
use crate::query::{Aggregate, DescriptionFilter, Query};
use crate::store::TransactionStore;

fn build_query<'s>(
    store: &'s TransactionStore,
    registry: &CategoryRegistry,
    args: &FilterArgs,
) -> Result<Query<'s>> {
    let mut query = store
        .query()
        .filter_include(Side::Primary, !args.exclude_primary)
        .filter_include(Side::Secondary, !args.exclude_secondary)
        .filter_date_range(args.from, args.to, args.outside_dates)
        .filter_amount(args.min, args.max, args.outside_amounts);

    if let Some(name) = &args.category {
        let id = registry.find(name).ok_or_else(|| {
            MidasError::InvalidUsage(format!(
                "category '{name}' does not exist (known: {})",
                registry.names().join(", ")
            ))
        })?;
        query = query.filter_description(DescriptionFilter::Category(registry, id), args.not_matching);
    } else if args.contains.len() == 1 {
        query = query.filter_description(
            DescriptionFilter::Literal(args.contains[0].clone()),
            args.not_matching,
        );
    } else if !args.contains.is_empty() {
        query = query.filter_description(
            DescriptionFilter::AnyOf(args.contains.clone()),
            args.not_matching,
        );
    }

    if let Some(period) = args.group_by {
        query = query.group_by(period);
    }
    Ok(query)
}

fn print_aggregate<T>(header: &str, result: Aggregate<T>, show: impl Fn(T) -> String) {
    match result {
        Aggregate::Scalar(v) => println!("{}", show(v)),
        Aggregate::Grouped(groups) => {
            let mut table = Table::new();
            table.set_header(vec!["Period", header]);
            for (period, v) in groups {
                table.add_row(vec![
                    Cell::new(period),
                    Cell::new(show(v)).set_alignment(CellAlignment::Right),
                ]);
            }
            println!("{table}");
        }
    }
}

pub fn count(ctx: &Context, args: &FilterArgs) -> Result<()> {
    let store = ctx.open(&args.target)?;
    let registry = ctx.registry()?;
    let result = build_query(&store, &registry, args)?.count()?;
    print_aggregate("Count", result, |n| n.to_string());
    Ok(())
}

pub fn sum(ctx: &Context, args: &FilterArgs) -> Result<()> {
    let store = ctx.open(&args.target)?;
    let registry = ctx.registry()?;
    let result = build_query(&store, &registry, args)?.sum()?;
    print_aggregate("Sum", result, |v| signed_money(v).to_string());
    Ok(())
}

pub fn average(ctx: &Context, args: &FilterArgs) -> Result<()> {
    let store = ctx.open(&args.target)?;
    let registry = ctx.registry()?;
    let result = build_query(&store, &registry, args)?.average()?;
    print_aggregate("Average", result, |v| signed_money(v).to_string());
    Ok(())
}

pub fn list(ctx: &Context, args: &FilterArgs, order: &OrderArgs) -> Result<()> {
    let store = ctx.open(&args.target)?;
    let registry = ctx.registry()?;
    let mut query = build_query(&store, &registry, args)?;
    for (requested, key) in [
        (order.by_date, OrderBy::Date),
        (order.by_amount, OrderBy::Amount),
        (order.by_description, OrderBy::Description),
    ] {
        if requested {
            query = query.order_by(key);
        }
    }
    let records = query.ascending(!order.desc).transactions()?;
    print_transactions(store.kind(), &records, &registry);
    Ok(())
}

pub fn uncategorized(ctx: &Context, target: &AccountArgs) -> Result<()> {
    let store = ctx.open(target)?;
    let registry = ctx.registry()?;
    let records = store.query().transactions_without_category(&registry)?;
    print_transactions(store.kind(), &records, &registry);
    Ok(())
}

pub fn balance(ctx: &Context, target: &AccountArgs) -> Result<()> {
    let store = ctx.open(target)?;
    println!("{}", money(store.balance()?));
    Ok(())
}

fn title(column: &str) -> String {
    let mut chars = column.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn right(value: impl Display) -> Cell {
    Cell::new(value).set_alignment(CellAlignment::Right)
}

fn print_transactions(kind: AccountKind, records: &[TransactionRecord], registry: &CategoryRegistry) {
    if records.is_empty() {
        println!("No transactions found.");
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        "Date".to_string(),
        "Description".to_string(),
        title(kind.column(Side::Primary)),
        title(kind.column(Side::Secondary)),
        "Balance".to_string(),
        "Category".to_string(),
    ]);
    for r in records {
        table.add_row(vec![
            Cell::new(r.date.format(DATE_FORMAT)),
            Cell::new(&r.description),
            right(maybe_money(r.primary)),
            right(maybe_money(r.secondary)),
            right(money(r.balance)),
            Cell::new(
                registry
                    .categorize(&r.description)
                    .and_then(|id| registry.name(id))
                    .unwrap_or(""),
            ),
        ]);
    }
    println!("{table}");
    println!("{} transactions", records.len());
}

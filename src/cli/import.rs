use std::path::PathBuf;

use colored::Colorize;

use crate::cli::{AccountArgs, Context};
use crate::error::Result;
use crate::fmt::money;
use crate::importer::import_file;
use crate::reconciler::check_validity;

pub fn run(ctx: &Context, file: &str, target: &AccountArgs) -> Result<()> {
    let file_path = PathBuf::from(file);
    let store = ctx.open(target)?;

    let result = import_file(&store, &file_path)?;

    if result.duplicate_file {
        println!("This file has already been imported (duplicate checksum).");
        return Ok(());
    }

    println!(
        "{} imported, {} skipped (duplicates)",
        result.imported, result.skipped
    );
    if let Some(last) = store.last()? {
        println!("Balance: {}", money(last.balance));
    }
    if !check_validity(&store)? {
        println!(
            "{}",
            "Balances do not add up. Run `midas breaks` to find the gap.".yellow()
        );
    }
    Ok(())
}

use colored::Colorize;

use crate::categories::{CategoryId, CategoryRegistry};
use crate::cli::Context;
use crate::error::Result;

fn tree_lines(registry: &CategoryRegistry, id: CategoryId, depth: usize, out: &mut Vec<String>) {
    let Some(name) = registry.name(id) else {
        return;
    };
    let keywords: Vec<String> = registry.keywords_of_id(id, false).into_iter().collect();
    let indent = "  ".repeat(depth);
    if keywords.is_empty() {
        out.push(format!("{indent}{}", name.bold()));
    } else {
        out.push(format!("{indent}{}  {}", name.bold(), keywords.join(", ").dimmed()));
    }
    for child in registry.children(id) {
        tree_lines(registry, *child, depth + 1, out);
    }
}

pub fn list(ctx: &Context) -> Result<()> {
    let registry = ctx.registry()?;
    if registry.is_empty() {
        println!("No categories. Add one with `midas categories add`.");
        return Ok(());
    }
    let mut lines = Vec::new();
    for root in registry.roots() {
        tree_lines(&registry, *root, 0, &mut lines);
    }
    println!("{}", lines.join("\n"));
    Ok(())
}

/// Applies one mutation and saves the registry when it changed anything.
fn mutate(ctx: &Context, change: impl FnOnce(&mut CategoryRegistry) -> bool) -> Result<bool> {
    let mut registry = ctx.registry()?;
    let changed = change(&mut registry);
    if changed {
        registry.save(&ctx.categories_file)?;
    } else {
        println!("{}", "No change made.".yellow());
    }
    Ok(changed)
}

fn as_strs(items: &[String]) -> Vec<&str> {
    items.iter().map(String::as_str).collect()
}

pub fn add(ctx: &Context, name: &str, parent: Option<&str>, keywords: &[String]) -> Result<()> {
    if mutate(ctx, |r| r.add(name, parent, &as_strs(keywords)).is_some())? {
        match parent {
            Some(p) => println!("Added category: {name} (under {p})"),
            None => println!("Added category: {name}"),
        }
    }
    Ok(())
}

pub fn add_keywords(ctx: &Context, name: &str, keywords: &[String]) -> Result<()> {
    if mutate(ctx, |r| r.add_keywords(name, &as_strs(keywords)))? {
        println!("Added {} keywords to {name}", keywords.len());
    }
    Ok(())
}

pub fn remove_keywords(ctx: &Context, name: &str, keywords: &[String]) -> Result<()> {
    if mutate(ctx, |r| r.remove_keywords(name, &as_strs(keywords)))? {
        println!("Removed {} keywords from {name}", keywords.len());
    }
    Ok(())
}

pub fn keywords(ctx: &Context, name: &str, own: bool) -> Result<()> {
    let registry = ctx.registry()?;
    if registry.find(name).is_none() {
        println!("{}", format!("Category '{name}' does not exist.").yellow());
        return Ok(());
    }
    for keyword in registry.keywords_of(name, !own) {
        println!("{keyword}");
    }
    Ok(())
}

pub fn rename(ctx: &Context, name: &str, new_name: &str) -> Result<()> {
    if mutate(ctx, |r| r.rename(name, new_name))? {
        println!("Renamed category {name} to: {new_name}");
    }
    Ok(())
}

pub fn move_to(ctx: &Context, name: &str, parent: Option<&str>) -> Result<()> {
    if mutate(ctx, |r| r.move_to(name, parent))? {
        match parent {
            Some(p) => println!("Moved {name} under {p}"),
            None => println!("Moved {name} to the top level"),
        }
    }
    Ok(())
}

pub fn remove(ctx: &Context, name: &str) -> Result<()> {
    if mutate(ctx, |r| r.remove(name))? {
        println!("Removed category {name} and its subcategories");
    }
    Ok(())
}

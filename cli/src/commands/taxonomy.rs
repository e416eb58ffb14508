use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use gluco_core::taxonomy::CategoryIndex;

pub(crate) fn cmd_taxonomy_stats(json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct CategoryRow {
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "Foods")]
        count: usize,
    }

    let stats = CategoryIndex::global().statistics();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let rows: Vec<CategoryRow> = stats
        .per_category
        .iter()
        .map(|(category, count)| CategoryRow {
            category: category.clone(),
            count: *count,
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    let distinct = stats.distinct_foods;
    let multi = stats.multi_category_foods;
    let total = stats.total_entries;
    println!("{distinct} distinct foods, {multi} in multiple categories, {total} entries total");
    Ok(())
}

pub(crate) fn cmd_taxonomy_of(food: &str, json: bool) -> Result<()> {
    let categories = CategoryIndex::global().categories_of(food);

    if json {
        println!("{}", serde_json::to_string_pretty(&categories)?);
        return Ok(());
    }

    if categories.is_empty() {
        eprintln!("'{food}' is not in the taxonomy");
        process::exit(2);
    }

    println!("{food}: {}", categories.join(", "));
    Ok(())
}

pub(crate) fn cmd_taxonomy_multi(json: bool) -> Result<()> {
    let multi = CategoryIndex::global().foods_with_multiple_categories();

    if json {
        println!("{}", serde_json::to_string_pretty(&multi)?);
        return Ok(());
    }

    for (food, categories) in &multi {
        println!("{food}: {}", categories.join(", "));
    }
    Ok(())
}

pub(crate) fn cmd_taxonomy_filter(categories: &[String], json: bool) -> Result<()> {
    let wanted: Vec<&str> = categories.iter().map(String::as_str).collect();
    let foods = CategoryIndex::global().filter_by_exact_category_set(&wanted);

    if json {
        println!("{}", serde_json::to_string_pretty(&foods)?);
        return Ok(());
    }

    if foods.is_empty() {
        eprintln!("No foods with exactly these categories: {}", wanted.join(", "));
        process::exit(2);
    }

    for food in &foods {
        println!("{food}");
    }
    Ok(())
}

use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use gluco_core::models::{NewFood, validate_food_category, validate_food_data};
use gluco_core::service::GlucoService;

use super::helpers::fmt_opt;

pub(crate) fn cmd_food_add(
    svc: &GlucoService,
    name: &str,
    category: &str,
    glycemic_index: Option<f64>,
    calories: Option<f64>,
    json: bool,
) -> Result<()> {
    let category = validate_food_category(category)?;
    validate_food_data(name, glycemic_index, calories)?;

    let food = svc.add_food(&NewFood {
        name: name.trim().to_string(),
        category,
        glycemic_index,
        calories_per_100g: calories,
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&food)?);
        return Ok(());
    }

    let id = food.id;
    let name = &food.name;
    let category = &food.category;
    println!("Added food [{id}] {name} ({category})");
    Ok(())
}

pub(crate) fn cmd_food_list(svc: &GlucoService, category: Option<&str>, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct FoodRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "GI")]
        glycemic_index: String,
        #[tabled(rename = "kcal/100g")]
        calories: String,
    }

    let category = category.map(validate_food_category).transpose()?;
    let foods = svc.list_foods(category.as_deref())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&foods)?);
        return Ok(());
    }

    if foods.is_empty() {
        eprintln!("No foods in the catalog");
        process::exit(2);
    }

    let rows: Vec<FoodRow> = foods
        .iter()
        .map(|f| FoodRow {
            id: f.id,
            name: f.name.clone(),
            category: f.category.clone(),
            glycemic_index: fmt_opt(f.glycemic_index),
            calories: fmt_opt(f.calories_per_100g),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

pub(crate) fn cmd_food_show(svc: &GlucoService, name_or_id: &str, json: bool) -> Result<()> {
    let food = match name_or_id.parse::<i64>() {
        Ok(id) => svc.get_food(id)?,
        Err(_) => match svc.get_food_by_name(name_or_id)? {
            Some(food) => food,
            None => {
                eprintln!("No food named '{name_or_id}'");
                process::exit(2);
            }
        },
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&food)?);
        return Ok(());
    }

    let id = food.id;
    let name = &food.name;
    let category = &food.category;
    println!("[{id}] {name} ({category})");
    println!("  glycemic index: {}", fmt_opt(food.glycemic_index));
    if let Some(impact) = food.glycemic_impact() {
        println!("  glycemic impact: {impact:?}");
    }
    println!("  calories/100g:  {}", fmt_opt(food.calories_per_100g));
    Ok(())
}

pub(crate) fn cmd_food_delete(svc: &GlucoService, id: i64, json: bool) -> Result<()> {
    let deleted = svc.delete_food(id)?;
    if json {
        println!("{}", serde_json::json!({ "deleted": deleted }));
        return Ok(());
    }
    if deleted {
        println!("Deleted food [{id}]");
    } else {
        eprintln!("No food with ID {id}");
        process::exit(2);
    }
    Ok(())
}

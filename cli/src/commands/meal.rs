use anyhow::{Result, bail};
use std::process;

use gluco_core::models::{NewMeal, NewMealItem, validate_meal_type, validate_quantity};
use gluco_core::service::GlucoService;

use super::helpers::{fmt_opt, parse_date, parse_datetime};

pub(crate) fn cmd_meal_create(
    svc: &GlucoService,
    meal_type: &str,
    at: Option<String>,
    notes: Option<String>,
    json: bool,
) -> Result<()> {
    let meal_type = validate_meal_type(meal_type)?;
    let eaten_at = parse_datetime(at)?;
    let meal = svc.create_meal(&NewMeal {
        meal_type,
        eaten_at,
        notes,
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meal)?);
        return Ok(());
    }

    let id = meal.id;
    let meal_type = &meal.meal_type;
    let eaten_at = &meal.eaten_at;
    println!("Created meal [{id}] {meal_type} at {eaten_at}");
    Ok(())
}

pub(crate) fn cmd_meal_add_item(
    svc: &GlucoService,
    meal_id: i64,
    food: &str,
    quantity: f64,
    unit: &str,
    json: bool,
) -> Result<()> {
    validate_quantity(quantity)?;

    let food_id = match food.parse::<i64>() {
        Ok(id) => svc.get_food(id)?.id,
        Err(_) => match svc.get_food_by_name(food)? {
            Some(f) => f.id,
            None => bail!("No food named '{food}'. Add it first with `gluco food add`"),
        },
    };

    let item = svc.add_meal_item(
        meal_id,
        &NewMealItem {
            food_id,
            quantity,
            unit: unit.to_lowercase(),
        },
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
        return Ok(());
    }

    let id = item.id;
    let name = &item.food_name;
    let grams = item.grams;
    let calories = item.calories;
    println!("Added item [{id}] {quantity} {unit} of {name} ({grams:.0}g, {calories:.0} kcal)");
    Ok(())
}

pub(crate) fn cmd_meal_show(svc: &GlucoService, meal_id: i64, json: bool) -> Result<()> {
    let detail = svc.meal_detail(meal_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    print_meal(&detail);
    Ok(())
}

pub(crate) fn cmd_meal_list(svc: &GlucoService, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date)?;
    let meals = svc.list_meals(date)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meals)?);
        return Ok(());
    }

    if meals.is_empty() {
        eprintln!("No meals for {date}");
        process::exit(2);
    }

    println!("=== {date} ===\n");
    for meal in &meals {
        print_meal(meal);
        println!();
    }

    let day_total: f64 = meals.iter().map(|m| m.total_calories).sum();
    println!("  DAY TOTAL: {day_total:.0} kcal");
    Ok(())
}

pub(crate) fn cmd_meal_delete(svc: &GlucoService, meal_id: i64, json: bool) -> Result<()> {
    let deleted = svc.delete_meal(meal_id)?;
    if json {
        println!("{}", serde_json::json!({ "deleted": deleted }));
        return Ok(());
    }
    if deleted {
        println!("Deleted meal [{meal_id}] and its items");
    } else {
        eprintln!("No meal with ID {meal_id}");
        process::exit(2);
    }
    Ok(())
}

pub(crate) fn cmd_meal_remove_item(svc: &GlucoService, item_id: i64, json: bool) -> Result<()> {
    let removed = svc.remove_meal_item(item_id)?;
    if json {
        println!("{}", serde_json::json!({ "removed": removed }));
        return Ok(());
    }
    if removed {
        println!("Removed item [{item_id}]");
    } else {
        eprintln!("No meal item with ID {item_id}");
        process::exit(2);
    }
    Ok(())
}

fn print_meal(detail: &gluco_core::models::MealDetail) {
    let id = detail.id;
    let label = detail.meal_type.to_uppercase();
    let total = detail.total_calories;
    println!("  [{id}] {label} ({total:.0} kcal)");
    for item in &detail.items {
        let item_id = item.id;
        let name = &item.food_name;
        let quantity = item.quantity;
        let unit = &item.unit;
        let grams = item.grams;
        let calories = item.calories;
        let gi = fmt_opt(item.glycemic_index);
        println!(
            "    [{item_id}] {name} — {quantity} {unit} ({grams:.0}g) — {calories:.0} kcal | GI:{gi}"
        );
    }
    match detail.weighted_glycemic_index {
        Some(wgi) => println!("    weighted GI: {wgi:.2}"),
        None => println!("    weighted GI: unknown"),
    }
}

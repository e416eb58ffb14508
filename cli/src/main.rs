mod commands;
mod config;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;

use crate::commands::{
    cmd_config_refresh, cmd_config_reminders, cmd_config_set, cmd_config_show, cmd_food_add,
    cmd_food_delete, cmd_food_list, cmd_food_show, cmd_glucose_check, cmd_glucose_delete,
    cmd_glucose_list, cmd_glucose_log, cmd_meal_add_item, cmd_meal_create, cmd_meal_delete,
    cmd_meal_list, cmd_meal_remove_item, cmd_meal_show, cmd_profile_set, cmd_profile_show,
    cmd_taxonomy_filter, cmd_taxonomy_multi, cmd_taxonomy_of, cmd_taxonomy_stats,
};
use crate::config::Config;
use gluco_core::service::GlucoService;

#[derive(Parser)]
#[command(
    name = "gluco",
    version,
    about = "A simple glucose & nutrition tracker CLI",
    long_about = "\n\n   ██████╗ ██╗     ██╗   ██╗ ██████╗ ██████╗
  ██╔════╝ ██║     ██║   ██║██╔════╝██╔═══██╗
  ██║  ███╗██║     ██║   ██║██║     ██║   ██║
  ██║   ██║██║     ██║   ██║██║     ██║   ██║
  ╚██████╔╝███████╗╚██████╔╝╚██████╗╚██████╔╝
   ╚═════╝ ╚══════╝ ╚═════╝  ╚═════╝ ╚═════╝
       track glucose. know your meals.
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Glucose readings and classification
    Glucose {
        #[command(subcommand)]
        command: GlucoseCommands,
    },
    /// Food catalog maintenance
    Food {
        #[command(subcommand)]
        command: FoodCommands,
    },
    /// Meals and their line items
    Meal {
        #[command(subcommand)]
        command: MealCommands,
    },
    /// Glucose thresholds and reminder configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Static food-category taxonomy queries
    Taxonomy {
        #[command(subcommand)]
        command: TaxonomyCommands,
    },
    /// User biometrics profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum GlucoseCommands {
    /// Log a glucose reading (mg/dL)
    Log {
        /// Reading value in mg/dL
        value: f64,
        /// When the reading was taken (default: now)
        #[arg(long)]
        at: Option<String>,
        /// Free-form note
        #[arg(long)]
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List readings with their classification
    List {
        /// Only show readings from the last N days
        #[arg(short, long)]
        days: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Classify a value against the current thresholds without logging it
    Check {
        /// Value in mg/dL
        value: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a reading by ID
    Delete {
        /// Reading ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum FoodCommands {
    /// Add a food to the catalog
    Add {
        /// Food name (unique)
        name: String,
        /// Category: protein, carbohydrate, fat, vegetable, fruit, dairy, other
        #[arg(short, long)]
        category: String,
        /// Glycemic index (0-100)
        #[arg(long)]
        gi: Option<f64>,
        /// Calories per 100 g
        #[arg(long)]
        calories: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List catalog foods
    List {
        /// Filter by category
        #[arg(short, long)]
        category: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one food by name or ID
    Show {
        /// Food name or numeric ID
        food: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a food by ID (must not be referenced by any meal)
    Delete {
        /// Food ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum MealCommands {
    /// Create a meal
    Create {
        /// Meal type: breakfast, lunch, dinner, snack
        meal_type: String,
        /// When the meal was eaten (default: now)
        #[arg(long)]
        at: Option<String>,
        /// Free-form note
        #[arg(long)]
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a line item to a meal
    Add {
        /// Meal ID
        meal_id: i64,
        /// Food name or numeric ID
        food: String,
        /// Portion quantity
        quantity: f64,
        /// Portion unit: grams, pieces, cups, tablespoons, ml (default: grams)
        #[arg(short, long, default_value = "grams")]
        unit: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a meal with items, calories, and weighted glycemic index
    Show {
        /// Meal ID
        meal_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List meals for a date (default: today)
    List {
        /// Date (YYYY-MM-DD or today/yesterday)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a meal and its items
    Delete {
        /// Meal ID
        meal_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a single line item
    RemoveItem {
        /// Meal item ID
        item_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the current thresholds and reminder intervals
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update thresholds or reminder intervals
    Set {
        /// Hypoglycemia threshold (mg/dL)
        #[arg(long)]
        hypo: Option<f64>,
        /// Hyperglycemia threshold (mg/dL)
        #[arg(long)]
        hyper: Option<f64>,
        /// Measurement reminder interval in hours
        #[arg(long)]
        measurement_hours: Option<i64>,
        /// Meal reminder interval in hours
        #[arg(long)]
        meal_hours: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the derived reminder cadence
    Reminders {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Drop the configuration cache and reload from the store
    Refresh {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum TaxonomyCommands {
    /// Per-category and overall statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Categories of one food
    Of {
        /// Food name (snake_case, e.g. fried_rice)
        food: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Foods that belong to more than one category
    Multi {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Foods whose category set matches exactly
    Filter {
        /// Category names (order irrelevant)
        categories: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Show the profile with derived age and BMI
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update profile fields
    Set {
        /// Sex: male, female, other
        #[arg(long)]
        sex: Option<String>,
        /// Birth date (YYYY-MM-DD)
        #[arg(long)]
        birth_date: Option<String>,
        /// Weight in kilograms
        #[arg(long)]
        weight: Option<f64>,
        /// Height in meters
        #[arg(long)]
        height: Option<f64>,
        /// Activity level: sedentary, light, moderate, intense
        #[arg(long)]
        activity: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let svc = GlucoService::new(
        config
            .db_path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Database path is not valid UTF-8"))?,
    )?;

    match cli.command {
        Commands::Glucose { command } => match command {
            GlucoseCommands::Log {
                value,
                at,
                notes,
                json,
            } => cmd_glucose_log(&svc, value, at, notes, json),
            GlucoseCommands::List { days, json } => cmd_glucose_list(&svc, days, json),
            GlucoseCommands::Check { value, json } => cmd_glucose_check(&svc, value, json),
            GlucoseCommands::Delete { id, json } => cmd_glucose_delete(&svc, id, json),
        },
        Commands::Food { command } => match command {
            FoodCommands::Add {
                name,
                category,
                gi,
                calories,
                json,
            } => cmd_food_add(&svc, &name, &category, gi, calories, json),
            FoodCommands::List { category, json } => {
                cmd_food_list(&svc, category.as_deref(), json)
            }
            FoodCommands::Show { food, json } => cmd_food_show(&svc, &food, json),
            FoodCommands::Delete { id, json } => cmd_food_delete(&svc, id, json),
        },
        Commands::Meal { command } => match command {
            MealCommands::Create {
                meal_type,
                at,
                notes,
                json,
            } => cmd_meal_create(&svc, &meal_type, at, notes, json),
            MealCommands::Add {
                meal_id,
                food,
                quantity,
                unit,
                json,
            } => cmd_meal_add_item(&svc, meal_id, &food, quantity, &unit, json),
            MealCommands::Show { meal_id, json } => cmd_meal_show(&svc, meal_id, json),
            MealCommands::List { date, json } => cmd_meal_list(&svc, date, json),
            MealCommands::Delete { meal_id, json } => cmd_meal_delete(&svc, meal_id, json),
            MealCommands::RemoveItem { item_id, json } => {
                cmd_meal_remove_item(&svc, item_id, json)
            }
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show { json } => cmd_config_show(&svc, json),
            ConfigCommands::Set {
                hypo,
                hyper,
                measurement_hours,
                meal_hours,
                json,
            } => cmd_config_set(&svc, hypo, hyper, measurement_hours, meal_hours, json),
            ConfigCommands::Reminders { json } => cmd_config_reminders(&svc, json),
            ConfigCommands::Refresh { json } => cmd_config_refresh(&svc, json),
        },
        Commands::Taxonomy { command } => match command {
            TaxonomyCommands::Stats { json } => cmd_taxonomy_stats(json),
            TaxonomyCommands::Of { food, json } => cmd_taxonomy_of(&food, json),
            TaxonomyCommands::Multi { json } => cmd_taxonomy_multi(json),
            TaxonomyCommands::Filter { categories, json } => {
                cmd_taxonomy_filter(&categories, json)
            }
        },
        Commands::Profile { command } => match command {
            ProfileCommands::Show { json } => cmd_profile_show(&svc, json),
            ProfileCommands::Set {
                sex,
                birth_date,
                weight,
                height,
                activity,
                json,
            } => cmd_profile_set(&svc, sex, birth_date, weight, height, activity, json),
        },
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let api_key = if no_auth {
                None
            } else {
                let (key, _new) = config.load_or_create_api_key()?;
                Some(key)
            };
            server::start_server(svc, port, &bind, api_key).await
        }
    }
}

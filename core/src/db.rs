use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::models::{
    DEFAULT_HYPER_THRESHOLD, DEFAULT_HYPO_THRESHOLD, DEFAULT_MEAL_REMINDER_HOURS,
    DEFAULT_MEASUREMENT_REMINDER_HOURS, Food, GlucoseReading, Meal, MealDetail, MealItemDetail,
    NewFood, NewGlucoseReading, NewMeal, NewMealItem, Profile, ThresholdConfig, UpdateFood,
    UpdateMealItem, UpdateProfile, UpdateThresholdConfig, item_calories, portion_to_grams,
    total_calories, weighted_glycemic_index,
};

pub struct Database {
    conn: Connection,
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.init()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        // Cascade deletes on meal items require foreign-key enforcement.
        self.conn.pragma_update(None, "foreign_keys", true)?;
        self.migrate()
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS foods (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    category TEXT NOT NULL,
                    glycemic_index REAL,
                    calories_per_100g REAL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS meals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    meal_type TEXT NOT NULL,
                    eaten_at TEXT NOT NULL,
                    notes TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS meal_items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    meal_id INTEGER NOT NULL REFERENCES meals(id) ON DELETE CASCADE,
                    food_id INTEGER NOT NULL REFERENCES foods(id),
                    quantity REAL NOT NULL,
                    unit TEXT NOT NULL,
                    UNIQUE (meal_id, food_id)
                );

                CREATE TABLE IF NOT EXISTS glucose_readings (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    value REAL NOT NULL,
                    measured_at TEXT NOT NULL,
                    notes TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS system_config (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    hypo_threshold REAL NOT NULL,
                    hyper_threshold REAL NOT NULL,
                    measurement_reminder_hours INTEGER NOT NULL,
                    meal_reminder_hours INTEGER NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS profile (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    sex TEXT,
                    birth_date TEXT,
                    weight_kg REAL,
                    height_m REAL,
                    activity_level TEXT NOT NULL DEFAULT 'sedentary',
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_meal_items_meal ON meal_items(meal_id);
                CREATE INDEX IF NOT EXISTS idx_meals_eaten_at ON meals(eaten_at);
                CREATE INDEX IF NOT EXISTS idx_readings_measured_at ON glucose_readings(measured_at);
                CREATE INDEX IF NOT EXISTS idx_foods_category ON foods(category);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Threshold configuration (singleton row) ---

    pub fn load_config(&self) -> Result<Option<ThresholdConfig>> {
        self.conn
            .query_row(
                "SELECT hypo_threshold, hyper_threshold, measurement_reminder_hours,
                        meal_reminder_hours, updated_at
                 FROM system_config WHERE id = 1",
                [],
                |row| {
                    Ok(ThresholdConfig {
                        hypo_threshold: row.get(0)?,
                        hyper_threshold: row.get(1)?,
                        measurement_reminder_hours: row.get(2)?,
                        meal_reminder_hours: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                },
            )
            .optional()
            .context("failed to load system configuration")
    }

    /// Insert the default configuration row. Exactly one configuration may
    /// exist; a second create is a domain error, not an upsert.
    pub fn create_default_config(&self) -> Result<ThresholdConfig> {
        if self.load_config()?.is_some() {
            bail!("System configuration already exists");
        }
        self.conn.execute(
            "INSERT INTO system_config
                 (id, hypo_threshold, hyper_threshold, measurement_reminder_hours,
                  meal_reminder_hours, updated_at)
             VALUES (1, ?1, ?2, ?3, ?4, ?5)",
            params![
                DEFAULT_HYPO_THRESHOLD,
                DEFAULT_HYPER_THRESHOLD,
                DEFAULT_MEASUREMENT_REMINDER_HOURS,
                DEFAULT_MEAL_REMINDER_HOURS,
                now(),
            ],
        )?;
        self.load_config()?
            .context("configuration row missing after insert")
    }

    /// Load the configuration, lazily creating the default row on first use.
    /// Absence is not an error.
    pub fn get_or_create_config(&self) -> Result<ThresholdConfig> {
        match self.load_config()? {
            Some(config) => Ok(config),
            None => self.create_default_config(),
        }
    }

    /// Apply a partial update to the singleton row, bumping `updated_at`.
    /// Field validation happens at the service boundary before this call.
    pub fn update_config(&self, update: &UpdateThresholdConfig) -> Result<ThresholdConfig> {
        let current = self.get_or_create_config()?;
        self.conn.execute(
            "UPDATE system_config
             SET hypo_threshold = ?1, hyper_threshold = ?2,
                 measurement_reminder_hours = ?3, meal_reminder_hours = ?4,
                 updated_at = ?5
             WHERE id = 1",
            params![
                update.hypo_threshold.unwrap_or(current.hypo_threshold),
                update.hyper_threshold.unwrap_or(current.hyper_threshold),
                update
                    .measurement_reminder_hours
                    .unwrap_or(current.measurement_reminder_hours),
                update
                    .meal_reminder_hours
                    .unwrap_or(current.meal_reminder_hours),
                now(),
            ],
        )?;
        self.load_config()?
            .context("configuration row missing after update")
    }

    // --- Food catalog ---

    fn map_food(row: &rusqlite::Row) -> rusqlite::Result<Food> {
        Ok(Food {
            id: row.get(0)?,
            name: row.get(1)?,
            category: row.get(2)?,
            glycemic_index: row.get(3)?,
            calories_per_100g: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    const FOOD_COLUMNS: &'static str =
        "id, name, category, glycemic_index, calories_per_100g, created_at, updated_at";

    pub fn insert_food(&self, food: &NewFood) -> Result<Food> {
        if self.get_food_by_name(&food.name)?.is_some() {
            bail!("Food '{}' already exists", food.name);
        }
        let ts = now();
        self.conn.execute(
            "INSERT INTO foods (name, category, glycemic_index, calories_per_100g,
                                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                food.name,
                food.category,
                food.glycemic_index,
                food.calories_per_100g,
                ts,
                ts,
            ],
        )?;
        self.get_food_by_id(self.conn.last_insert_rowid())
    }

    pub fn get_food_by_id(&self, id: i64) -> Result<Food> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM foods WHERE id = ?1", Self::FOOD_COLUMNS),
                params![id],
                Self::map_food,
            )
            .with_context(|| format!("Food {id} not found"))
    }

    pub fn get_food_by_name(&self, name: &str) -> Result<Option<Food>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM foods WHERE name = ?1", Self::FOOD_COLUMNS),
                params![name],
                Self::map_food,
            )
            .optional()
            .context("failed to query food by name")
    }

    pub fn list_foods(&self, category: Option<&str>) -> Result<Vec<Food>> {
        let sql = match category {
            Some(_) => format!(
                "SELECT {} FROM foods WHERE category = ?1 ORDER BY category, name",
                Self::FOOD_COLUMNS
            ),
            None => format!(
                "SELECT {} FROM foods ORDER BY category, name",
                Self::FOOD_COLUMNS
            ),
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = match category {
            Some(cat) => stmt.query_map(params![cat], Self::map_food)?,
            None => stmt.query_map([], Self::map_food)?,
        };
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn update_food(&self, id: i64, update: &UpdateFood) -> Result<Food> {
        let current = self.get_food_by_id(id)?;
        let glycemic_index = update.glycemic_index.unwrap_or(current.glycemic_index);
        let calories = update
            .calories_per_100g
            .unwrap_or(current.calories_per_100g);
        self.conn.execute(
            "UPDATE foods
             SET category = ?1, glycemic_index = ?2, calories_per_100g = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                update.category.as_deref().unwrap_or(&current.category),
                glycemic_index,
                calories,
                now(),
                id,
            ],
        )?;
        self.get_food_by_id(id)
    }

    pub fn delete_food(&self, id: i64) -> Result<bool> {
        let referenced: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM meal_items WHERE food_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        if referenced > 0 {
            bail!("Food {id} is referenced by {referenced} meal item(s)");
        }
        let affected = self
            .conn
            .execute("DELETE FROM foods WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    // --- Meals & line items ---

    fn map_meal(row: &rusqlite::Row) -> rusqlite::Result<Meal> {
        Ok(Meal {
            id: row.get(0)?,
            meal_type: row.get(1)?,
            eaten_at: row.get(2)?,
            notes: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    const MEAL_COLUMNS: &'static str =
        "id, meal_type, eaten_at, notes, created_at, updated_at";

    pub fn insert_meal(&self, meal: &NewMeal) -> Result<Meal> {
        let ts = now();
        self.conn.execute(
            "INSERT INTO meals (meal_type, eaten_at, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![meal.meal_type, meal.eaten_at, meal.notes, ts, ts],
        )?;
        self.get_meal(self.conn.last_insert_rowid())
    }

    pub fn get_meal(&self, id: i64) -> Result<Meal> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM meals WHERE id = ?1", Self::MEAL_COLUMNS),
                params![id],
                Self::map_meal,
            )
            .with_context(|| format!("Meal {id} not found"))
    }

    pub fn delete_meal(&self, id: i64) -> Result<bool> {
        // Line items go with the meal via ON DELETE CASCADE.
        let affected = self
            .conn
            .execute("DELETE FROM meals WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    pub fn has_meal_item(&self, meal_id: i64, food_id: i64) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM meal_items WHERE meal_id = ?1 AND food_id = ?2",
            params![meal_id, food_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Insert a line item. At most one item per (meal, food) pair may exist.
    pub fn add_meal_item(&self, meal_id: i64, item: &NewMealItem) -> Result<MealItemDetail> {
        self.get_meal(meal_id)?;
        self.get_food_by_id(item.food_id)?;
        if self.has_meal_item(meal_id, item.food_id)? {
            bail!("Meal {meal_id} already has an item for food {}", item.food_id);
        }
        self.conn.execute(
            "INSERT INTO meal_items (meal_id, food_id, quantity, unit)
             VALUES (?1, ?2, ?3, ?4)",
            params![meal_id, item.food_id, item.quantity, item.unit],
        )?;
        let item_id = self.conn.last_insert_rowid();
        self.touch_meal(meal_id)?;
        self.get_meal_item(item_id)
    }

    fn map_item(row: &rusqlite::Row) -> rusqlite::Result<MealItemDetail> {
        let quantity: f64 = row.get(3)?;
        let unit: String = row.get(4)?;
        let calories_per_100g: Option<f64> = row.get(5)?;
        let glycemic_index: Option<f64> = row.get(6)?;
        let grams = portion_to_grams(quantity, &unit);
        Ok(MealItemDetail {
            id: row.get(0)?,
            food_id: row.get(1)?,
            food_name: row.get(2)?,
            quantity,
            unit,
            grams,
            calories: item_calories(grams, calories_per_100g),
            glycemic_index,
        })
    }

    const ITEM_COLUMNS: &'static str = "mi.id, mi.food_id, f.name, mi.quantity, mi.unit,
                f.calories_per_100g, f.glycemic_index";

    pub fn get_meal_item(&self, item_id: i64) -> Result<MealItemDetail> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM meal_items mi JOIN foods f ON f.id = mi.food_id
                     WHERE mi.id = ?1",
                    Self::ITEM_COLUMNS
                ),
                params![item_id],
                Self::map_item,
            )
            .with_context(|| format!("Meal item {item_id} not found"))
    }

    pub fn get_meal_items(&self, meal_id: i64) -> Result<Vec<MealItemDetail>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM meal_items mi JOIN foods f ON f.id = mi.food_id
             WHERE mi.meal_id = ?1 ORDER BY mi.id",
            Self::ITEM_COLUMNS
        ))?;
        let rows = stmt.query_map(params![meal_id], Self::map_item)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn update_meal_item(&self, item_id: i64, update: &UpdateMealItem) -> Result<MealItemDetail> {
        let current = self.get_meal_item(item_id)?;
        self.conn.execute(
            "UPDATE meal_items SET quantity = ?1, unit = ?2 WHERE id = ?3",
            params![
                update.quantity.unwrap_or(current.quantity),
                update.unit.as_deref().unwrap_or(&current.unit),
                item_id,
            ],
        )?;
        self.get_meal_item(item_id)
    }

    pub fn remove_meal_item(&self, item_id: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM meal_items WHERE id = ?1", params![item_id])?;
        Ok(affected > 0)
    }

    fn touch_meal(&self, meal_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE meals SET updated_at = ?1 WHERE id = ?2",
            params![now(), meal_id],
        )?;
        Ok(())
    }

    /// A meal with its joined items and the aggregated calorie / glycemic
    /// metrics.
    pub fn build_meal_detail(&self, meal_id: i64) -> Result<MealDetail> {
        let meal = self.get_meal(meal_id)?;
        let items = self.get_meal_items(meal_id)?;
        let total = total_calories(&items);
        let wgi = weighted_glycemic_index(&items);
        Ok(MealDetail {
            id: meal.id,
            meal_type: meal.meal_type,
            eaten_at: meal.eaten_at,
            notes: meal.notes,
            items,
            total_calories: total,
            weighted_glycemic_index: wgi,
        })
    }

    pub fn list_meals_for_date(&self, date: NaiveDate) -> Result<Vec<MealDetail>> {
        let date = date.format("%Y-%m-%d").to_string();
        let ids: Vec<i64> = {
            let mut stmt = self.conn.prepare(
                "SELECT id FROM meals WHERE date(eaten_at) = ?1 ORDER BY eaten_at",
            )?;
            stmt.query_map(params![date], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?
        };
        ids.into_iter()
            .map(|id| self.build_meal_detail(id))
            .collect()
    }

    // --- Glucose readings ---

    fn map_reading(row: &rusqlite::Row) -> rusqlite::Result<GlucoseReading> {
        Ok(GlucoseReading {
            id: row.get(0)?,
            value: row.get(1)?,
            measured_at: row.get(2)?,
            notes: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    pub fn insert_reading(&self, reading: &NewGlucoseReading) -> Result<GlucoseReading> {
        self.conn.execute(
            "INSERT INTO glucose_readings (value, measured_at, notes, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![reading.value, reading.measured_at, reading.notes, now()],
        )?;
        self.get_reading(self.conn.last_insert_rowid())
    }

    pub fn get_reading(&self, id: i64) -> Result<GlucoseReading> {
        self.conn
            .query_row(
                "SELECT id, value, measured_at, notes, created_at
                 FROM glucose_readings WHERE id = ?1",
                params![id],
                Self::map_reading,
            )
            .with_context(|| format!("Glucose reading {id} not found"))
    }

    /// Readings ordered most-recent first, optionally limited to the last
    /// `days` days of measurements.
    pub fn list_readings(&self, days: Option<i64>) -> Result<Vec<GlucoseReading>> {
        let rows = match days {
            Some(days) => {
                let cutoff = (Utc::now() - chrono::Duration::days(days)).to_rfc3339();
                let mut stmt = self.conn.prepare(
                    "SELECT id, value, measured_at, notes, created_at
                     FROM glucose_readings WHERE measured_at >= ?1
                     ORDER BY measured_at DESC",
                )?;
                stmt.query_map(params![cutoff], Self::map_reading)?
                    .collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, value, measured_at, notes, created_at
                     FROM glucose_readings ORDER BY measured_at DESC",
                )?;
                stmt.query_map([], Self::map_reading)?
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(rows)
    }

    pub fn delete_reading(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM glucose_readings WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    // --- Profile (singleton row) ---

    fn map_profile(row: &rusqlite::Row) -> rusqlite::Result<Profile> {
        Ok(Profile {
            sex: row.get(0)?,
            birth_date: row.get(1)?,
            weight_kg: row.get(2)?,
            height_m: row.get(3)?,
            activity_level: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    pub fn get_profile(&self) -> Result<Profile> {
        let existing = self
            .conn
            .query_row(
                "SELECT sex, birth_date, weight_kg, height_m, activity_level, updated_at
                 FROM profile WHERE id = 1",
                [],
                Self::map_profile,
            )
            .optional()?;
        match existing {
            Some(profile) => Ok(profile),
            None => {
                self.conn.execute(
                    "INSERT INTO profile (id, activity_level, updated_at)
                     VALUES (1, 'sedentary', ?1)",
                    params![now()],
                )?;
                self.get_profile()
            }
        }
    }

    pub fn update_profile(&self, update: &UpdateProfile) -> Result<Profile> {
        let current = self.get_profile()?;
        self.conn.execute(
            "UPDATE profile
             SET sex = ?1, birth_date = ?2, weight_kg = ?3, height_m = ?4,
                 activity_level = ?5, updated_at = ?6
             WHERE id = 1",
            params![
                update.sex.as_deref().or(current.sex.as_deref()),
                update
                    .birth_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .or(current.birth_date),
                update.weight_kg.or(current.weight_kg),
                update.height_m.or(current.height_m),
                update
                    .activity_level
                    .as_deref()
                    .unwrap_or(&current.activity_level),
                now(),
            ],
        )?;
        self.get_profile()
    }
}

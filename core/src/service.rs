use std::path::Path;

use anyhow::Result;
use chrono::NaiveDate;

use crate::db::Database;
use crate::models::{
    Food, GlucoseDetail, GlucoseReading, Meal, MealDetail, MealItemDetail, NewFood,
    NewGlucoseReading, NewMeal, NewMealItem, Profile, ReadingView, ReminderInfo, ThresholdConfig,
    UpdateFood, UpdateMealItem, UpdateProfile, UpdateThresholdConfig, glucose_detail,
    reminder_info, validate_threshold_update,
};
use crate::thresholds::ThresholdCache;

/// Process-wide facade over the store and the threshold-configuration cache.
/// All classification goes through the cached configuration so that an
/// administrative update is visible everywhere once the cache rolls over or
/// is invalidated.
pub struct GlucoService {
    db: Database,
    thresholds: ThresholdCache,
}

impl GlucoService {
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Database::open(Path::new(db_path))?;
        Ok(Self {
            db,
            thresholds: ThresholdCache::new(),
        })
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self {
            db,
            thresholds: ThresholdCache::new(),
        })
    }

    #[cfg(test)]
    fn with_cache_ttl(ttl: std::time::Duration) -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self {
            db,
            thresholds: ThresholdCache::with_ttl(ttl),
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // --- Threshold configuration ---

    /// The current configuration: cached when fresh, loaded (and lazily
    /// created with defaults) otherwise.
    pub fn threshold_config(&self) -> Result<ThresholdConfig> {
        self.thresholds.get_or_load(|| self.db.get_or_create_config())
    }

    /// Evict the cached configuration so the next read hits the store.
    pub fn invalidate_threshold_cache(&self) {
        self.thresholds.invalidate();
    }

    pub fn update_threshold_config(
        &self,
        update: &UpdateThresholdConfig,
    ) -> Result<ThresholdConfig> {
        let current = self.db.get_or_create_config()?;
        validate_threshold_update(&current, update)?;
        let updated = self.db.update_config(update)?;
        self.thresholds.invalidate();
        Ok(updated)
    }

    pub fn reminder_info(&self) -> Result<ReminderInfo> {
        Ok(reminder_info(&self.threshold_config()?))
    }

    // --- Glucose ---

    /// Classification report for an arbitrary value, without persisting it.
    pub fn check_glucose(&self, value: f64) -> Result<GlucoseDetail> {
        Ok(glucose_detail(value, &self.threshold_config()?))
    }

    pub fn log_reading(&self, reading: &NewGlucoseReading) -> Result<ReadingView> {
        let stored = self.db.insert_reading(reading)?;
        self.classify_reading(stored)
    }

    pub fn get_reading(&self, id: i64) -> Result<ReadingView> {
        let reading = self.db.get_reading(id)?;
        self.classify_reading(reading)
    }

    pub fn reading_detail(&self, id: i64) -> Result<GlucoseDetail> {
        let reading = self.db.get_reading(id)?;
        self.check_glucose(reading.value)
    }

    pub fn list_readings(&self, days: Option<i64>) -> Result<Vec<ReadingView>> {
        let config = self.threshold_config()?;
        let readings = self.db.list_readings(days)?;
        Ok(readings
            .into_iter()
            .map(|r| ReadingView::from_reading(r, &config))
            .collect())
    }

    pub fn delete_reading(&self, id: i64) -> Result<bool> {
        self.db.delete_reading(id)
    }

    fn classify_reading(&self, reading: GlucoseReading) -> Result<ReadingView> {
        let config = self.threshold_config()?;
        Ok(ReadingView::from_reading(reading, &config))
    }

    // --- Food catalog ---

    pub fn add_food(&self, food: &NewFood) -> Result<Food> {
        self.db.insert_food(food)
    }

    pub fn get_food(&self, id: i64) -> Result<Food> {
        self.db.get_food_by_id(id)
    }

    pub fn get_food_by_name(&self, name: &str) -> Result<Option<Food>> {
        self.db.get_food_by_name(name)
    }

    pub fn list_foods(&self, category: Option<&str>) -> Result<Vec<Food>> {
        self.db.list_foods(category)
    }

    pub fn update_food(&self, id: i64, update: &UpdateFood) -> Result<Food> {
        self.db.update_food(id, update)
    }

    pub fn delete_food(&self, id: i64) -> Result<bool> {
        self.db.delete_food(id)
    }

    // --- Meals ---

    pub fn create_meal(&self, meal: &NewMeal) -> Result<Meal> {
        self.db.insert_meal(meal)
    }

    pub fn meal_detail(&self, meal_id: i64) -> Result<MealDetail> {
        self.db.build_meal_detail(meal_id)
    }

    pub fn list_meals(&self, date: NaiveDate) -> Result<Vec<MealDetail>> {
        self.db.list_meals_for_date(date)
    }

    pub fn delete_meal(&self, meal_id: i64) -> Result<bool> {
        self.db.delete_meal(meal_id)
    }

    pub fn add_meal_item(&self, meal_id: i64, item: &NewMealItem) -> Result<MealItemDetail> {
        self.db.add_meal_item(meal_id, item)
    }

    pub fn update_meal_item(
        &self,
        item_id: i64,
        update: &UpdateMealItem,
    ) -> Result<MealItemDetail> {
        self.db.update_meal_item(item_id, update)
    }

    pub fn remove_meal_item(&self, item_id: i64) -> Result<bool> {
        self.db.remove_meal_item(item_id)
    }

    // --- Profile ---

    pub fn profile(&self) -> Result<Profile> {
        self.db.get_profile()
    }

    pub fn update_profile(&self, update: &UpdateProfile) -> Result<Profile> {
        self.db.update_profile(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GlucoseStatus;
    use std::time::Duration;

    fn rice() -> NewFood {
        NewFood {
            name: "rice".to_string(),
            category: "carbohydrate".to_string(),
            glycemic_index: Some(73.0),
            calories_per_100g: Some(130.0),
        }
    }

    #[test]
    fn test_threshold_config_is_cached() {
        let svc = GlucoService::new_in_memory().unwrap();
        let first = svc.threshold_config().unwrap();

        // Mutate the store directly; the cached value must still be served
        svc.database()
            .update_config(&UpdateThresholdConfig {
                hypo_threshold: Some(90.0),
                ..Default::default()
            })
            .unwrap();

        let cached = svc.threshold_config().unwrap();
        assert!((cached.hypo_threshold - first.hypo_threshold).abs() < f64::EPSILON);

        // Invalidation exposes the new value
        svc.invalidate_threshold_cache();
        let fresh = svc.threshold_config().unwrap();
        assert!((fresh.hypo_threshold - 90.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_threshold_cache_expiry_reloads() {
        let svc = GlucoService::with_cache_ttl(Duration::from_millis(0)).unwrap();
        svc.threshold_config().unwrap();

        svc.database()
            .update_config(&UpdateThresholdConfig {
                hyper_threshold: Some(180.0),
                ..Default::default()
            })
            .unwrap();

        std::thread::sleep(Duration::from_millis(5));
        let fresh = svc.threshold_config().unwrap();
        assert!((fresh.hyper_threshold - 180.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_update_threshold_config_validates_and_invalidates() {
        let svc = GlucoService::new_in_memory().unwrap();

        // Inverted thresholds are rejected
        let err = svc
            .update_threshold_config(&UpdateThresholdConfig {
                hypo_threshold: Some(250.0),
                ..Default::default()
            })
            .unwrap_err();
        assert!(err.to_string().contains("must be below"));

        // A valid update is visible immediately (cache invalidated)
        svc.update_threshold_config(&UpdateThresholdConfig {
            hypo_threshold: Some(80.0),
            ..Default::default()
        })
        .unwrap();
        let config = svc.threshold_config().unwrap();
        assert!((config.hypo_threshold - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_check_glucose_uses_current_config() {
        let svc = GlucoService::new_in_memory().unwrap();

        let detail = svc.check_glucose(75.0).unwrap();
        assert_eq!(detail.status, GlucoseStatus::Normal);

        svc.update_threshold_config(&UpdateThresholdConfig {
            hypo_threshold: Some(80.0),
            ..Default::default()
        })
        .unwrap();

        let detail = svc.check_glucose(75.0).unwrap();
        assert_eq!(detail.status, GlucoseStatus::Hypoglycemia);
        assert!(detail.requires_attention);
    }

    #[test]
    fn test_log_and_list_readings_with_classification() {
        let svc = GlucoService::new_in_memory().unwrap();

        let view = svc
            .log_reading(&NewGlucoseReading {
                value: 210.0,
                measured_at: "2024-06-15T21:00:00+00:00".to_string(),
                notes: None,
            })
            .unwrap();
        assert_eq!(view.status, GlucoseStatus::Hyperglycemia);
        assert!(view.is_alert);

        let listed = svc.list_readings(None).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, GlucoseStatus::Hyperglycemia);
    }

    #[test]
    fn test_meal_flow_through_service() {
        let svc = GlucoService::new_in_memory().unwrap();
        let food = svc.add_food(&rice()).unwrap();
        let meal = svc
            .create_meal(&NewMeal {
                meal_type: "lunch".to_string(),
                eaten_at: "2024-06-15T12:30:00".to_string(),
                notes: None,
            })
            .unwrap();
        svc.add_meal_item(
            meal.id,
            &NewMealItem {
                food_id: food.id,
                quantity: 2.0,
                unit: "cups".to_string(),
            },
        )
        .unwrap();

        let detail = svc.meal_detail(meal.id).unwrap();
        assert!((detail.total_calories - 650.0).abs() < f64::EPSILON);
        assert!((detail.weighted_glycemic_index.unwrap() - 73.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reminder_info_from_defaults() {
        let svc = GlucoService::new_in_memory().unwrap();
        let info = svc.reminder_info().unwrap();
        assert_eq!(info.measurements_per_day, 3);
        assert_eq!(info.meal_reminders_per_day, 4);
    }
}

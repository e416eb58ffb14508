use anyhow::{Result, bail};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

// --- Threshold configuration ---

pub const DEFAULT_HYPO_THRESHOLD: f64 = 70.0;
pub const DEFAULT_HYPER_THRESHOLD: f64 = 200.0;
pub const DEFAULT_MEASUREMENT_REMINDER_HOURS: i64 = 8;
pub const DEFAULT_MEAL_REMINDER_HOURS: i64 = 6;

/// System-wide glucose alert thresholds and reminder intervals.
/// Exactly one row exists in the store; it is created lazily with the
/// defaults above on first read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub hypo_threshold: f64,
    pub hyper_threshold: f64,
    pub measurement_reminder_hours: i64,
    pub meal_reminder_hours: i64,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateThresholdConfig {
    pub hypo_threshold: Option<f64>,
    pub hyper_threshold: Option<f64>,
    pub measurement_reminder_hours: Option<i64>,
    pub meal_reminder_hours: Option<i64>,
}

impl UpdateThresholdConfig {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hypo_threshold.is_none()
            && self.hyper_threshold.is_none()
            && self.measurement_reminder_hours.is_none()
            && self.meal_reminder_hours.is_none()
    }
}

/// Validate a partial threshold update against the current configuration.
/// The resulting configuration must keep `hypo_threshold < hyper_threshold`
/// and positive reminder intervals.
pub fn validate_threshold_update(
    current: &ThresholdConfig,
    update: &UpdateThresholdConfig,
) -> Result<()> {
    let hypo = update.hypo_threshold.unwrap_or(current.hypo_threshold);
    let hyper = update.hyper_threshold.unwrap_or(current.hyper_threshold);
    if hypo <= 0.0 || hyper <= 0.0 {
        bail!("Thresholds must be greater than 0");
    }
    if hypo >= hyper {
        bail!("hypo_threshold ({hypo}) must be below hyper_threshold ({hyper})");
    }
    let measurement = update
        .measurement_reminder_hours
        .unwrap_or(current.measurement_reminder_hours);
    let meal = update
        .meal_reminder_hours
        .unwrap_or(current.meal_reminder_hours);
    if measurement <= 0 || meal <= 0 {
        bail!("Reminder intervals must be greater than 0 hours");
    }
    Ok(())
}

// --- Glucose classification ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlucoseStatus {
    Hypoglycemia,
    Hyperglycemia,
    Normal,
}

impl GlucoseStatus {
    /// Classify a reading against the configured thresholds. Values exactly
    /// on a threshold are normal (strict inequalities on both bounds).
    #[must_use]
    pub fn classify(value: f64, config: &ThresholdConfig) -> Self {
        if value < config.hypo_threshold {
            Self::Hypoglycemia
        } else if value > config.hyper_threshold {
            Self::Hyperglycemia
        } else {
            Self::Normal
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hypoglycemia => "hypoglycemia",
            Self::Hyperglycemia => "hyperglycemia",
            Self::Normal => "normal",
        }
    }

    #[must_use]
    pub fn is_alert(self) -> bool {
        self != Self::Normal
    }
}

/// Full classification report for a single reading.
#[derive(Debug, Clone, Serialize)]
pub struct GlucoseDetail {
    pub value: f64,
    pub status: GlucoseStatus,
    pub hypo_threshold: f64,
    pub hyper_threshold: f64,
    pub in_normal_range: bool,
    pub requires_attention: bool,
    /// Signed difference from the hypoglycemia threshold (`value - hypo`).
    pub hypo_threshold_delta: f64,
    /// Signed difference from the hyperglycemia threshold (`hyper - value`).
    pub hyper_threshold_delta: f64,
    pub config_updated_at: String,
}

#[must_use]
pub fn glucose_detail(value: f64, config: &ThresholdConfig) -> GlucoseDetail {
    let status = GlucoseStatus::classify(value, config);
    GlucoseDetail {
        value,
        status,
        hypo_threshold: config.hypo_threshold,
        hyper_threshold: config.hyper_threshold,
        in_normal_range: status == GlucoseStatus::Normal,
        requires_attention: status != GlucoseStatus::Normal,
        hypo_threshold_delta: value - config.hypo_threshold,
        hyper_threshold_delta: config.hyper_threshold - value,
        config_updated_at: config.updated_at.clone(),
    }
}

/// Reminder cadence derived from the configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ReminderInfo {
    pub measurement_hours: i64,
    pub meal_hours: i64,
    pub measurements_per_day: i64,
    pub meal_reminders_per_day: i64,
    pub config_updated_at: String,
}

#[must_use]
pub fn reminder_info(config: &ThresholdConfig) -> ReminderInfo {
    ReminderInfo {
        measurement_hours: config.measurement_reminder_hours,
        meal_hours: config.meal_reminder_hours,
        measurements_per_day: 24 / config.measurement_reminder_hours,
        meal_reminders_per_day: 24 / config.meal_reminder_hours,
        config_updated_at: config.updated_at.clone(),
    }
}

// --- Glucose readings ---

#[derive(Debug, Clone, Serialize)]
pub struct GlucoseReading {
    pub id: i64,
    pub value: f64,
    pub measured_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewGlucoseReading {
    pub value: f64,
    pub measured_at: String,
    pub notes: Option<String>,
}

/// A stored reading with its derived classification. The status is computed
/// against the live configuration at read time, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ReadingView {
    pub id: i64,
    pub value: f64,
    pub measured_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub status: GlucoseStatus,
    pub is_alert: bool,
    pub created_at: String,
}

impl ReadingView {
    #[must_use]
    pub fn from_reading(reading: GlucoseReading, config: &ThresholdConfig) -> Self {
        let status = GlucoseStatus::classify(reading.value, config);
        Self {
            id: reading.id,
            value: reading.value,
            measured_at: reading.measured_at,
            notes: reading.notes,
            status,
            is_alert: status.is_alert(),
            created_at: reading.created_at,
        }
    }
}

// --- Food catalog ---

pub const FOOD_CATEGORIES: &[&str] = &[
    "protein",
    "carbohydrate",
    "fat",
    "vegetable",
    "fruit",
    "dairy",
    "other",
];

pub fn validate_food_category(category: &str) -> Result<String> {
    let lower = category.to_lowercase();
    if FOOD_CATEGORIES.contains(&lower.as_str()) {
        Ok(lower)
    } else {
        bail!(
            "Invalid food category '{category}'. Must be one of: {}",
            FOOD_CATEGORIES.join(", ")
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Food {
    pub id: i64,
    pub name: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub glycemic_index: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calories_per_100g: Option<f64>,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Qualitative glycemic-impact bands used for catalog display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GlycemicImpact {
    Low,
    Medium,
    High,
}

impl Food {
    /// Band the glycemic index: low <= 55 < medium <= 70 < high.
    /// None when the index is unknown.
    #[must_use]
    pub fn glycemic_impact(&self) -> Option<GlycemicImpact> {
        let gi = self.glycemic_index?;
        if gi <= 55.0 {
            Some(GlycemicImpact::Low)
        } else if gi <= 70.0 {
            Some(GlycemicImpact::Medium)
        } else {
            Some(GlycemicImpact::High)
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewFood {
    pub name: String,
    pub category: String,
    pub glycemic_index: Option<f64>,
    pub calories_per_100g: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateFood {
    pub category: Option<String>,
    pub glycemic_index: Option<Option<f64>>,
    pub calories_per_100g: Option<Option<f64>>,
}

/// Validate catalog data: name must not be empty, glycemic index in [0, 100],
/// calories non-negative.
pub fn validate_food_data(
    name: &str,
    glycemic_index: Option<f64>,
    calories_per_100g: Option<f64>,
) -> Result<()> {
    if name.trim().is_empty() {
        bail!("Food name must not be empty");
    }
    if glycemic_index.is_some_and(|gi| !(0.0..=100.0).contains(&gi)) {
        bail!("glycemic_index must be between 0 and 100");
    }
    if calories_per_100g.is_some_and(|c| c < 0.0) {
        bail!("calories_per_100g must not be negative");
    }
    Ok(())
}

// --- Meals ---

pub const MEAL_TYPES: &[&str] = &["breakfast", "lunch", "dinner", "snack"];

pub fn validate_meal_type(meal: &str) -> Result<String> {
    let lower = meal.to_lowercase();
    if MEAL_TYPES.contains(&lower.as_str()) {
        Ok(lower)
    } else {
        bail!(
            "Invalid meal type '{meal}'. Must be one of: {}",
            MEAL_TYPES.join(", ")
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Meal {
    pub id: i64,
    pub meal_type: String,
    pub eaten_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewMeal {
    pub meal_type: String,
    pub eaten_at: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewMealItem {
    pub food_id: i64,
    pub quantity: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateMealItem {
    pub quantity: Option<f64>,
    pub unit: Option<String>,
}

/// A meal line item joined with its food, plus the derived mass and calories.
#[derive(Debug, Clone, Serialize)]
pub struct MealItemDetail {
    pub id: i64,
    pub food_id: i64,
    pub food_name: String,
    pub quantity: f64,
    pub unit: String,
    pub grams: f64,
    pub calories: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub glycemic_index: Option<f64>,
}

/// A meal with its items and aggregated metrics.
#[derive(Debug, Clone, Serialize)]
pub struct MealDetail {
    pub id: i64,
    pub meal_type: String,
    pub eaten_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub items: Vec<MealItemDetail>,
    pub total_calories: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weighted_glycemic_index: Option<f64>,
}

// --- Unit conversion ---

/// Portion units accepted for meal items, with their per-unit gram factors.
pub const PORTION_UNITS: &[(&str, f64)] = &[
    ("grams", 1.0),
    ("pieces", 100.0),
    ("cups", 250.0),
    ("tablespoons", 15.0),
    ("ml", 1.0),
];

/// Convert a portion quantity to grams using fixed per-unit factors.
/// Unrecognized units are treated as already-grams (factor 1) rather than
/// rejected; raw payload validation belongs to the caller's boundary layer.
#[must_use]
pub fn portion_to_grams(quantity: f64, unit: &str) -> f64 {
    let lower = unit.to_lowercase();
    let factor = PORTION_UNITS
        .iter()
        .find(|(name, _)| *name == lower)
        .map_or(1.0, |(_, factor)| *factor);
    quantity * factor
}

/// Round to two decimal places, the catalog's storage precision.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Calories contributed by a single item: zero when the food's calorie
/// density is unknown, otherwise rounded to two decimals per item.
#[must_use]
pub fn item_calories(grams: f64, calories_per_100g: Option<f64>) -> f64 {
    match calories_per_100g {
        Some(cal) => round2(grams * cal / 100.0),
        None => 0.0,
    }
}

/// Sum of the already-rounded per-item calories. Rounding happens per item
/// before summation, so the total is a sum of rounded values, not a rounded
/// sum.
#[must_use]
pub fn total_calories(items: &[MealItemDetail]) -> f64 {
    items.iter().map(|i| i.calories).sum()
}

/// Mass-weighted average glycemic index over the items whose food has a
/// known index. Items with an unknown index contribute to neither the
/// numerator nor the denominator. None when no weighable item exists.
#[must_use]
pub fn weighted_glycemic_index(items: &[MealItemDetail]) -> Option<f64> {
    let mut total_weight = 0.0;
    let mut weighted_sum = 0.0;
    for item in items {
        if let Some(gi) = item.glycemic_index {
            weighted_sum += item.grams * gi;
            total_weight += item.grams;
        }
    }
    if total_weight > 0.0 {
        Some(round2(weighted_sum / total_weight))
    } else {
        None
    }
}

pub fn validate_quantity(quantity: f64) -> Result<()> {
    if quantity <= 0.0 {
        bail!("quantity must be greater than 0");
    }
    Ok(())
}

// --- Profile ---

pub const SEXES: &[&str] = &["male", "female", "other"];
pub const ACTIVITY_LEVELS: &[&str] = &["sedentary", "light", "moderate", "intense"];

pub fn validate_sex(sex: &str) -> Result<String> {
    let lower = sex.to_lowercase();
    if SEXES.contains(&lower.as_str()) {
        Ok(lower)
    } else {
        bail!("Invalid sex '{sex}'. Must be one of: {}", SEXES.join(", "))
    }
}

pub fn validate_activity_level(level: &str) -> Result<String> {
    let lower = level.to_lowercase();
    if ACTIVITY_LEVELS.contains(&lower.as_str()) {
        Ok(lower)
    } else {
        bail!(
            "Invalid activity level '{level}'. Must be one of: {}",
            ACTIVITY_LEVELS.join(", ")
        )
    }
}

/// Single-row user biometrics with derived age and body-mass index.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height_m: Option<f64>,
    pub activity_level: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateProfile {
    pub sex: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub weight_kg: Option<f64>,
    pub height_m: Option<f64>,
    pub activity_level: Option<String>,
}

impl Profile {
    /// Age in whole years as of `today`, accounting for whether the birthday
    /// has occurred yet this year.
    #[must_use]
    pub fn age(&self, today: NaiveDate) -> Option<i32> {
        let birth = self
            .birth_date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())?;
        let mut years = today.year() - birth.year();
        if (today.month(), today.day()) < (birth.month(), birth.day()) {
            years -= 1;
        }
        Some(years)
    }

    /// BMI = weight / height^2, rounded to two decimals. None unless both
    /// weight and height are set.
    #[must_use]
    pub fn bmi(&self) -> Option<f64> {
        let weight = self.weight_kg?;
        let height = self.height_m?;
        if height <= 0.0 {
            return None;
        }
        Some(round2(weight / (height * height)))
    }
}

pub fn validate_profile_update(update: &UpdateProfile) -> Result<()> {
    if update.weight_kg.is_some_and(|w| !(0.1..=999.99).contains(&w)) {
        bail!("weight_kg must be between 0.1 and 999.99");
    }
    if update.height_m.is_some_and(|h| !(0.1..=3.0).contains(&h)) {
        bail!("height_m must be between 0.1 and 3.0");
    }
    Ok(())
}

use std::sync::{Arc, Mutex};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use tower_http::limit::RequestBodyLimitLayer;

use gluco_core::models::{
    Food, NewFood, NewGlucoseReading, NewMeal, NewMealItem, Profile, ThresholdConfig,
    UpdateFood, UpdateMealItem, UpdateProfile, UpdateThresholdConfig, validate_activity_level,
    validate_food_category, validate_food_data, validate_meal_type, validate_profile_update,
    validate_sex,
};
use gluco_core::service::GlucoService;
use gluco_core::taxonomy::CategoryIndex;

const BODY_LIMIT: usize = 2 * 1024 * 1024; // 2 MB

#[derive(Clone)]
struct AppState {
    svc: Arc<Mutex<GlucoService>>,
    api_key: Option<String>,
}

// --- Request / Response types ---

fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
struct UpdateConfigRequest {
    hypo_threshold: Option<f64>,
    hyper_threshold: Option<f64>,
    measurement_reminder_hours: Option<i64>,
    meal_reminder_hours: Option<i64>,
}

#[derive(Deserialize)]
struct CreateReadingRequest {
    value: f64,
    measured_at: Option<String>,
    notes: Option<String>,
}

#[derive(Deserialize)]
struct ReadingsQuery {
    days: Option<i64>,
}

#[derive(Deserialize)]
struct CreateFoodRequest {
    name: String,
    category: String,
    glycemic_index: Option<f64>,
    calories_per_100g: Option<f64>,
}

#[derive(Deserialize)]
struct FoodsQuery {
    category: Option<String>,
}

#[derive(Deserialize)]
#[allow(clippy::option_option)]
struct UpdateFoodRequest {
    category: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    glycemic_index: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    calories_per_100g: Option<Option<f64>>,
}

#[derive(Deserialize)]
struct CreateMealRequest {
    meal_type: String,
    eaten_at: Option<String>,
    notes: Option<String>,
}

#[derive(Deserialize)]
struct MealsQuery {
    date: Option<String>,
}

#[derive(Deserialize)]
struct CreateMealItemRequest {
    food_id: i64,
    quantity: f64,
    #[serde(default = "default_unit")]
    unit: String,
}

fn default_unit() -> String {
    "grams".to_string()
}

#[derive(Deserialize)]
struct UpdateMealItemRequest {
    quantity: Option<f64>,
    unit: Option<String>,
}

#[derive(Deserialize)]
struct TaxonomyFilterQuery {
    categories: String,
}

#[derive(Deserialize)]
struct UpdateProfileRequest {
    sex: Option<String>,
    birth_date: Option<String>,
    weight_kg: Option<f64>,
    height_m: Option<f64>,
    activity_level: Option<String>,
}

#[derive(Serialize)]
struct ProfileResponse {
    #[serde(flatten)]
    profile: Profile,
    #[serde(skip_serializing_if = "Option::is_none")]
    age: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bmi: Option<f64>,
}

impl From<Profile> for ProfileResponse {
    fn from(profile: Profile) -> Self {
        let age = profile.age(Local::now().date_naive());
        let bmi = profile.bmi();
        Self { profile, age, bmi }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Internal(err) => {
                eprintln!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Helpers ---

/// Normalize a client timestamp to the stored `YYYY-MM-DDTHH:MM:SS` form.
fn parse_timestamp(s: &str) -> Result<String, ApiError> {
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(dt.format("%Y-%m-%dT%H:%M:%S").to_string());
        }
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string());
    }
    Err(ApiError::BadRequest(format!(
        "Invalid timestamp '{s}'. Use 'YYYY-MM-DDTHH:MM:SS' or RFC 3339"
    )))
}

fn now_timestamp() -> String {
    Local::now()
        .naive_local()
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string()
}

// --- Config handlers ---

async fn get_config(State(state): State<AppState>) -> Result<Json<ThresholdConfig>, ApiError> {
    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let config = svc.threshold_config().context("database error")?;
    Ok(Json(config))
}

async fn update_config(
    State(state): State<AppState>,
    Json(req): Json<UpdateConfigRequest>,
) -> Result<Json<ThresholdConfig>, ApiError> {
    let update = UpdateThresholdConfig {
        hypo_threshold: req.hypo_threshold,
        hyper_threshold: req.hyper_threshold,
        measurement_reminder_hours: req.measurement_reminder_hours,
        meal_reminder_hours: req.meal_reminder_hours,
    };
    if update.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one field must be provided".to_string(),
        ));
    }

    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let config = svc
        .update_threshold_config(&update)
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;
    Ok(Json(config))
}

async fn refresh_config(
    State(state): State<AppState>,
) -> Result<Json<ThresholdConfig>, ApiError> {
    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    svc.invalidate_threshold_cache();
    let config = svc.threshold_config().context("database error")?;
    Ok(Json(config))
}

async fn get_reminders(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let info = svc.reminder_info().context("database error")?;
    let value = serde_json::to_value(info).context("failed to serialize reminder info")?;
    Ok(Json(value))
}

// --- Glucose handlers ---

async fn check_glucose(
    State(state): State<AppState>,
    Path(value): Path<f64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let detail = svc.check_glucose(value).context("database error")?;
    let value = serde_json::to_value(detail).context("failed to serialize detail")?;
    Ok(Json(value))
}

async fn create_reading(
    State(state): State<AppState>,
    Json(req): Json<CreateReadingRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let measured_at = match req.measured_at {
        Some(s) => parse_timestamp(&s)?,
        None => now_timestamp(),
    };

    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let view = svc
        .log_reading(&NewGlucoseReading {
            value: req.value,
            measured_at,
            notes: req.notes,
        })
        .context("failed to insert reading")?;
    let value = serde_json::to_value(view).context("failed to serialize reading")?;
    Ok((StatusCode::CREATED, Json(value)))
}

async fn list_readings(
    State(state): State<AppState>,
    Query(params): Query<ReadingsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if params.days.is_some_and(|d| d <= 0) {
        return Err(ApiError::BadRequest(
            "days must be greater than 0".to_string(),
        ));
    }
    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let readings = svc.list_readings(params.days).context("database error")?;
    let value = serde_json::to_value(readings).context("failed to serialize readings")?;
    Ok(Json(value))
}

async fn get_reading(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let view = svc
        .get_reading(id)
        .map_err(|_| ApiError::NotFound(format!("Glucose reading {id} not found")))?;
    let value = serde_json::to_value(view).context("failed to serialize reading")?;
    Ok(Json(value))
}

async fn delete_reading(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if svc.delete_reading(id).context("database error")? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!(
            "Glucose reading {id} not found"
        )))
    }
}

// --- Food handlers ---

async fn create_food(
    State(state): State<AppState>,
    Json(req): Json<CreateFoodRequest>,
) -> Result<(StatusCode, Json<Food>), ApiError> {
    let category =
        validate_food_category(&req.category).map_err(|e| ApiError::BadRequest(format!("{e}")))?;
    validate_food_data(&req.name, req.glycemic_index, req.calories_per_100g)
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;

    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);

    let name = req.name.trim().to_string();
    if svc
        .get_food_by_name(&name)
        .context("database error")?
        .is_some()
    {
        return Err(ApiError::Conflict(format!("Food '{name}' already exists")));
    }

    let food = svc
        .add_food(&NewFood {
            name,
            category,
            glycemic_index: req.glycemic_index,
            calories_per_100g: req.calories_per_100g,
        })
        .context("failed to insert food")?;
    Ok((StatusCode::CREATED, Json(food)))
}

async fn list_foods(
    State(state): State<AppState>,
    Query(params): Query<FoodsQuery>,
) -> Result<Json<Vec<Food>>, ApiError> {
    let category = params
        .category
        .as_deref()
        .map(validate_food_category)
        .transpose()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;

    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let foods = svc
        .list_foods(category.as_deref())
        .context("database error")?;
    Ok(Json(foods))
}

async fn get_food(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Food>, ApiError> {
    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let food = svc
        .get_food(id)
        .map_err(|_| ApiError::NotFound(format!("Food {id} not found")))?;
    Ok(Json(food))
}

async fn update_food(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateFoodRequest>,
) -> Result<Json<Food>, ApiError> {
    if req.category.is_none() && req.glycemic_index.is_none() && req.calories_per_100g.is_none() {
        return Err(ApiError::BadRequest(
            "At least one field must be provided".to_string(),
        ));
    }

    let category = req
        .category
        .as_deref()
        .map(validate_food_category)
        .transpose()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;
    if let Some(Some(gi)) = req.glycemic_index {
        if !(0.0..=100.0).contains(&gi) {
            return Err(ApiError::BadRequest(
                "glycemic_index must be between 0 and 100".to_string(),
            ));
        }
    }
    if let Some(Some(cal)) = req.calories_per_100g {
        if cal < 0.0 {
            return Err(ApiError::BadRequest(
                "calories_per_100g must not be negative".to_string(),
            ));
        }
    }

    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    svc.get_food(id)
        .map_err(|_| ApiError::NotFound(format!("Food {id} not found")))?;
    let food = svc
        .update_food(
            id,
            &UpdateFood {
                category,
                glycemic_index: req.glycemic_index,
                calories_per_100g: req.calories_per_100g,
            },
        )
        .context("failed to update food")?;
    Ok(Json(food))
}

async fn delete_food(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    svc.get_food(id)
        .map_err(|_| ApiError::NotFound(format!("Food {id} not found")))?;
    match svc.delete_food(id) {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(ApiError::NotFound(format!("Food {id} not found"))),
        Err(e) => Err(ApiError::Conflict(format!("{e}"))),
    }
}

// --- Meal handlers ---

async fn create_meal(
    State(state): State<AppState>,
    Json(req): Json<CreateMealRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let meal_type =
        validate_meal_type(&req.meal_type).map_err(|e| ApiError::BadRequest(format!("{e}")))?;
    let eaten_at = match req.eaten_at {
        Some(s) => parse_timestamp(&s)?,
        None => now_timestamp(),
    };

    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let meal = svc
        .create_meal(&NewMeal {
            meal_type,
            eaten_at,
            notes: req.notes,
        })
        .context("failed to insert meal")?;
    let value = serde_json::to_value(meal).context("failed to serialize meal")?;
    Ok((StatusCode::CREATED, Json(value)))
}

async fn list_meals(
    State(state): State<AppState>,
    Query(params): Query<MealsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let date = match params.date.as_deref() {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| ApiError::BadRequest(format!("Invalid date '{s}'. Use YYYY-MM-DD")))?,
        None => Local::now().date_naive(),
    };

    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let meals = svc.list_meals(date).context("database error")?;
    let value = serde_json::to_value(meals).context("failed to serialize meals")?;
    Ok(Json(value))
}

async fn get_meal(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let detail = svc
        .meal_detail(id)
        .map_err(|_| ApiError::NotFound(format!("Meal {id} not found")))?;
    let value = serde_json::to_value(detail).context("failed to serialize meal")?;
    Ok(Json(value))
}

async fn delete_meal(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if svc.delete_meal(id).context("database error")? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Meal {id} not found")))
    }
}

async fn add_meal_item(
    State(state): State<AppState>,
    Path(meal_id): Path<i64>,
    Json(req): Json<CreateMealItemRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    if req.quantity <= 0.0 {
        return Err(ApiError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);

    svc.meal_detail(meal_id)
        .map_err(|_| ApiError::NotFound(format!("Meal {meal_id} not found")))?;
    svc.get_food(req.food_id)
        .map_err(|_| ApiError::BadRequest(format!("Food with id {} not found", req.food_id)))?;
    if svc
        .database()
        .has_meal_item(meal_id, req.food_id)
        .context("database error")?
    {
        return Err(ApiError::Conflict(format!(
            "Meal {meal_id} already has an item for food {}",
            req.food_id
        )));
    }

    let item = svc
        .add_meal_item(
            meal_id,
            &NewMealItem {
                food_id: req.food_id,
                quantity: req.quantity,
                unit: req.unit.to_lowercase(),
            },
        )
        .context("failed to insert meal item")?;
    let value = serde_json::to_value(item).context("failed to serialize meal item")?;
    Ok((StatusCode::CREATED, Json(value)))
}

async fn update_meal_item(
    State(state): State<AppState>,
    Path((_meal_id, item_id)): Path<(i64, i64)>,
    Json(req): Json<UpdateMealItemRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.quantity.is_none() && req.unit.is_none() {
        return Err(ApiError::BadRequest(
            "At least one field must be provided".to_string(),
        ));
    }
    if let Some(quantity) = req.quantity {
        if quantity <= 0.0 {
            return Err(ApiError::BadRequest(
                "quantity must be greater than 0".to_string(),
            ));
        }
    }

    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let item = svc
        .update_meal_item(
            item_id,
            &UpdateMealItem {
                quantity: req.quantity,
                unit: req.unit.map(|u| u.to_lowercase()),
            },
        )
        .map_err(|_| ApiError::NotFound(format!("Meal item {item_id} not found")))?;
    let value = serde_json::to_value(item).context("failed to serialize meal item")?;
    Ok(Json(value))
}

async fn delete_meal_item(
    State(state): State<AppState>,
    Path((_meal_id, item_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if svc.remove_meal_item(item_id).context("database error")? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!(
            "Meal item {item_id} not found"
        )))
    }
}

// --- Taxonomy handlers ---

async fn taxonomy_stats() -> Result<Json<serde_json::Value>, ApiError> {
    let stats = CategoryIndex::global().statistics();
    let value = serde_json::to_value(stats).context("failed to serialize stats")?;
    Ok(Json(value))
}

async fn taxonomy_of(Path(name): Path<String>) -> Result<Json<serde_json::Value>, ApiError> {
    let categories = CategoryIndex::global().categories_of(&name);
    if categories.is_empty() {
        return Err(ApiError::NotFound(format!(
            "'{name}' is not in the taxonomy"
        )));
    }
    Ok(Json(serde_json::json!({
        "food": name,
        "categories": categories,
    })))
}

async fn taxonomy_multi() -> Result<Json<serde_json::Value>, ApiError> {
    let multi = CategoryIndex::global().foods_with_multiple_categories();
    let value = serde_json::to_value(multi).context("failed to serialize map")?;
    Ok(Json(value))
}

async fn taxonomy_filter(
    Query(params): Query<TaxonomyFilterQuery>,
) -> Result<Json<Vec<String>>, ApiError> {
    let wanted: Vec<&str> = params
        .categories
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect();
    if wanted.is_empty() {
        return Err(ApiError::BadRequest(
            "categories must be a comma-separated list".to_string(),
        ));
    }
    let foods = CategoryIndex::global().filter_by_exact_category_set(&wanted);
    Ok(Json(foods))
}

// --- Profile handlers ---

async fn get_profile(State(state): State<AppState>) -> Result<Json<ProfileResponse>, ApiError> {
    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let profile = svc.profile().context("database error")?;
    Ok(Json(profile.into()))
}

async fn update_profile(
    State(state): State<AppState>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let sex = req
        .sex
        .as_deref()
        .map(validate_sex)
        .transpose()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;
    let activity_level = req
        .activity_level
        .as_deref()
        .map(validate_activity_level)
        .transpose()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;
    let birth_date = req
        .birth_date
        .as_deref()
        .map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
                ApiError::BadRequest(format!("Invalid birth_date '{s}'. Use YYYY-MM-DD"))
            })
        })
        .transpose()?;

    let update = UpdateProfile {
        sex,
        birth_date,
        weight_kg: req.weight_kg,
        height_m: req.height_m,
        activity_level,
    };
    validate_profile_update(&update).map_err(|e| ApiError::BadRequest(format!("{e}")))?;

    let svc = state
        .svc
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let profile = svc
        .update_profile(&update)
        .context("failed to update profile")?;
    Ok(Json(profile.into()))
}

// --- Router builder ---

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/config", get(get_config).put(update_config))
        .route("/api/config/refresh", post(refresh_config))
        .route("/api/config/reminders", get(get_reminders))
        .route("/api/glucose", post(create_reading).get(list_readings))
        .route("/api/glucose/check/{value}", get(check_glucose))
        .route(
            "/api/glucose/{id}",
            get(get_reading).delete(delete_reading),
        )
        .route("/api/foods", post(create_food).get(list_foods))
        .route(
            "/api/foods/{id}",
            get(get_food).put(update_food).delete(delete_food),
        )
        .route("/api/meals", post(create_meal).get(list_meals))
        .route("/api/meals/{id}", get(get_meal).delete(delete_meal))
        .route("/api/meals/{id}/items", post(add_meal_item))
        .route(
            "/api/meals/{id}/items/{item_id}",
            put(update_meal_item).delete(delete_meal_item),
        )
        .route("/api/taxonomy/stats", get(taxonomy_stats))
        .route("/api/taxonomy/foods/{name}", get(taxonomy_of))
        .route("/api/taxonomy/multi", get(taxonomy_multi))
        .route("/api/taxonomy/filter", get(taxonomy_filter))
        .route("/api/profile", get(get_profile).put(update_profile))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    svc: GlucoService,
    port: u16,
    bind: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let state = AppState {
        svc: Arc::new(Mutex::new(svc)),
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    if let Some(ref key) = api_key {
        eprintln!(
            "API key: {}...{} (see api_key file in data directory)",
            &key[..4],
            &key[key.len() - 4..],
        );
    } else {
        eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    eprintln!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_state(api_key: Option<String>) -> AppState {
        AppState {
            svc: Arc::new(Mutex::new(GlucoService::new_in_memory().unwrap())),
            api_key,
        }
    }

    fn test_app(api_key: Option<String>) -> Router {
        build_router(test_state(api_key))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    fn get_request(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::get(uri).body(Body::empty()).unwrap()
    }

    fn json_request(
        method: &str,
        uri: &str,
        body: &serde_json::Value,
    ) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(body).unwrap()))
            .unwrap()
    }

    // --- Auth & middleware ---

    #[tokio::test]
    async fn auth_missing_key_returns_401() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let response = app.oneshot(get_request("/api/config")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let json = body_json(response).await;
        assert_eq!(json["error"], "Invalid or missing API key");
    }

    #[tokio::test]
    async fn auth_wrong_key_returns_401() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/config")
                    .header("Authorization", "Bearer wrong-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn auth_correct_key_succeeds() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/config")
                    .header("Authorization", "Bearer test-key-abc123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn no_auth_mode_allows_requests() {
        let app = test_app(None);
        let response = app.oneshot(get_request("/api/config")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn security_headers_present() {
        let app = test_app(None);
        let response = app.oneshot(get_request("/api/config")).await.unwrap();

        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
        assert_eq!(
            response.headers().get("content-security-policy").unwrap(),
            "default-src 'none'"
        );
    }

    #[tokio::test]
    async fn body_size_limit_rejects_oversized() {
        let app = test_app(None);

        let big_body = vec![0u8; BODY_LIMIT + 1];
        let response = app
            .oneshot(
                axum::http::Request::post("/api/meals")
                    .header("content-type", "application/json")
                    .body(Body::from(big_body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn internal_error_does_not_leak_details() {
        let error = ApiError::Internal(anyhow::anyhow!("secret database path /home/user/db"));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["error"], "Internal server error");
        assert!(!json["error"].as_str().unwrap().contains("secret"));
    }

    // --- Config endpoints ---

    #[tokio::test]
    async fn config_created_with_defaults() {
        let app = test_app(None);
        let response = app.oneshot(get_request("/api/config")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["hypo_threshold"], 70.0);
        assert_eq!(json["hyper_threshold"], 200.0);
        assert_eq!(json["measurement_reminder_hours"], 8);
        assert_eq!(json["meal_reminder_hours"], 6);
    }

    #[tokio::test]
    async fn config_partial_update_visible_immediately() {
        let state = test_state(None);
        let app = build_router(state.clone());

        let body = serde_json::json!({ "hypo_threshold": 85.0 });
        let response = app
            .clone()
            .oneshot(json_request("PUT", "/api/config", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // The update invalidates the cache, so a fresh GET sees the new value
        let response = app.oneshot(get_request("/api/config")).await.unwrap();
        let json = body_json(response).await;
        assert_eq!(json["hypo_threshold"], 85.0);
        assert_eq!(json["hyper_threshold"], 200.0);
    }

    #[tokio::test]
    async fn config_rejects_inverted_thresholds() {
        let app = test_app(None);

        let body = serde_json::json!({ "hypo_threshold": 250.0 });
        let response = app
            .oneshot(json_request("PUT", "/api/config", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("must be below"));
    }

    #[tokio::test]
    async fn config_rejects_empty_update() {
        let app = test_app(None);

        let body = serde_json::json!({});
        let response = app
            .oneshot(json_request("PUT", "/api/config", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn config_refresh_returns_current() {
        let app = test_app(None);
        let response = app
            .oneshot(
                axum::http::Request::post("/api/config/refresh")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["hypo_threshold"], 70.0);
    }

    #[tokio::test]
    async fn reminders_derived_from_defaults() {
        let app = test_app(None);
        let response = app
            .oneshot(get_request("/api/config/reminders"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["measurements_per_day"], 3);
        assert_eq!(json["meal_reminders_per_day"], 4);
    }

    // --- Glucose endpoints ---

    #[tokio::test]
    async fn check_glucose_classifies_against_defaults() {
        let app = test_app(None);

        let response = app
            .clone()
            .oneshot(get_request("/api/glucose/check/69.9"))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["status"], "hypoglycemia");
        assert_eq!(json["requires_attention"], true);

        let response = app
            .clone()
            .oneshot(get_request("/api/glucose/check/70.0"))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["status"], "normal");
        assert_eq!(json["in_normal_range"], true);

        let response = app
            .oneshot(get_request("/api/glucose/check/200.1"))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["status"], "hyperglycemia");
    }

    #[tokio::test]
    async fn create_reading_returns_classified_view() {
        let app = test_app(None);

        let body = serde_json::json!({
            "value": 215.5,
            "measured_at": "2024-06-15T21:00:00",
            "notes": "after dessert"
        });
        let response = app
            .oneshot(json_request("POST", "/api/glucose", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let json = body_json(response).await;
        assert_eq!(json["value"], 215.5);
        assert_eq!(json["status"], "hyperglycemia");
        assert_eq!(json["is_alert"], true);
        assert_eq!(json["notes"], "after dessert");
    }

    #[tokio::test]
    async fn create_reading_rejects_bad_timestamp() {
        let app = test_app(None);

        let body = serde_json::json!({ "value": 100.0, "measured_at": "sometime" });
        let response = app
            .oneshot(json_request("POST", "/api/glucose", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_and_delete_readings() {
        let app = test_app(None);

        let body = serde_json::json!({ "value": 110.0, "measured_at": "2024-06-15T08:00:00" });
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/glucose", &body))
            .await
            .unwrap();
        let created = body_json(response).await;
        let id = created["id"].as_i64().unwrap();

        let response = app
            .clone()
            .oneshot(get_request("/api/glucose"))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json.as_array().unwrap().len(), 1);

        let response = app
            .clone()
            .oneshot(
                axum::http::Request::delete(format!("/api/glucose/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(get_request(&format!("/api/glucose/{id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    // --- Food endpoints ---

    async fn create_rice(app: &Router) -> i64 {
        let body = serde_json::json!({
            "name": "rice",
            "category": "carbohydrate",
            "glycemic_index": 73.0,
            "calories_per_100g": 130.0
        });
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/foods", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn create_food_and_duplicate_conflict() {
        let app = test_app(None);
        create_rice(&app).await;

        let body = serde_json::json!({ "name": "rice", "category": "carbohydrate" });
        let response = app
            .oneshot(json_request("POST", "/api/foods", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn create_food_rejects_bad_category_and_range() {
        let app = test_app(None);

        let body = serde_json::json!({ "name": "rice", "category": "mineral" });
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/foods", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = serde_json::json!({
            "name": "rice",
            "category": "carbohydrate",
            "glycemic_index": 120.0
        });
        let response = app
            .oneshot(json_request("POST", "/api/foods", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_foods_filters_by_category() {
        let app = test_app(None);
        create_rice(&app).await;

        let response = app
            .clone()
            .oneshot(get_request("/api/foods?category=carbohydrate"))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json.as_array().unwrap().len(), 1);

        let response = app
            .oneshot(get_request("/api/foods?category=dairy"))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert!(json.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_food_clears_nullable_field() {
        let app = test_app(None);
        let id = create_rice(&app).await;

        let body = serde_json::json!({ "glycemic_index": null });
        let response = app
            .clone()
            .oneshot(json_request("PUT", &format!("/api/foods/{id}"), &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert!(json.get("glycemic_index").is_none());
        assert_eq!(json["calories_per_100g"], 130.0);
    }

    // --- Meal endpoints ---

    async fn create_lunch(app: &Router) -> i64 {
        let body = serde_json::json!({
            "meal_type": "lunch",
            "eaten_at": "2024-06-15T12:30:00"
        });
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/meals", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn meal_aggregation_rice_scenario() {
        let app = test_app(None);
        let food_id = create_rice(&app).await;
        let meal_id = create_lunch(&app).await;

        // 2 cups of rice -> 500 g -> 650.00 kcal, weighted GI 73
        let body = serde_json::json!({ "food_id": food_id, "quantity": 2.0, "unit": "cups" });
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/meals/{meal_id}/items"),
                &body,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let item = body_json(response).await;
        assert_eq!(item["grams"], 500.0);
        assert_eq!(item["calories"], 650.0);

        let response = app
            .oneshot(get_request(&format!("/api/meals/{meal_id}")))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["total_calories"], 650.0);
        assert_eq!(json["weighted_glycemic_index"], 73.0);
    }

    #[tokio::test]
    async fn meal_item_duplicate_pair_conflict() {
        let app = test_app(None);
        let food_id = create_rice(&app).await;
        let meal_id = create_lunch(&app).await;

        let body = serde_json::json!({ "food_id": food_id, "quantity": 1.0, "unit": "cups" });
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/meals/{meal_id}/items"),
                &body,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(json_request(
                "POST",
                &format!("/api/meals/{meal_id}/items"),
                &body,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn meal_item_rejects_nonpositive_quantity() {
        let app = test_app(None);
        let food_id = create_rice(&app).await;
        let meal_id = create_lunch(&app).await;

        let body = serde_json::json!({ "food_id": food_id, "quantity": -1.0, "unit": "cups" });
        let response = app
            .oneshot(json_request(
                "POST",
                &format!("/api/meals/{meal_id}/items"),
                &body,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn meal_item_unknown_unit_treated_as_grams() {
        let app = test_app(None);
        let food_id = create_rice(&app).await;
        let meal_id = create_lunch(&app).await;

        let body = serde_json::json!({ "food_id": food_id, "quantity": 100.0, "unit": "handfuls" });
        let response = app
            .oneshot(json_request(
                "POST",
                &format!("/api/meals/{meal_id}/items"),
                &body,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let item = body_json(response).await;
        assert_eq!(item["grams"], 100.0);
        assert_eq!(item["calories"], 130.0);
    }

    #[tokio::test]
    async fn delete_meal_cascades() {
        let app = test_app(None);
        let food_id = create_rice(&app).await;
        let meal_id = create_lunch(&app).await;

        let body = serde_json::json!({ "food_id": food_id, "quantity": 1.0, "unit": "cups" });
        app.clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/meals/{meal_id}/items"),
                &body,
            ))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(
                axum::http::Request::delete(format!("/api/meals/{meal_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(get_request(&format!("/api/meals/{meal_id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_meals_for_date() {
        let app = test_app(None);
        create_lunch(&app).await;

        let response = app
            .clone()
            .oneshot(get_request("/api/meals?date=2024-06-15"))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json.as_array().unwrap().len(), 1);

        let response = app
            .oneshot(get_request("/api/meals?date=2024-06-16"))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert!(json.as_array().unwrap().is_empty());
    }

    // --- Taxonomy endpoints ---

    #[tokio::test]
    async fn taxonomy_stats_counts() {
        let app = test_app(None);
        let response = app
            .oneshot(get_request("/api/taxonomy/stats"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["per_category"]["fiber"], 14);
        assert_eq!(json["per_category"]["carbohydrate"], 47);
        assert_eq!(json["total_entries"], 127);
    }

    #[tokio::test]
    async fn taxonomy_lookup_multi_category_food() {
        let app = test_app(None);
        let response = app
            .oneshot(get_request("/api/taxonomy/foods/baklava"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["categories"], serde_json::json!(["carbohydrate", "fat"]));
    }

    #[tokio::test]
    async fn taxonomy_lookup_unknown_food_404() {
        let app = test_app(None);
        let response = app
            .oneshot(get_request("/api/taxonomy/foods/unobtainium_stew"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn taxonomy_multi_contains_overlaps() {
        let app = test_app(None);
        let response = app
            .oneshot(get_request("/api/taxonomy/multi"))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["baklava"], serde_json::json!(["carbohydrate", "fat"]));
        assert!(json.get("apple_pie").is_none());
    }

    #[tokio::test]
    async fn taxonomy_filter_exact_set() {
        let app = test_app(None);
        let response = app
            .clone()
            .oneshot(get_request("/api/taxonomy/filter?categories=carbohydrate,fat"))
            .await
            .unwrap();
        let json = body_json(response).await;
        let foods: Vec<String> = serde_json::from_value(json).unwrap();
        assert!(foods.contains(&"baklava".to_string()));
        assert!(!foods.contains(&"apple_pie".to_string()));

        // Order of the argument list is irrelevant
        let response = app
            .oneshot(get_request("/api/taxonomy/filter?categories=fat,carbohydrate"))
            .await
            .unwrap();
        let json = body_json(response).await;
        let swapped: Vec<String> = serde_json::from_value(json).unwrap();
        assert_eq!(foods, swapped);
    }

    // --- Profile endpoints ---

    #[tokio::test]
    async fn profile_update_derives_bmi() {
        let app = test_app(None);

        let body = serde_json::json!({ "weight_kg": 70.0, "height_m": 1.75 });
        let response = app
            .clone()
            .oneshot(json_request("PUT", "/api/profile", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["bmi"], 22.86);

        let response = app.oneshot(get_request("/api/profile")).await.unwrap();
        let json = body_json(response).await;
        assert_eq!(json["weight_kg"], 70.0);
        assert_eq!(json["bmi"], 22.86);
    }

    #[tokio::test]
    async fn profile_rejects_invalid_values() {
        let app = test_app(None);

        let body = serde_json::json!({ "sex": "robot" });
        let response = app
            .clone()
            .oneshot(json_request("PUT", "/api/profile", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = serde_json::json!({ "height_m": 5.0 });
        let response = app
            .oneshot(json_request("PUT", "/api/profile", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

use anyhow::Result;
use chrono::Local;

use gluco_core::models::{
    UpdateProfile, validate_activity_level, validate_profile_update, validate_sex,
};
use gluco_core::service::GlucoService;

use super::helpers::{fmt_opt, parse_date};

pub(crate) fn cmd_profile_show(svc: &GlucoService, json: bool) -> Result<()> {
    let profile = svc.profile()?;

    if json {
        let mut value = serde_json::to_value(&profile)?;
        if let Some(obj) = value.as_object_mut() {
            let today = Local::now().date_naive();
            if let Some(age) = profile.age(today) {
                obj.insert("age".to_string(), age.into());
            }
            if let Some(bmi) = profile.bmi() {
                obj.insert("bmi".to_string(), bmi.into());
            }
        }
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Profile:");
    println!("  sex:            {}", profile.sex.as_deref().unwrap_or("-"));
    println!(
        "  birth date:     {}",
        profile.birth_date.as_deref().unwrap_or("-")
    );
    println!("  weight (kg):    {}", fmt_opt(profile.weight_kg));
    println!("  height (m):     {}", fmt_opt(profile.height_m));
    println!("  activity level: {}", profile.activity_level);
    let today = Local::now().date_naive();
    if let Some(age) = profile.age(today) {
        println!("  age:            {age}");
    }
    if let Some(bmi) = profile.bmi() {
        println!("  BMI:            {bmi:.2}");
    }
    Ok(())
}

pub(crate) fn cmd_profile_set(
    svc: &GlucoService,
    sex: Option<String>,
    birth_date: Option<String>,
    weight_kg: Option<f64>,
    height_m: Option<f64>,
    activity: Option<String>,
    json: bool,
) -> Result<()> {
    let update = UpdateProfile {
        sex: sex.as_deref().map(validate_sex).transpose()?,
        birth_date: birth_date.map(|d| parse_date(Some(d))).transpose()?,
        weight_kg,
        height_m,
        activity_level: activity.as_deref().map(validate_activity_level).transpose()?,
    };
    validate_profile_update(&update)?;

    let profile = svc.update_profile(&update)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
        return Ok(());
    }

    println!("Profile updated");
    if let Some(bmi) = profile.bmi() {
        println!("  BMI: {bmi:.2}");
    }
    Ok(())
}

use anyhow::Result;

use gluco_core::models::UpdateThresholdConfig;
use gluco_core::service::GlucoService;

pub(crate) fn cmd_config_show(svc: &GlucoService, json: bool) -> Result<()> {
    let config = svc.threshold_config()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let hypo = config.hypo_threshold;
    let hyper = config.hyper_threshold;
    let measurement = config.measurement_reminder_hours;
    let meal = config.meal_reminder_hours;
    let updated = &config.updated_at;
    println!("Glucose thresholds (mg/dL):");
    println!("  hypoglycemia:  < {hypo:.1}");
    println!("  hyperglycemia: > {hyper:.1}");
    println!("Reminders:");
    println!("  measurement: every {measurement}h");
    println!("  meal:        every {meal}h");
    println!("Last updated: {updated}");
    Ok(())
}

pub(crate) fn cmd_config_set(
    svc: &GlucoService,
    hypo: Option<f64>,
    hyper: Option<f64>,
    measurement_hours: Option<i64>,
    meal_hours: Option<i64>,
    json: bool,
) -> Result<()> {
    let update = UpdateThresholdConfig {
        hypo_threshold: hypo,
        hyper_threshold: hyper,
        measurement_reminder_hours: measurement_hours,
        meal_reminder_hours: meal_hours,
    };
    if update.is_empty() {
        anyhow::bail!(
            "Nothing to update. Pass at least one of --hypo, --hyper, --measurement-hours, --meal-hours"
        );
    }

    let config = svc.update_threshold_config(&update)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let hypo = config.hypo_threshold;
    let hyper = config.hyper_threshold;
    println!("Updated thresholds: hypo < {hypo:.1}, hyper > {hyper:.1}");
    Ok(())
}

pub(crate) fn cmd_config_reminders(svc: &GlucoService, json: bool) -> Result<()> {
    let info = svc.reminder_info()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    let m_hours = info.measurement_hours;
    let m_per_day = info.measurements_per_day;
    let f_hours = info.meal_hours;
    let f_per_day = info.meal_reminders_per_day;
    println!("Measurement reminder: every {m_hours}h ({m_per_day}/day)");
    println!("Meal reminder:        every {f_hours}h ({f_per_day}/day)");
    Ok(())
}

pub(crate) fn cmd_config_refresh(svc: &GlucoService, json: bool) -> Result<()> {
    svc.invalidate_threshold_cache();
    let config = svc.threshold_config()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    println!("Configuration cache refreshed");
    Ok(())
}

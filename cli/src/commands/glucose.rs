use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use gluco_core::models::NewGlucoseReading;
use gluco_core::service::GlucoService;

use super::helpers::parse_datetime;

pub(crate) fn cmd_glucose_log(
    svc: &GlucoService,
    value: f64,
    at: Option<String>,
    notes: Option<String>,
    json: bool,
) -> Result<()> {
    let measured_at = parse_datetime(at)?;
    let view = svc.log_reading(&NewGlucoseReading {
        value,
        measured_at,
        notes,
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    let id = view.id;
    let status = view.status.as_str();
    println!("Logged reading [{id}]: {value:.1} mg/dL — {status}");
    if view.is_alert {
        let detail = svc.check_glucose(value)?;
        if value < detail.hypo_threshold {
            let below = detail.hypo_threshold - value;
            eprintln!("Alert: {below:.1} mg/dL below the hypoglycemia threshold");
        } else {
            let above = value - detail.hyper_threshold;
            eprintln!("Alert: {above:.1} mg/dL above the hyperglycemia threshold");
        }
    }
    Ok(())
}

pub(crate) fn cmd_glucose_list(svc: &GlucoService, days: Option<i64>, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct ReadingRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Measured")]
        measured_at: String,
        #[tabled(rename = "mg/dL")]
        value: String,
        #[tabled(rename = "Status")]
        status: String,
        #[tabled(rename = "Notes")]
        notes: String,
    }

    let readings = svc.list_readings(days)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&readings)?);
        return Ok(());
    }

    if readings.is_empty() {
        match days {
            Some(days) => eprintln!("No readings in the last {days} days"),
            None => eprintln!("No readings recorded"),
        }
        process::exit(2);
    }

    let rows: Vec<ReadingRow> = readings
        .iter()
        .map(|r| ReadingRow {
            id: r.id,
            measured_at: r.measured_at.clone(),
            value: format!("{:.1}", r.value),
            status: if r.is_alert {
                format!("{} !", r.status.as_str())
            } else {
                r.status.as_str().to_string()
            },
            notes: r.notes.clone().unwrap_or_default(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

pub(crate) fn cmd_glucose_check(svc: &GlucoService, value: f64, json: bool) -> Result<()> {
    let detail = svc.check_glucose(value)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    let status = detail.status.as_str();
    let hypo = detail.hypo_threshold;
    let hyper = detail.hyper_threshold;
    println!("{value:.1} mg/dL — {status}");
    println!("  thresholds: hypo < {hypo:.1}, hyper > {hyper:.1}");
    if detail.requires_attention {
        println!("  requires attention");
    }
    Ok(())
}

pub(crate) fn cmd_glucose_delete(svc: &GlucoService, id: i64, json: bool) -> Result<()> {
    let deleted = svc.delete_reading(id)?;
    if json {
        println!("{}", serde_json::json!({ "deleted": deleted }));
        return Ok(());
    }
    if deleted {
        println!("Deleted reading [{id}]");
    } else {
        eprintln!("No reading with ID {id}");
        process::exit(2);
    }
    Ok(())
}

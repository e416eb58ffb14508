use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime};

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Parse an optional timestamp into the stored `YYYY-MM-DDTHH:MM:SS` form.
/// Accepts a full timestamp, a date with time ("2024-06-15 12:30"), or a bare
/// date (midnight). Defaults to now.
pub(crate) fn parse_datetime(s: Option<String>) -> Result<String> {
    let Some(s) = s else {
        return Ok(Local::now()
            .naive_local()
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string());
    };
    let s = s.trim();
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(dt.format("%Y-%m-%dT%H:%M:%S").to_string());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0).context("invalid date")?;
        return Ok(midnight.format("%Y-%m-%dT%H:%M:%S").to_string());
    }
    anyhow::bail!("Invalid timestamp '{s}'. Use YYYY-MM-DD, 'YYYY-MM-DD HH:MM', or RFC 3339")
}

/// Format an optional f64 for table cells.
pub(crate) fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

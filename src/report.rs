//! CSV history report: one row per simulated day.
//!
//! This is a boundary convenience for headless runs, not a persistence
//! layer; the report reflects whatever history the engine holds when it is
//! written.

use std::ffi::OsStr;
use std::fs::{create_dir_all, File};
use std::path::Path;

use chrono::NaiveDate;
use csv::Writer;
use serde::Serialize;

use crate::engine::TimeSeriesPoint;
use crate::error::TbError;

/// A flattened [`TimeSeriesPoint`], one CSV row. The csv serializer cannot
/// handle nested structs, so the compartments are spread into columns.
#[derive(Debug, Serialize)]
pub struct HistoryRow {
    pub day: u32,
    pub date: NaiveDate,
    pub susceptible: f64,
    pub vaccinated: f64,
    pub exposed_high: f64,
    pub exposed_low: f64,
    pub infectious: f64,
    pub recovered: f64,
    pub deceased: f64,
    pub new_infections: f64,
    pub new_deaths: f64,
    pub prevented_infections: f64,
    pub r_effective: f64,
    pub vaccinations: f64,
}

impl From<&TimeSeriesPoint> for HistoryRow {
    fn from(point: &TimeSeriesPoint) -> Self {
        let c = &point.compartments;
        HistoryRow {
            day: point.day,
            date: point.date,
            susceptible: c.susceptible,
            vaccinated: c.vaccinated,
            exposed_high: c.exposed_high,
            exposed_low: c.exposed_low,
            infectious: c.infectious,
            recovered: c.recovered,
            deceased: c.deceased,
            new_infections: point.new_infections,
            new_deaths: point.new_deaths,
            prevented_infections: point.prevented_infections,
            r_effective: point.r_effective,
            vaccinations: point.vaccinations,
        }
    }
}

// Checks that the path is a CSV target. Creates the file and all parent
// directories if they do not exist.
fn create_report_file(path: &Path) -> Result<File, TbError> {
    match path.extension().and_then(OsStr::to_str) {
        Some("csv") => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    create_dir_all(parent)?;
                }
            }
            Ok(File::create(path)?)
        }
        _ => Err(TbError::TbError(
            "history reports must be CSV files".to_string(),
        )),
    }
}

/// Writes the run history to `path` as CSV, one row per day with a header.
pub fn write_history(path: &Path, history: &[TimeSeriesPoint]) -> Result<(), TbError> {
    let file = create_report_file(path)?;
    let mut writer = Writer::from_writer(file);
    for point in history {
        writer.serialize(HistoryRow::from(point))?;
    }
    writer.flush()?;
    Ok(())
}

//! Combination table export
//!
//! One CSV row per summarized event: the table the aggregate charts are
//! built from. Absent nutrients are written as empty cells.

use crate::error::ComputeError;
use crate::types::SummarizedEvent;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct CombinationRow<'a> {
    timestamp: String,
    logged_food: &'a str,
    baseline_glucose: f64,
    #[serde(rename = "maxGlucoseSpike")]
    max_glucose_spike: f64,
    #[serde(rename = "Total Carbs")]
    total_carbs: Option<f64>,
    #[serde(rename = "Sugar")]
    sugar: Option<f64>,
    #[serde(rename = "Protein")]
    protein: Option<f64>,
}

/// Write the combination table to any writer
pub fn write_combination_table<W: Write>(
    summarized: &[SummarizedEvent],
    writer: W,
) -> Result<(), ComputeError> {
    let mut writer = csv::Writer::from_writer(writer);
    for s in summarized {
        writer.serialize(CombinationRow {
            timestamp: s.event.timestamp.to_rfc3339(),
            logged_food: &s.event.label,
            baseline_glucose: s.baseline_glucose,
            max_glucose_spike: s.max_spike,
            total_carbs: s.event.total_carb,
            sugar: s.event.sugar,
            protein: s.event.protein,
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Render the combination table as a string
pub fn combination_table(summarized: &[SummarizedEvent]) -> Result<String, ComputeError> {
    let mut buffer = Vec::new();
    write_combination_table(summarized, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| ComputeError::EncodingError(e.to_string()))
}

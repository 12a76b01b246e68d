//! Typed input records
//!
//! NDJSON input carries one record per line, tagged by `kind`:
//!
//! ```json
//! {"kind":"reading","timestamp":"2024-03-01T08:00:00Z","value":104.0}
//! {"kind":"food","timestamp":"2024-03-01T08:02:00Z","label":"oats","total_carb":27.0}
//! ```

use crate::series::GlucoseSeries;
use crate::types::{FoodEvent, GlucoseReading, LoadReport};
use serde::{Deserialize, Serialize};

/// One typed input record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputRecord {
    Reading(GlucoseReading),
    Food(FoodEvent),
}

/// A loaded dataset ready for the pipeline
#[derive(Debug, Clone)]
pub struct LoadedDataset {
    pub series: GlucoseSeries,
    /// Food events in source order
    pub events: Vec<FoodEvent>,
    pub report: LoadReport,
}

impl LoadedDataset {
    /// Assemble a dataset from already-typed values
    pub fn from_parts(
        readings: Vec<GlucoseReading>,
        events: Vec<FoodEvent>,
        mut report: LoadReport,
    ) -> Self {
        let series = GlucoseSeries::from_readings(readings);
        report.readings = series.len();
        report.food_events = events.len();
        report.duplicate_timestamps = series.duplicates();
        Self {
            series,
            events,
            report,
        }
    }
}

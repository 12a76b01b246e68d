//! Loader for CGM exports and food logs
//!
//! Handles the loading boundary: locating columns, stripping diagnostic
//! header rows, and turning text cells into typed readings and events.
//! Unparsable rows are skipped and reported, never fatal.

use crate::config::ColumnMap;
use crate::error::ComputeError;
use crate::schema::record::{InputRecord, LoadedDataset};
use crate::series::{parse_number, parse_timestamp, GlucoseSeries};
use crate::types::{FoodEvent, GlucoseReading, LoadReport, MalformedReading, MalformedReason};
use chrono::{DateTime, Utc};
use csv::StringRecord;

/// Loader for converting source files into a dataset
pub struct RecordLoader;

/// Column positions resolved against a header line
struct ColumnIndex {
    timestamp: usize,
    glucose: Option<usize>,
    food: Option<usize>,
    total_carb: Option<usize>,
    sugar: Option<usize>,
    protein: Option<usize>,
}

impl ColumnIndex {
    fn resolve(
        headers: &StringRecord,
        columns: &ColumnMap,
        timestamp_column: &str,
    ) -> Result<Self, ComputeError> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);

        let timestamp = find(timestamp_column)
            .ok_or_else(|| ComputeError::MissingColumn(timestamp_column.to_string()))?;

        Ok(Self {
            timestamp,
            glucose: find(columns.glucose.as_str()),
            food: find(columns.food.as_str()),
            total_carb: find(columns.total_carb.as_str()),
            sugar: find(columns.sugar.as_str()),
            protein: find(columns.protein.as_str()),
        })
    }
}

fn cell(record: &StringRecord, idx: Option<usize>) -> &str {
    idx.and_then(|i| record.get(i)).map(str::trim).unwrap_or("")
}

fn reader(text: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes())
}

fn food_event(
    record: &StringRecord,
    idx: &ColumnIndex,
    timestamp: DateTime<Utc>,
) -> Option<FoodEvent> {
    let label = cell(record, idx.food);
    if label.is_empty() {
        return None;
    }
    Some(FoodEvent::new(timestamp, label).with_macros(
        parse_number(cell(record, idx.total_carb)),
        parse_number(cell(record, idx.sugar)),
        parse_number(cell(record, idx.protein)),
    ))
}

fn log_malformed(malformed: &[MalformedReading]) {
    for m in malformed {
        tracing::debug!(row = m.row, "Skipping malformed row: {}", m);
    }
    if !malformed.is_empty() {
        tracing::warn!(count = malformed.len(), "Skipped malformed rows");
    }
}

impl RecordLoader {
    /// Parse a combined CSV where each row may carry a glucose reading, a
    /// food event, or both.
    ///
    /// Rows whose timestamp does not parse are skipped. A non-empty glucose
    /// cell that is not numeric skips the reading; the row's food event, if
    /// any, is still kept. An empty glucose cell is a food-only row.
    pub fn parse_csv(
        text: &str,
        columns: &ColumnMap,
        header_rows: usize,
    ) -> Result<LoadedDataset, ComputeError> {
        let mut rdr = reader(text);
        let headers = rdr.headers()?.clone();
        let idx = ColumnIndex::resolve(&headers, columns, &columns.timestamp)?;
        if idx.glucose.is_none() && idx.food.is_none() {
            return Err(ComputeError::MissingColumn(columns.glucose.clone()));
        }

        let mut readings = Vec::new();
        let mut events = Vec::new();
        let mut report = LoadReport::default();

        for (row, record) in rdr.records().enumerate() {
            let record = record?;
            report.rows_read += 1;
            if row < header_rows {
                report.header_rows_skipped += 1;
                continue;
            }

            let raw_ts = cell(&record, Some(idx.timestamp));
            let Some(timestamp) = parse_timestamp(raw_ts) else {
                report.malformed.push(MalformedReading {
                    row,
                    reason: MalformedReason::InvalidTimestamp(raw_ts.to_string()),
                });
                continue;
            };

            let raw_glucose = cell(&record, idx.glucose);
            if !raw_glucose.is_empty() {
                match parse_number(raw_glucose) {
                    Some(value) => readings.push(GlucoseReading::new(timestamp, value)),
                    None => report.malformed.push(MalformedReading {
                        row,
                        reason: MalformedReason::InvalidValue(raw_glucose.to_string()),
                    }),
                }
            }

            if let Some(event) = food_event(&record, &idx, timestamp) {
                events.push(event);
            }
        }

        log_malformed(&report.malformed);
        let dataset = LoadedDataset::from_parts(readings, events, report);
        tracing::info!(
            readings = dataset.report.readings,
            food_events = dataset.report.food_events,
            malformed = dataset.report.malformed_count(),
            "Loaded combined CSV"
        );
        Ok(dataset)
    }

    /// Parse a CGM export holding only timestamp and glucose columns
    pub fn parse_glucose_csv(
        text: &str,
        columns: &ColumnMap,
        header_rows: usize,
    ) -> Result<(GlucoseSeries, LoadReport), ComputeError> {
        let mut rdr = reader(text);
        let headers = rdr.headers()?.clone();
        let idx = ColumnIndex::resolve(&headers, columns, &columns.timestamp)?;
        let glucose = idx
            .glucose
            .ok_or_else(|| ComputeError::MissingColumn(columns.glucose.clone()))?;

        let mut pairs: Vec<(String, String)> = Vec::new();
        for record in rdr.records() {
            let record = record?;
            pairs.push((
                cell(&record, Some(idx.timestamp)).to_string(),
                cell(&record, Some(glucose)).to_string(),
            ));
        }

        let parsed = GlucoseSeries::parse_pairs(&pairs, header_rows);
        log_malformed(&parsed.malformed);

        let report = LoadReport {
            rows_read: pairs.len(),
            header_rows_skipped: header_rows.min(pairs.len()),
            readings: parsed.series.len(),
            food_events: 0,
            duplicate_timestamps: parsed.series.duplicates(),
            malformed: parsed.malformed,
        };
        Ok((parsed.series, report))
    }

    /// Parse a standalone food log.
    ///
    /// The timestamp column is `columns.food_timestamp`, falling back to
    /// `columns.timestamp`. Rows with an empty label are ignored.
    pub fn parse_food_csv(
        text: &str,
        columns: &ColumnMap,
    ) -> Result<(Vec<FoodEvent>, Vec<MalformedReading>), ComputeError> {
        let mut rdr = reader(text);
        let headers = rdr.headers()?.clone();
        let idx = ColumnIndex::resolve(&headers, columns, &columns.food_timestamp)
            .or_else(|_| ColumnIndex::resolve(&headers, columns, &columns.timestamp))?;
        if idx.food.is_none() {
            return Err(ComputeError::MissingColumn(columns.food.clone()));
        }

        let mut events = Vec::new();
        let mut malformed = Vec::new();
        for (row, record) in rdr.records().enumerate() {
            let record = record?;
            if cell(&record, idx.food).is_empty() {
                continue;
            }
            let raw_ts = cell(&record, Some(idx.timestamp));
            match parse_timestamp(raw_ts) {
                Some(timestamp) => events.extend(food_event(&record, &idx, timestamp)),
                None => malformed.push(MalformedReading {
                    row,
                    reason: MalformedReason::InvalidTimestamp(raw_ts.to_string()),
                }),
            }
        }

        log_malformed(&malformed);
        Ok((events, malformed))
    }

    /// Load a CGM export and a separate food log into one dataset
    pub fn load_separate(
        glucose_text: &str,
        food_text: &str,
        columns: &ColumnMap,
        header_rows: usize,
    ) -> Result<LoadedDataset, ComputeError> {
        let (series, mut report) = Self::parse_glucose_csv(glucose_text, columns, header_rows)?;
        let (events, food_malformed) = Self::parse_food_csv(food_text, columns)?;

        report.food_events = events.len();
        report.malformed.extend(food_malformed);

        Ok(LoadedDataset {
            series,
            events,
            report,
        })
    }

    /// Parse NDJSON containing typed records.
    ///
    /// Blank lines are ignored. A line that does not decode as a record is
    /// skipped and reported with its zero-based line index.
    pub fn parse_ndjson(ndjson: &str) -> Result<LoadedDataset, ComputeError> {
        let mut readings = Vec::new();
        let mut events = Vec::new();
        let mut report = LoadReport::default();

        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            report.rows_read += 1;
            match serde_json::from_str::<InputRecord>(trimmed) {
                Ok(InputRecord::Reading(r)) => readings.push(r),
                Ok(InputRecord::Food(f)) => events.push(f),
                Err(e) => report.malformed.push(MalformedReading {
                    row: line_num,
                    reason: MalformedReason::InvalidRecord(e.to_string()),
                }),
            }
        }

        log_malformed(&report.malformed);
        Ok(LoadedDataset::from_parts(readings, events, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn columns() -> ColumnMap {
        ColumnMap::default()
    }

    const COMBINED: &str = "\
Timestamp (YYYY-MM-DDThh:mm:ss),Glucose Value (mg/dL),logged_food,total_carb,sugar,protein
2024-03-01T08:00:00,100,,,,
2024-03-01T08:05:00,,Oatmeal ,27,1.1,5
2024-03-01T08:30:00,140,,,,
2024-03-01T09:00:00,130,Banana,27,14.4,
garbage,120,,,,
2024-03-01T09:10:00,Low,,,,
2024-03-01T09:20:00,118,Tea,0,n/a,0
";

    #[test]
    fn test_parse_combined_csv() {
        let dataset = RecordLoader::parse_csv(COMBINED, &columns(), 0).unwrap();

        assert_eq!(dataset.series.len(), 4);
        assert_eq!(dataset.events.len(), 3);
        assert_eq!(dataset.report.rows_read, 7);
        assert_eq!(dataset.report.malformed_count(), 2);
        assert_eq!(dataset.report.malformed[0].row, 4);
        assert_eq!(dataset.report.malformed[1].row, 5);

        let oatmeal = &dataset.events[0];
        assert_eq!(oatmeal.label, "Oatmeal");
        assert_eq!(oatmeal.total_carb, Some(27.0));
        assert_eq!(oatmeal.protein, Some(5.0));

        let banana = &dataset.events[1];
        assert_eq!(banana.protein, None);

        let tea = &dataset.events[2];
        assert_eq!(tea.total_carb, Some(0.0));
        assert_eq!(tea.sugar, None);
    }

    #[test]
    fn test_header_rows_stripped() {
        let text = "\
Timestamp (YYYY-MM-DDThh:mm:ss),Glucose Value (mg/dL)
,FirstName
,Device
2024-03-01T08:00:00,100
2024-03-01T08:05:00,104
";
        let (series, report) = RecordLoader::parse_glucose_csv(text, &columns(), 2).unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(report.header_rows_skipped, 2);
        assert_eq!(report.malformed_count(), 0);

        let (_, report) = RecordLoader::parse_glucose_csv(text, &columns(), 0).unwrap();
        assert_eq!(report.malformed_count(), 2);
    }

    #[test]
    fn test_missing_timestamp_column() {
        let result = RecordLoader::parse_csv("time,value\n2024-03-01T08:00:00,100\n", &columns(), 0);
        assert!(matches!(result, Err(ComputeError::MissingColumn(_))));
    }

    #[test]
    fn test_separate_files() {
        let glucose = "\
Timestamp (YYYY-MM-DDThh:mm:ss),Glucose Value (mg/dL)
2024-03-01T08:00:00,100
2024-03-01T08:00:00,102
2024-03-01T08:30:00,150
";
        let food = "\
time_begin,logged_food,total_carb,sugar,protein
2024-03-01 08:01:00,Toast,20,2,4
2024-03-01 08:20:00,,5,5,5
yesterday,Jam,12,10,0
";
        let dataset = RecordLoader::load_separate(glucose, food, &columns(), 0).unwrap();

        assert_eq!(dataset.series.len(), 2);
        assert_eq!(dataset.series.readings()[0].value, 102.0);
        assert_eq!(dataset.report.duplicate_timestamps, 1);
        assert_eq!(dataset.events.len(), 1);
        assert_eq!(dataset.events[0].label, "Toast");
        assert_eq!(dataset.report.malformed_count(), 1);
    }

    #[test]
    fn test_parse_ndjson() {
        let ndjson = r#"
{"kind":"reading","timestamp":"2024-03-01T08:00:00Z","value":100.0}
{"kind":"food","timestamp":"2024-03-01T08:00:00Z","label":"oats","total_carb":27.0}

{"kind":"reading","timestamp":"2024-03-01T08:30:00Z","value":140.0}
"#;
        let dataset = RecordLoader::parse_ndjson(ndjson).unwrap();
        assert_eq!(dataset.series.len(), 2);
        assert_eq!(dataset.events.len(), 1);
        assert_eq!(dataset.report.rows_read, 3);
    }

    #[test]
    fn test_parse_ndjson_skips_malformed_line() {
        let ndjson = "\
{\"kind\":\"reading\",\"timestamp\":\"2024-03-01T08:00:00Z\",\"value\":100.0}
{\"kind\":\"reading\",\"timestamp\":\"garbage\",\"value\":120.0}
{\"kind\":\"food\",\"timestamp\":\"2024-03-01T08:02:00Z\",\"label\":\"oats\"}
{\"kind\":\"reading\"}
";
        let dataset = RecordLoader::parse_ndjson(ndjson).unwrap();

        assert_eq!(dataset.series.len(), 1);
        assert_eq!(dataset.events.len(), 1);
        assert_eq!(dataset.report.rows_read, 4);
        assert_eq!(dataset.report.malformed_count(), 2);
        assert_eq!(dataset.report.malformed[0].row, 1);
        assert_eq!(dataset.report.malformed[1].row, 3);
        assert!(matches!(
            dataset.report.malformed[0].reason,
            MalformedReason::InvalidRecord(_)
        ));
        assert!(dataset.report.malformed[0].to_string().starts_with("row 1:"));
    }

    #[test]
    fn test_combined_csv_header_rows_stripped() {
        let text = "\
Timestamp (YYYY-MM-DDThh:mm:ss),Glucose Value (mg/dL),logged_food,total_carb,sugar,protein
,FirstName,,,,
,Device,,,,
2024-03-01T08:00:00,100,,,,
2024-03-01T08:05:00,,Toast,20,2,4
2024-03-01T08:30:00,High,,,,
2024-03-01T09:00:00,130,,,,
";
        let dataset = RecordLoader::parse_csv(text, &columns(), 2).unwrap();

        assert_eq!(dataset.report.rows_read, 6);
        assert_eq!(dataset.report.header_rows_skipped, 2);
        assert_eq!(dataset.series.len(), 2);
        assert_eq!(dataset.events.len(), 1);
        assert_eq!(dataset.events[0].label, "Toast");
        assert_eq!(dataset.report.malformed_count(), 1);
        assert_eq!(
            dataset.report.malformed[0],
            MalformedReading {
                row: 4,
                reason: MalformedReason::InvalidValue("High".to_string()),
            }
        );

        let unstripped = RecordLoader::parse_csv(text, &columns(), 0).unwrap();
        assert_eq!(unstripped.report.header_rows_skipped, 0);
        assert_eq!(unstripped.report.malformed_count(), 3);
    }
}

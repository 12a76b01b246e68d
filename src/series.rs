//! Glucose time-series store
//!
//! Holds one dataset's readings sorted by timestamp with unique timestamps,
//! and answers the two lookups the aligner needs in logarithmic time.

use crate::types::{GlucoseReading, MalformedReading, MalformedReason};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parse a timestamp in RFC 3339 or one of the naive CGM export formats.
///
/// Naive timestamps are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Parse a finite number; anything else is `None`
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Result of building a series from raw text rows
#[derive(Debug, Clone)]
pub struct ParsedSeries {
    pub series: GlucoseSeries,
    /// Rows skipped because the timestamp or value did not parse
    pub malformed: Vec<MalformedReading>,
}

/// Sorted, deduplicated glucose readings for one dataset
///
/// Serialized as a plain list of readings; deserializing sorts and
/// deduplicates it again.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<GlucoseReading>", into = "Vec<GlucoseReading>")]
pub struct GlucoseSeries {
    readings: Vec<GlucoseReading>,
    /// Readings dropped because a later one shared their timestamp
    duplicates: usize,
}

impl GlucoseSeries {
    /// Build a series from readings in any order.
    ///
    /// Readings sharing a timestamp are resolved last-write-wins: the one
    /// appearing later in `readings` is kept.
    pub fn from_readings(mut readings: Vec<GlucoseReading>) -> Self {
        // stable, so equal timestamps keep input order
        readings.sort_by_key(|r| r.timestamp);

        let mut deduped: Vec<GlucoseReading> = Vec::with_capacity(readings.len());
        let mut duplicates = 0;
        for reading in readings {
            match deduped.last_mut() {
                Some(last) if last.timestamp == reading.timestamp => {
                    *last = reading;
                    duplicates += 1;
                }
                _ => deduped.push(reading),
            }
        }

        if duplicates > 0 {
            tracing::debug!(duplicates, "Resolved duplicate glucose timestamps");
        }

        Self {
            readings: deduped,
            duplicates,
        }
    }

    /// Build a series from raw `(timestamp, value)` text pairs.
    ///
    /// The first `header_rows` rows are stripped unparsed. Remaining rows
    /// with an unparsable timestamp or a non-numeric value are skipped and
    /// reported; they do not fail the load.
    pub fn parse_pairs<S: AsRef<str>>(rows: &[(S, S)], header_rows: usize) -> ParsedSeries {
        let mut readings = Vec::with_capacity(rows.len().saturating_sub(header_rows));
        let mut malformed = Vec::new();

        for (row, (raw_ts, raw_value)) in rows.iter().enumerate().skip(header_rows) {
            let Some(timestamp) = parse_timestamp(raw_ts.as_ref()) else {
                malformed.push(MalformedReading {
                    row,
                    reason: MalformedReason::InvalidTimestamp(raw_ts.as_ref().to_string()),
                });
                continue;
            };
            let Some(value) = parse_number(raw_value.as_ref()) else {
                malformed.push(MalformedReading {
                    row,
                    reason: MalformedReason::InvalidValue(raw_value.as_ref().to_string()),
                });
                continue;
            };
            readings.push(GlucoseReading::new(timestamp, value));
        }

        ParsedSeries {
            series: Self::from_readings(readings),
            malformed,
        }
    }

    pub fn readings(&self) -> &[GlucoseReading] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn first(&self) -> Option<&GlucoseReading> {
        self.readings.first()
    }

    pub fn last(&self) -> Option<&GlucoseReading> {
        self.readings.last()
    }

    /// Most recent reading with `timestamp <= at`
    pub fn nearest_at_or_before(&self, at: DateTime<Utc>) -> Option<&GlucoseReading> {
        let idx = self.readings.partition_point(|r| r.timestamp <= at);
        idx.checked_sub(1).map(|i| &self.readings[i])
    }

    /// Readings with `start < timestamp <= end`, in order
    pub fn range_after(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> &[GlucoseReading] {
        if end <= start {
            return &[];
        }
        let lo = self.readings.partition_point(|r| r.timestamp <= start);
        let len = self.readings[lo..].partition_point(|r| r.timestamp <= end);
        &self.readings[lo..lo + len]
    }
}

impl From<Vec<GlucoseReading>> for GlucoseSeries {
    fn from(readings: Vec<GlucoseReading>) -> Self {
        Self::from_readings(readings)
    }
}

impl From<GlucoseSeries> for Vec<GlucoseReading> {
    fn from(series: GlucoseSeries) -> Self {
        series.readings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn series(points: &[(i64, f64)]) -> GlucoseSeries {
        GlucoseSeries::from_readings(
            points
                .iter()
                .map(|&(m, v)| GlucoseReading::new(t(m), v))
                .collect(),
        )
    }

    #[test]
    fn test_sorts_readings() {
        let s = series(&[(30, 140.0), (0, 100.0), (60, 130.0)]);
        let values: Vec<f64> = s.readings().iter().map(|r| r.value).collect();
        assert_eq!(values, vec![100.0, 140.0, 130.0]);
    }

    #[test]
    fn test_duplicates_last_write_wins() {
        let s = series(&[(0, 100.0), (5, 110.0), (0, 105.0), (0, 107.0)]);
        assert_eq!(s.len(), 2);
        assert_eq!(s.duplicates(), 2);
        assert_eq!(s.readings()[0].value, 107.0);
    }

    #[test]
    fn test_deserialize_restores_order() {
        let json = r#"[
            {"timestamp":"2024-03-01T08:30:00Z","value":140.0},
            {"timestamp":"2024-03-01T08:00:00Z","value":100.0},
            {"timestamp":"2024-03-01T08:30:00Z","value":145.0}
        ]"#;
        let s: GlucoseSeries = serde_json::from_str(json).unwrap();

        let values: Vec<f64> = s.readings().iter().map(|r| r.value).collect();
        assert_eq!(values, vec![100.0, 145.0]);
        assert_eq!(s.duplicates(), 1);
        assert_eq!(s.nearest_at_or_before(t(10)).unwrap().value, 100.0);

        let round_trip: GlucoseSeries =
            serde_json::from_str(&serde_json::to_string(&s).unwrap()).unwrap();
        assert_eq!(round_trip.readings(), s.readings());
    }

    #[test]
    fn test_nearest_at_or_before() {
        let s = series(&[(0, 100.0), (30, 140.0), (60, 130.0)]);

        assert_eq!(s.nearest_at_or_before(t(0)).unwrap().value, 100.0);
        assert_eq!(s.nearest_at_or_before(t(29)).unwrap().value, 100.0);
        assert_eq!(s.nearest_at_or_before(t(30)).unwrap().value, 140.0);
        assert_eq!(s.nearest_at_or_before(t(500)).unwrap().value, 130.0);
        assert!(s.nearest_at_or_before(t(-1)).is_none());
    }

    #[test]
    fn test_nearest_on_empty_series() {
        let s = GlucoseSeries::default();
        assert!(s.nearest_at_or_before(t(0)).is_none());
        assert!(s.range_after(t(0), t(120)).is_empty());
    }

    #[test]
    fn test_range_after_bounds() {
        let s = series(&[(0, 100.0), (30, 140.0), (60, 130.0), (120, 110.0), (125, 105.0)]);

        let window = s.range_after(t(0), t(120));
        let values: Vec<f64> = window.iter().map(|r| r.value).collect();
        // start excluded, end included
        assert_eq!(values, vec![140.0, 130.0, 110.0]);

        assert!(s.range_after(t(125), t(200)).is_empty());
        assert!(s.range_after(t(60), t(60)).is_empty());
    }

    #[test]
    fn test_parse_pairs_skips_header_and_malformed() {
        let rows = vec![
            ("FirstName", "Jane"),
            ("Device", "G6"),
            ("2024-03-01T08:00:00", "100"),
            ("not a time", "120"),
            ("2024-03-01T08:05:00", "High"),
            ("2024-03-01 08:10:00", " 118 "),
        ];
        let parsed = GlucoseSeries::parse_pairs(&rows, 2);

        assert_eq!(parsed.series.len(), 2);
        assert_eq!(parsed.malformed.len(), 2);
        assert_eq!(parsed.malformed[0].row, 3);
        assert!(matches!(
            parsed.malformed[0].reason,
            MalformedReason::InvalidTimestamp(_)
        ));
        assert!(matches!(
            parsed.malformed[1].reason,
            MalformedReason::InvalidValue(_)
        ));
        assert_eq!(parsed.series.readings()[1].value, 118.0);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = t(0);
        assert_eq!(parse_timestamp("2024-03-01T08:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01 08:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T08:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T09:00:00+01:00"), Some(expected));
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_parse_number_rejects_non_finite() {
        assert_eq!(parse_number("5.5"), Some(5.5));
        assert_eq!(parse_number("0"), Some(0.0));
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number(""), None);
    }
}

//! Core types for the Glucoscope pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: raw readings and food events, aligned events, summarized events,
//! and cohort groups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single CGM glucose reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlucoseReading {
    /// Reading time (UTC)
    pub timestamp: DateTime<Utc>,
    /// Glucose value (mg/dL)
    pub value: f64,
}

impl GlucoseReading {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// A logged food intake event
///
/// Macronutrient values that were missing or unparsable are `None`. A logged
/// zero is a real value and stays `Some(0.0)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodEvent {
    /// Time the food was logged (UTC)
    pub timestamp: DateTime<Utc>,
    /// Food label as logged
    pub label: String,
    /// Total carbohydrate (g)
    #[serde(default)]
    pub total_carb: Option<f64>,
    /// Sugar (g)
    #[serde(default)]
    pub sugar: Option<f64>,
    /// Protein (g)
    #[serde(default)]
    pub protein: Option<f64>,
}

impl FoodEvent {
    pub fn new(timestamp: DateTime<Utc>, label: impl Into<String>) -> Self {
        Self {
            timestamp,
            label: label.into(),
            total_carb: None,
            sugar: None,
            protein: None,
        }
    }

    /// Set macronutrient values
    pub fn with_macros(
        mut self,
        total_carb: Option<f64>,
        sugar: Option<f64>,
        protein: Option<f64>,
    ) -> Self {
        self.total_carb = total_carb;
        self.sugar = sugar;
        self.protein = protein;
        self
    }

    /// Value of the given nutrient, if present
    pub fn nutrient(&self, nutrient: Nutrient) -> Option<f64> {
        match nutrient {
            Nutrient::Carb => self.total_carb,
            Nutrient::Sugar => self.sugar,
            Nutrient::Protein => self.protein,
        }
    }
}

/// Macronutrients used for cohort classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Nutrient {
    Carb,
    Sugar,
    Protein,
}

impl Nutrient {
    pub fn as_str(&self) -> &'static str {
        match self {
            Nutrient::Carb => "carb",
            Nutrient::Sugar => "sugar",
            Nutrient::Protein => "protein",
        }
    }
}

/// A glucose value positioned relative to a food event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowPoint {
    /// Minutes after the event (always > 0)
    pub offset_minutes: f64,
    /// Glucose value (mg/dL)
    pub value: f64,
}

/// A food event matched to the glucose series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedEvent {
    /// Source event
    pub event: FoodEvent,
    /// Value of the nearest reading at or before the event
    pub baseline_glucose: f64,
    /// Readings in (event, event + spike horizon]
    pub forward_window: Vec<WindowPoint>,
    /// Readings in (event, event + display horizon]
    pub display_window: Vec<WindowPoint>,
}

/// Per-event response summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarizedEvent {
    /// Source event
    pub event: FoodEvent,
    /// Baseline glucose (mg/dL)
    pub baseline_glucose: f64,
    /// Largest change over baseline within the spike horizon, 0 if no readings
    pub max_spike: f64,
    /// Mean glucose per display bucket, `None` where no reading fell
    pub bucketed_curve: Vec<Option<f64>>,
}

/// Severity band of a mean spike
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Low, Severity::Medium, Severity::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

/// Filter level for one nutrient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NutrientLevel {
    High,
    Low,
    All,
}

impl NutrientLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NutrientLevel::High => "high",
            NutrientLevel::Low => "low",
            NutrientLevel::All => "all",
        }
    }

    /// Whether a nutrient value passes this level.
    ///
    /// High is strictly above the threshold. Absent values never pass the
    /// high test, so they count as low.
    pub fn admits(&self, value: Option<f64>, threshold: f64) -> bool {
        let high = value.is_some_and(|v| v > threshold);
        match self {
            NutrientLevel::All => true,
            NutrientLevel::High => high,
            NutrientLevel::Low => !high,
        }
    }
}

impl std::str::FromStr for NutrientLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(NutrientLevel::High),
            "low" => Ok(NutrientLevel::Low),
            "all" => Ok(NutrientLevel::All),
            other => Err(format!("unknown nutrient level: {}", other)),
        }
    }
}

/// Category triple identifying a cohort
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CohortKey {
    pub carb: NutrientLevel,
    pub sugar: NutrientLevel,
    pub protein: NutrientLevel,
}

impl CohortKey {
    pub fn new(carb: NutrientLevel, sugar: NutrientLevel, protein: NutrientLevel) -> Self {
        Self {
            carb,
            sugar,
            protein,
        }
    }

    /// The 8 high/low combinations, carb major, high before low
    pub fn combinations() -> [CohortKey; 8] {
        use NutrientLevel::{High, Low};
        let mut keys = [CohortKey::new(High, High, High); 8];
        let levels = [High, Low];
        let mut i = 0;
        for carb in levels {
            for sugar in levels {
                for protein in levels {
                    keys[i] = CohortKey::new(carb, sugar, protein);
                    i += 1;
                }
            }
        }
        keys
    }

    pub fn level(&self, nutrient: Nutrient) -> NutrientLevel {
        match nutrient {
            Nutrient::Carb => self.carb,
            Nutrient::Sugar => self.sugar,
            Nutrient::Protein => self.protein,
        }
    }

    /// Human-readable label, e.g. "Carbs: high, Sugar: low, Protein: all"
    pub fn label(&self) -> String {
        format!(
            "Carbs: {}, Sugar: {}, Protein: {}",
            self.carb.as_str(),
            self.sugar.as_str(),
            self.protein.as_str()
        )
    }
}

/// Running per-bucket sums and counts over many curves
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurveAccumulator {
    sums: Vec<f64>,
    counts: Vec<u32>,
    curves: usize,
}

impl CurveAccumulator {
    pub fn new(bucket_count: usize) -> Self {
        Self {
            sums: vec![0.0; bucket_count],
            counts: vec![0; bucket_count],
            curves: 0,
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.sums.len()
    }

    /// Number of curves folded in so far
    pub fn curves(&self) -> usize {
        self.curves
    }

    fn grow_to(&mut self, len: usize) {
        if len > self.sums.len() {
            self.sums.resize(len, 0.0);
            self.counts.resize(len, 0);
        }
    }

    /// Fold one bucketed curve in, skipping empty buckets
    pub fn add_curve(&mut self, curve: &[Option<f64>]) {
        self.grow_to(curve.len());
        for (i, bucket) in curve.iter().enumerate() {
            if let Some(value) = bucket {
                self.sums[i] += value;
                self.counts[i] += 1;
            }
        }
        self.curves += 1;
    }

    /// Fold another accumulator in
    pub fn merge(&mut self, other: &CurveAccumulator) {
        self.grow_to(other.sums.len());
        for i in 0..other.sums.len() {
            self.sums[i] += other.sums[i];
            self.counts[i] += other.counts[i];
        }
        self.curves += other.curves;
    }

    /// Bucket-wise mean; `None` where no curve contributed
    pub fn mean(&self) -> Vec<Option<f64>> {
        self.sums
            .iter()
            .zip(&self.counts)
            .map(|(sum, &count)| (count > 0).then(|| sum / count as f64))
            .collect()
    }
}

/// Aggregate of the summarized events matching one category triple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortGroup {
    /// Category triple
    pub key: CohortKey,
    /// Mean of member spikes (0 for an empty group)
    pub mean_spike: f64,
    /// Bucket-wise mean of member curves
    pub averaged_curve: Vec<Option<f64>>,
    /// Labels of member events, in input order
    pub member_labels: Vec<String>,
    /// Severity band of `mean_spike`
    pub severity: Severity,
    /// Member curve totals, used for band-level averaging
    #[serde(skip)]
    pub curve_totals: CurveAccumulator,
}

impl CohortGroup {
    pub fn member_count(&self) -> usize {
        self.member_labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.member_labels.is_empty()
    }
}

/// Why a source row was skipped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum MalformedReason {
    InvalidTimestamp(String),
    InvalidValue(String),
    /// A typed record that failed to decode
    InvalidRecord(String),
}

/// A source row skipped during loading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MalformedReading {
    /// Zero-based data row index (after the header line, before header-row stripping)
    pub row: usize,
    pub reason: MalformedReason,
}

impl std::fmt::Display for MalformedReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.reason {
            MalformedReason::InvalidTimestamp(raw) => {
                write!(f, "row {}: unparsable timestamp {:?}", self.row, raw)
            }
            MalformedReason::InvalidValue(raw) => {
                write!(f, "row {}: non-numeric glucose value {:?}", self.row, raw)
            }
            MalformedReason::InvalidRecord(detail) => {
                write!(f, "row {}: invalid record: {}", self.row, detail)
            }
        }
    }
}

/// Why a food event was left out of alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    /// The event precedes every glucose reading
    NoBaselineAvailable,
}

/// A food event excluded from the aligned set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedEvent {
    pub event: FoodEvent,
    pub reason: ExclusionReason,
}

/// Summary of a load
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadReport {
    /// Data rows seen (excluding the header line)
    pub rows_read: usize,
    /// Leading rows stripped as diagnostic header
    pub header_rows_skipped: usize,
    /// Glucose readings kept after deduplication
    pub readings: usize,
    /// Food events parsed
    pub food_events: usize,
    /// Readings replaced by a later reading with the same timestamp
    pub duplicate_timestamps: usize,
    /// Rows skipped as malformed
    pub malformed: Vec<MalformedReading>,
}

impl LoadReport {
    pub fn malformed_count(&self) -> usize {
        self.malformed.len()
    }
}

/// Summary of an alignment pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignmentReport {
    /// Events that received a baseline
    pub aligned: usize,
    /// Events excluded, in input order
    pub excluded: Vec<ExcludedEvent>,
}

impl AlignmentReport {
    pub fn excluded_count(&self) -> usize {
        self.excluded.len()
    }
}

/// Averaged response curve for one severity band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandCurve {
    pub severity: Severity,
    /// Bucket-wise mean over every member curve of every combination in the band
    pub curve: Vec<Option<f64>>,
    /// Combinations recorded into this band
    pub combinations: usize,
    /// Member events folded into the curve
    pub members: usize,
}

/// One explored combination in the running history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub key: CohortKey,
    pub mean_spike: f64,
    pub severity: Severity,
    pub member_count: usize,
}

/// Report producer metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Report provenance information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProvenance {
    /// Dataset name (usually the source file name)
    pub dataset: String,
    pub computed_at_utc: String,
}

/// Complete analysis report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlucoseReport {
    pub report_version: String,
    pub producer: ReportProducer,
    pub provenance: ReportProvenance,
    pub config: crate::config::PipelineConfig,
    pub load: LoadReport,
    pub alignment: AlignmentReport,
    pub events: Vec<SummarizedEvent>,
    pub cohorts: Vec<CohortGroup>,
    pub bands: Vec<BandCurve>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_nutrient_is_low() {
        assert!(NutrientLevel::Low.admits(None, 10.0));
        assert!(!NutrientLevel::High.admits(None, 10.0));
        assert!(NutrientLevel::All.admits(None, 10.0));
    }

    #[test]
    fn test_high_is_strict() {
        assert!(!NutrientLevel::High.admits(Some(10.0), 10.0));
        assert!(NutrientLevel::High.admits(Some(10.01), 10.0));
        assert!(NutrientLevel::Low.admits(Some(0.0), 2.7));
    }

    #[test]
    fn test_combinations_are_distinct() {
        let keys = CohortKey::combinations();
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(
            keys[0],
            CohortKey::new(NutrientLevel::High, NutrientLevel::High, NutrientLevel::High)
        );
        assert_eq!(
            keys[7],
            CohortKey::new(NutrientLevel::Low, NutrientLevel::Low, NutrientLevel::Low)
        );
    }

    #[test]
    fn test_accumulator_skips_missing_buckets() {
        let mut acc = CurveAccumulator::new(3);
        acc.add_curve(&[Some(100.0), None, Some(120.0)]);
        acc.add_curve(&[Some(110.0), None, None]);

        assert_eq!(acc.mean(), vec![Some(105.0), None, Some(120.0)]);
        assert_eq!(acc.curves(), 2);
    }

    #[test]
    fn test_accumulator_merge() {
        let mut a = CurveAccumulator::new(2);
        a.add_curve(&[Some(100.0), Some(200.0)]);
        let mut b = CurveAccumulator::new(2);
        b.add_curve(&[Some(120.0), None]);
        b.add_curve(&[Some(140.0), None]);

        a.merge(&b);
        assert_eq!(a.mean(), vec![Some(120.0), Some(200.0)]);
        assert_eq!(a.curves(), 3);
    }

    #[test]
    fn test_level_from_str() {
        assert_eq!("High".parse::<NutrientLevel>(), Ok(NutrientLevel::High));
        assert_eq!(" all ".parse::<NutrientLevel>(), Ok(NutrientLevel::All));
        assert!("medium".parse::<NutrientLevel>().is_err());
    }
}

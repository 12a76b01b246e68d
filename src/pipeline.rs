//! Pipeline orchestration
//!
//! This module provides the public API for Glucoscope.
//! It runs loaded readings and food events through alignment, summarizing,
//! cohort aggregation and severity banding.

use crate::aligner::EventAligner;
use crate::classifier::ThresholdClassifier;
use crate::cohort::CohortAggregator;
use crate::config::PipelineConfig;
use crate::encoder::ReportEncoder;
use crate::error::ComputeError;
use crate::history::CohortHistory;
use crate::schema::{LoadedDataset, RecordLoader};
use crate::series::GlucoseSeries;
use crate::summarizer::ResponseSummarizer;
use crate::types::{
    AlignmentReport, BandCurve, CohortGroup, CohortKey, FoodEvent, GlucoseReport, SummarizedEvent,
};
use serde::{Deserialize, Serialize};

/// Analyze a combined CSV export and return the JSON report.
///
/// # Arguments
/// * `csv_text` - CSV with glucose and food columns (see `ColumnMap`)
/// * `config` - Pipeline configuration
///
/// # Example
/// ```ignore
/// let report_json = analyze_csv(csv_text, &PipelineConfig::default())?;
/// ```
pub fn analyze_csv(csv_text: String, config: &PipelineConfig) -> Result<String, ComputeError> {
    let processor = GlucoseProcessor::with_config(config.clone())?;
    processor.process_csv(&csv_text, "input")
}

/// Everything the pipeline derives from one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    /// Per-event summaries, in event order
    pub summarized: Vec<SummarizedEvent>,
    /// Aligned and excluded events
    pub alignment: AlignmentReport,
    /// The 8 high/low combinations
    pub cohorts: Vec<CohortGroup>,
    /// Band curves after one pass over the 8 combinations
    pub bands: Vec<BandCurve>,
}

/// Stateless-per-run processor owning the configured pipeline stages.
pub struct GlucoseProcessor {
    config: PipelineConfig,
    aligner: EventAligner,
    summarizer: ResponseSummarizer,
    aggregator: CohortAggregator,
    encoder: ReportEncoder,
}

impl Default for GlucoseProcessor {
    fn default() -> Self {
        Self::from_valid_config(PipelineConfig::default())
    }
}

impl GlucoseProcessor {
    /// Create a processor with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a processor from a configuration, validating it first
    pub fn with_config(config: PipelineConfig) -> Result<Self, ComputeError> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: PipelineConfig) -> Self {
        let classifier = ThresholdClassifier::new(config.severity);
        Self {
            aligner: EventAligner::new(&config.windows),
            summarizer: ResponseSummarizer::new(&config.windows),
            aggregator: CohortAggregator::new(
                config.thresholds,
                classifier,
                config.windows.bucket_count(),
            ),
            encoder: ReportEncoder::new(),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn aggregator(&self) -> &CohortAggregator {
        &self.aggregator
    }

    /// Align and summarize every event
    pub fn summarize(
        &self,
        series: &GlucoseSeries,
        events: &[FoodEvent],
    ) -> (Vec<SummarizedEvent>, AlignmentReport) {
        let (aligned, alignment) = self.aligner.align_with_report(events, series);
        (self.summarizer.summarize_all(&aligned), alignment)
    }

    /// Run the full pipeline over typed inputs
    pub fn run(&self, series: &GlucoseSeries, events: &[FoodEvent]) -> PipelineOutput {
        let (summarized, alignment) = self.summarize(series, events);
        let cohorts = self.aggregator.aggregate(&summarized);

        let mut history = CohortHistory::new(self.config.windows.bucket_count());
        for group in &cohorts {
            history.record(group);
        }

        tracing::info!(
            events = events.len(),
            aligned = alignment.aligned,
            excluded = alignment.excluded_count(),
            "Pipeline run complete"
        );

        PipelineOutput {
            summarized,
            alignment,
            cohorts,
            bands: history.band_curves(),
        }
    }

    /// Load a combined CSV using the configured columns and header rows
    pub fn load_csv(&self, csv_text: &str) -> Result<LoadedDataset, ComputeError> {
        RecordLoader::parse_csv(
            csv_text,
            &self.config.columns,
            self.config.input.header_rows,
        )
    }

    /// Run the pipeline over a loaded dataset and wrap it in a report
    pub fn process_dataset(&self, dataset: &LoadedDataset, dataset_name: &str) -> GlucoseReport {
        let output = self.run(&dataset.series, &dataset.events);
        self.encoder
            .encode(dataset_name, &self.config, &dataset.report, &output)
    }

    /// Load, run and encode a combined CSV as pretty JSON
    pub fn process_csv(&self, csv_text: &str, dataset_name: &str) -> Result<String, ComputeError> {
        let dataset = self.load_csv(csv_text)?;
        let report = self.process_dataset(&dataset, dataset_name);
        serde_json::to_string_pretty(&report).map_err(ComputeError::JsonError)
    }

    /// Start an interactive exploration over already-summarized events
    pub fn explorer(&self, summarized: Vec<SummarizedEvent>) -> CohortExplorer {
        CohortExplorer::new(
            self.aggregator,
            summarized,
            self.config.windows.bucket_count(),
        )
    }
}

/// Sequential explorer of filter combinations.
///
/// Owns the running history, so combinations are recorded one at a time and
/// each at most once. `reset` discards the history and restarts the stepper.
pub struct CohortExplorer {
    aggregator: CohortAggregator,
    summarized: Vec<SummarizedEvent>,
    history: CohortHistory,
    cursor: usize,
}

impl CohortExplorer {
    pub fn new(
        aggregator: CohortAggregator,
        summarized: Vec<SummarizedEvent>,
        bucket_count: usize,
    ) -> Self {
        Self {
            aggregator,
            summarized,
            history: CohortHistory::new(bucket_count),
            cursor: 0,
        }
    }

    /// Advance to the next of the 8 high/low combinations.
    ///
    /// Returns `None` once every combination has been stepped through.
    pub fn step(&mut self) -> Option<CohortGroup> {
        let key = *CohortKey::combinations().get(self.cursor)?;
        self.cursor += 1;
        Some(self.explore(&key))
    }

    /// Build the group for any selection and record it in the history
    pub fn explore(&mut self, key: &CohortKey) -> CohortGroup {
        let group = self.aggregator.query(&self.summarized, key);
        self.history.record(&group);
        group
    }

    /// Whether `step` has visited all 8 combinations
    pub fn is_complete(&self) -> bool {
        self.cursor >= CohortKey::combinations().len()
    }

    pub fn history(&self) -> &CohortHistory {
        &self.history
    }

    pub fn band_curves(&self) -> Vec<BandCurve> {
        self.history.band_curves()
    }

    pub fn summarized(&self) -> &[SummarizedEvent] {
        &self.summarized
    }

    /// Discard the history and restart stepping from the first combination
    pub fn reset(&mut self) {
        self.history.reset();
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GlucoseReading, NutrientLevel, Severity};
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn at(minutes: i64) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn series(points: &[(i64, f64)]) -> GlucoseSeries {
        GlucoseSeries::from_readings(
            points
                .iter()
                .map(|&(m, v)| GlucoseReading::new(at(m), v))
                .collect(),
        )
    }

    #[test]
    fn test_run_spike_example() {
        let processor = GlucoseProcessor::new();
        let s = series(&[(0, 100.0), (30, 140.0), (60, 130.0)]);
        let events = vec![FoodEvent::new(at(0), "oats").with_macros(Some(27.0), Some(1.0), Some(5.0))];

        let output = processor.run(&s, &events);

        assert_eq!(output.summarized.len(), 1);
        assert_eq!(output.summarized[0].baseline_glucose, 100.0);
        assert_eq!(output.summarized[0].max_spike, 40.0);
        assert_eq!(output.summarized[0].bucketed_curve.len(), 24);
        assert_eq!(output.cohorts.len(), 8);
        assert_eq!(output.alignment.aligned, 1);
    }

    #[test]
    fn test_run_excludes_events_without_baseline() {
        let processor = GlucoseProcessor::new();
        let s = series(&[(10, 100.0), (40, 150.0)]);
        let events = vec![
            FoodEvent::new(at(0), "early"),
            FoodEvent::new(at(15), "late"),
        ];

        let output = processor.run(&s, &events);

        assert_eq!(output.summarized.len(), 1);
        assert_eq!(output.summarized[0].event.label, "late");
        assert_eq!(output.alignment.excluded_count(), 1);
        assert_eq!(output.alignment.excluded[0].event.label, "early");
    }

    #[test]
    fn test_empty_cohort_is_low() {
        let processor = GlucoseProcessor::new();
        let s = series(&[(0, 100.0), (30, 110.0)]);
        let events = vec![FoodEvent::new(at(0), "tea").with_macros(None, Some(5.0), Some(1.0))];

        let output = processor.run(&s, &events);
        let high_all = &output.cohorts[0];

        assert_eq!(
            high_all.key,
            CohortKey::new(NutrientLevel::High, NutrientLevel::High, NutrientLevel::High)
        );
        assert!(high_all.is_empty());
        assert_eq!(high_all.mean_spike, 0.0);
        assert_eq!(high_all.averaged_curve, vec![None; 24]);
        assert_eq!(high_all.severity, Severity::Low);

        // carb absent -> low, sugar 5 -> high, protein 1 -> low
        let key = CohortKey::new(NutrientLevel::Low, NutrientLevel::High, NutrientLevel::Low);
        let group = output.cohorts.iter().find(|g| g.key == key).unwrap();
        assert_eq!(group.member_labels, vec!["tea".to_string()]);
    }

    #[test]
    fn test_run_bands_cover_all_combinations() {
        let processor = GlucoseProcessor::new();
        let s = series(&[(0, 100.0), (30, 150.0), (60, 120.0)]);
        let events = vec![
            FoodEvent::new(at(0), "cake").with_macros(Some(50.0), Some(30.0), Some(4.0)),
        ];

        let output = processor.run(&s, &events);
        let combinations: usize = output.bands.iter().map(|b| b.combinations).sum();
        assert_eq!(combinations, 8);

        let high = output
            .bands
            .iter()
            .find(|b| b.severity == Severity::High)
            .unwrap();
        assert_eq!(high.members, 1);
        assert_eq!(high.curve[3], Some(150.0));
    }

    #[test]
    fn test_explorer_steps_and_resets() {
        let processor = GlucoseProcessor::new();
        let s = series(&[(0, 100.0), (30, 150.0)]);
        let events = vec![
            FoodEvent::new(at(0), "cake").with_macros(Some(50.0), Some(30.0), Some(4.0)),
        ];
        let (summarized, _) = processor.summarize(&s, &events);
        let mut explorer = processor.explorer(summarized);

        let mut stepped = 0;
        while let Some(group) = explorer.step() {
            assert!(explorer.history().is_explored(&group.key));
            stepped += 1;
        }
        assert_eq!(stepped, 8);
        assert!(explorer.is_complete());
        assert_eq!(explorer.history().len(), 8);

        // revisiting an explored combination does not double count
        explorer.explore(&CohortKey::combinations()[0]);
        assert_eq!(explorer.history().len(), 8);

        explorer.reset();
        assert!(explorer.history().is_empty());
        assert!(!explorer.is_complete());
        assert!(explorer.band_curves().is_empty());
        assert!(explorer.step().is_some());
    }

    #[test]
    fn test_analyze_csv() {
        let csv = "\
Timestamp (YYYY-MM-DDThh:mm:ss),Glucose Value (mg/dL),logged_food,total_carb,sugar,protein
2024-03-01T08:00:00,100,,,,
2024-03-01T08:00:00,,Bagel,48,6,10
2024-03-01T08:30:00,145,,,,
2024-03-01T09:00:00,130,,,,
";
        let json = analyze_csv(csv.to_string(), &PipelineConfig::default()).unwrap();
        let report: GlucoseReport = serde_json::from_str(&json).unwrap();

        assert_eq!(report.provenance.dataset, "input");
        assert_eq!(report.load.readings, 3);
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].max_spike, 45.0);
        assert_eq!(report.cohorts.len(), 8);
    }

    #[test]
    fn test_with_config_rejects_invalid() {
        let mut config = PipelineConfig::default();
        config.windows.bucket_width_minutes = 7;
        assert!(matches!(
            GlucoseProcessor::with_config(config),
            Err(ComputeError::InvalidConfig(_))
        ));
    }
}

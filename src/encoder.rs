//! Report encoding
//!
//! This module wraps pipeline output in a versioned JSON report with
//! producer and provenance metadata.

use crate::config::PipelineConfig;
use crate::error::ComputeError;
use crate::pipeline::PipelineOutput;
use crate::types::{GlucoseReport, LoadReport, ReportProducer, ReportProvenance};
use crate::{GLUCOSCOPE_VERSION, PRODUCER_NAME};
use chrono::Utc;
use uuid::Uuid;

/// Current report schema version
pub const REPORT_VERSION: &str = "1.0.0";

/// Encoder for producing analysis reports
pub struct ReportEncoder {
    instance_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Encode pipeline output into a report
    pub fn encode(
        &self,
        dataset: &str,
        config: &PipelineConfig,
        load: &LoadReport,
        output: &PipelineOutput,
    ) -> GlucoseReport {
        let producer = ReportProducer {
            name: PRODUCER_NAME.to_string(),
            version: GLUCOSCOPE_VERSION.to_string(),
            instance_id: self.instance_id.clone(),
        };

        let provenance = ReportProvenance {
            dataset: dataset.to_string(),
            computed_at_utc: Utc::now().to_rfc3339(),
        };

        GlucoseReport {
            report_version: REPORT_VERSION.to_string(),
            producer,
            provenance,
            config: config.clone(),
            load: load.clone(),
            alignment: output.alignment.clone(),
            events: output.summarized.clone(),
            cohorts: output.cohorts.clone(),
            bands: output.bands.clone(),
        }
    }

    /// Encode to a pretty JSON string
    pub fn encode_to_json(
        &self,
        dataset: &str,
        config: &PipelineConfig,
        load: &LoadReport,
        output: &PipelineOutput,
    ) -> Result<String, ComputeError> {
        let report = self.encode(dataset, config, load, output);
        serde_json::to_string_pretty(&report).map_err(ComputeError::JsonError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AlignmentReport, FoodEvent, SummarizedEvent};
    use chrono::TimeZone;

    fn output() -> PipelineOutput {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        PipelineOutput {
            summarized: vec![SummarizedEvent {
                event: FoodEvent::new(at, "oats").with_macros(Some(27.0), Some(1.0), Some(5.0)),
                baseline_glucose: 100.0,
                max_spike: 40.0,
                bucketed_curve: vec![Some(120.0), None],
            }],
            alignment: AlignmentReport {
                aligned: 1,
                excluded: vec![],
            },
            cohorts: vec![],
            bands: vec![],
        }
    }

    #[test]
    fn test_encode_report() {
        let encoder = ReportEncoder::with_instance_id("test-instance".to_string());
        let config = PipelineConfig::default();
        let report = encoder.encode("meals.csv", &config, &LoadReport::default(), &output());

        assert_eq!(report.report_version, REPORT_VERSION);
        assert_eq!(report.producer.name, PRODUCER_NAME);
        assert_eq!(report.producer.version, GLUCOSCOPE_VERSION);
        assert_eq!(report.producer.instance_id, "test-instance");
        assert_eq!(report.provenance.dataset, "meals.csv");
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.alignment.aligned, 1);
    }

    #[test]
    fn test_encode_to_json() {
        let encoder = ReportEncoder::new();
        let json = encoder
            .encode_to_json(
                "meals.csv",
                &PipelineConfig::default(),
                &LoadReport::default(),
                &output(),
            )
            .unwrap();

        assert!(json.contains("\"report_version\""));
        assert!(json.contains("\"max_spike\": 40.0"));

        let parsed: GlucoseReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.events[0].bucketed_curve, vec![Some(120.0), None]);
        assert_eq!(parsed.producer.instance_id, encoder.instance_id());
    }
}

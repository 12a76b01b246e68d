//! Pipeline configuration
//!
//! Configuration is plain TOML. Every field has a default, so an empty file
//! (or no file at all) yields the stock pipeline:
//!
//! ```toml
//! [windows]
//! spike_horizon_minutes = 120
//! display_horizon_minutes = 240
//! bucket_width_minutes = 10
//!
//! [thresholds]
//! carb = 10.0
//! sugar = 2.7
//! protein = 3.1
//!
//! [severity]
//! medium_from = 34.0
//! high_from = 41.0
//! ```

use crate::error::ComputeError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub windows: WindowConfig,

    #[serde(default)]
    pub thresholds: NutrientThresholds,

    #[serde(default, alias = "severityBounds")]
    pub severity: SeverityBounds,

    #[serde(default)]
    pub input: InputConfig,

    #[serde(default)]
    pub columns: ColumnMap,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Time windows around each food event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Window used for the max spike
    #[serde(default = "default_spike_horizon", alias = "spikeHorizonMinutes")]
    pub spike_horizon_minutes: u32,

    /// Window covered by the bucketed response curve
    #[serde(default = "default_display_horizon", alias = "displayHorizonMinutes")]
    pub display_horizon_minutes: u32,

    #[serde(default = "default_bucket_width", alias = "bucketWidthMinutes")]
    pub bucket_width_minutes: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            spike_horizon_minutes: default_spike_horizon(),
            display_horizon_minutes: default_display_horizon(),
            bucket_width_minutes: default_bucket_width(),
        }
    }
}

impl WindowConfig {
    /// Number of buckets in every response curve
    pub fn bucket_count(&self) -> usize {
        if self.bucket_width_minutes == 0 {
            return 0;
        }
        (self.display_horizon_minutes / self.bucket_width_minutes) as usize
    }
}

fn default_spike_horizon() -> u32 {
    120
}

fn default_display_horizon() -> u32 {
    240
}

fn default_bucket_width() -> u32 {
    10
}

/// Per-nutrient high/low cutoffs (grams)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NutrientThresholds {
    #[serde(default = "default_carb_threshold", alias = "carbThreshold")]
    pub carb: f64,

    #[serde(default = "default_sugar_threshold", alias = "sugarThreshold")]
    pub sugar: f64,

    #[serde(default = "default_protein_threshold", alias = "proteinThreshold")]
    pub protein: f64,
}

impl Default for NutrientThresholds {
    fn default() -> Self {
        Self {
            carb: default_carb_threshold(),
            sugar: default_sugar_threshold(),
            protein: default_protein_threshold(),
        }
    }
}

impl NutrientThresholds {
    pub fn for_nutrient(&self, nutrient: crate::types::Nutrient) -> f64 {
        use crate::types::Nutrient;
        match nutrient {
            Nutrient::Carb => self.carb,
            Nutrient::Sugar => self.sugar,
            Nutrient::Protein => self.protein,
        }
    }
}

fn default_carb_threshold() -> f64 {
    10.0
}

fn default_sugar_threshold() -> f64 {
    2.7
}

fn default_protein_threshold() -> f64 {
    3.1
}

/// Mean-spike cutoffs for the severity bands (mg/dL)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityBounds {
    /// Lowest mean spike classified as medium
    #[serde(default = "default_medium_from")]
    pub medium_from: f64,

    /// Lowest mean spike classified as high
    #[serde(default = "default_high_from")]
    pub high_from: f64,
}

impl Default for SeverityBounds {
    fn default() -> Self {
        Self {
            medium_from: default_medium_from(),
            high_from: default_high_from(),
        }
    }
}

fn default_medium_from() -> f64 {
    34.0
}

fn default_high_from() -> f64 {
    41.0
}

/// Source-file handling
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Data rows to strip after the header line (CGM exports carry a diagnostic preamble)
    #[serde(default)]
    pub header_rows: usize,
}

/// Column names recognised by the CSV loader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMap {
    #[serde(default = "default_timestamp_column")]
    pub timestamp: String,

    #[serde(default = "default_glucose_column")]
    pub glucose: String,

    #[serde(default = "default_food_column")]
    pub food: String,

    /// Timestamp column of a standalone food log
    #[serde(default = "default_food_timestamp_column")]
    pub food_timestamp: String,

    #[serde(default = "default_carb_column")]
    pub total_carb: String,

    #[serde(default = "default_sugar_column")]
    pub sugar: String,

    #[serde(default = "default_protein_column")]
    pub protein: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            timestamp: default_timestamp_column(),
            glucose: default_glucose_column(),
            food: default_food_column(),
            food_timestamp: default_food_timestamp_column(),
            total_carb: default_carb_column(),
            sugar: default_sugar_column(),
            protein: default_protein_column(),
        }
    }
}

fn default_timestamp_column() -> String {
    "Timestamp (YYYY-MM-DDThh:mm:ss)".to_string()
}

fn default_glucose_column() -> String {
    "Glucose Value (mg/dL)".to_string()
}

fn default_food_column() -> String {
    "logged_food".to_string()
}

fn default_food_timestamp_column() -> String {
    "time_begin".to_string()
}

fn default_carb_column() -> String {
    "total_carb".to_string()
}

fn default_sugar_column() -> String {
    "sugar".to_string()
}

fn default_protein_column() -> String {
    "protein".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl PipelineConfig {
    /// Parse configuration from TOML text and validate it
    pub fn from_toml(content: &str) -> Result<Self, ComputeError> {
        let config: PipelineConfig = toml::from_str(content)
            .map_err(|e| ComputeError::ConfigError(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load_from(path: &Path) -> Result<Self, ComputeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ComputeError::ConfigError(format!("failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml(&content)
    }

    /// Load from a file if given, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ComputeError> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                tracing::debug!("No config file given, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String, ComputeError> {
        toml::to_string_pretty(self).map_err(|e| ComputeError::EncodingError(e.to_string()))
    }

    /// Check window and band invariants
    pub fn validate(&self) -> Result<(), ComputeError> {
        let w = &self.windows;
        if w.bucket_width_minutes == 0 {
            return Err(ComputeError::InvalidConfig(
                "bucket_width_minutes must be positive".to_string(),
            ));
        }
        if w.spike_horizon_minutes == 0 || w.display_horizon_minutes == 0 {
            return Err(ComputeError::InvalidConfig(
                "horizons must be positive".to_string(),
            ));
        }
        if w.display_horizon_minutes % w.bucket_width_minutes != 0 {
            return Err(ComputeError::InvalidConfig(format!(
                "display_horizon_minutes ({}) is not a multiple of bucket_width_minutes ({})",
                w.display_horizon_minutes, w.bucket_width_minutes
            )));
        }

        let s = &self.severity;
        if !(s.medium_from.is_finite() && s.high_from.is_finite()) || s.medium_from > s.high_from
        {
            return Err(ComputeError::InvalidConfig(format!(
                "severity bounds must be finite and ordered, got {} / {}",
                s.medium_from, s.high_from
            )));
        }

        let t = &self.thresholds;
        if ![t.carb, t.sugar, t.protein].iter().all(|v| v.is_finite()) {
            return Err(ComputeError::InvalidConfig(
                "nutrient thresholds must be finite".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.windows.spike_horizon_minutes, 120);
        assert_eq!(config.windows.display_horizon_minutes, 240);
        assert_eq!(config.windows.bucket_count(), 24);
        assert_eq!(config.thresholds.sugar, 2.7);
        assert_eq!(config.severity.medium_from, 34.0);
        assert_eq!(config.severity.high_from, 41.0);
        assert_eq!(config.input.header_rows, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = PipelineConfig::from_toml("").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let config = PipelineConfig::from_toml(
            r#"
            [windows]
            bucket_width_minutes = 15

            [thresholds]
            carb = 20.0

            [input]
            header_rows = 11
            "#,
        )
        .unwrap();

        assert_eq!(config.windows.bucket_width_minutes, 15);
        assert_eq!(config.windows.bucket_count(), 16);
        assert_eq!(config.windows.spike_horizon_minutes, 120);
        assert_eq!(config.thresholds.carb, 20.0);
        assert_eq!(config.thresholds.protein, 3.1);
        assert_eq!(config.input.header_rows, 11);
    }

    #[test]
    fn test_camel_case_aliases() {
        let config = PipelineConfig::from_toml(
            r#"
            [windows]
            spikeHorizonMinutes = 90

            [thresholds]
            sugarThreshold = 5.0
            "#,
        )
        .unwrap();
        assert_eq!(config.windows.spike_horizon_minutes, 90);
        assert_eq!(config.thresholds.sugar, 5.0);
    }

    #[test]
    fn test_rejects_uneven_buckets() {
        let result = PipelineConfig::from_toml(
            r#"
            [windows]
            display_horizon_minutes = 245
            "#,
        );
        assert!(matches!(result, Err(ComputeError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_zero_bucket_width() {
        let mut config = PipelineConfig::default();
        config.windows.bucket_width_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_severity() {
        let mut config = PipelineConfig::default();
        config.severity.medium_from = 50.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip_through_file() {
        let mut config = PipelineConfig::default();
        config.thresholds.protein = 6.0;
        config.input.header_rows = 3;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_toml().unwrap().as_bytes()).unwrap();

        let loaded = PipelineConfig::load_from(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file() {
        let result = PipelineConfig::load_from(Path::new("/nonexistent/glucoscope.toml"));
        assert!(matches!(result, Err(ComputeError::ConfigError(_))));
    }
}

//! Glucoscope - Post-meal glucose response analysis
//!
//! Glucoscope matches logged food events against a continuous glucose monitor
//! series and summarizes how meals of different macronutrient composition
//! move glucose: series lookup → event alignment → response summarizing →
//! cohort aggregation → severity banding → report encoding.
//!
//! ## Modules
//!
//! - **Core pipeline**: `series`, `aligner`, `summarizer`, `classifier`, `cohort`, `history`
//! - **Loading**: `schema` reads CGM exports, food logs and typed NDJSON records
//! - **Outputs**: `encoder` (JSON report), `export` (combination table), `ranking`

pub mod aligner;
pub mod classifier;
pub mod cohort;
pub mod config;
pub mod encoder;
pub mod error;
pub mod export;
pub mod history;
pub mod logging;
pub mod pipeline;
pub mod ranking;
pub mod schema;
pub mod series;
pub mod summarizer;
pub mod types;

pub use config::PipelineConfig;
pub use error::ComputeError;
pub use pipeline::{analyze_csv, CohortExplorer, GlucoseProcessor, PipelineOutput};

// Schema exports
pub use schema::{InputRecord, LoadedDataset, RecordLoader};

/// Glucoscope version embedded in all reports
pub const GLUCOSCOPE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "glucoscope";

//! Event alignment
//!
//! Matches each food event to the glucose series: the baseline is the
//! nearest reading at or before the event, and the forward windows are the
//! readings strictly after the event up to each horizon (inclusive).
//!
//! Events that precede every reading have no baseline. They are excluded
//! and reported rather than given a fabricated baseline.

use crate::config::WindowConfig;
use crate::series::GlucoseSeries;
use crate::types::{
    AlignedEvent, AlignmentReport, ExcludedEvent, ExclusionReason, FoodEvent, GlucoseReading,
    WindowPoint,
};
use chrono::{DateTime, Duration, Utc};

/// Aligner for matching food events to a glucose series
#[derive(Debug, Clone, Copy)]
pub struct EventAligner {
    spike_horizon: Duration,
    display_horizon: Duration,
}

impl Default for EventAligner {
    fn default() -> Self {
        Self::new(&WindowConfig::default())
    }
}

impl EventAligner {
    pub fn new(windows: &WindowConfig) -> Self {
        Self {
            spike_horizon: Duration::minutes(windows.spike_horizon_minutes as i64),
            display_horizon: Duration::minutes(windows.display_horizon_minutes as i64),
        }
    }

    /// Align events, dropping those without a baseline
    pub fn align(&self, events: &[FoodEvent], series: &GlucoseSeries) -> Vec<AlignedEvent> {
        self.align_with_report(events, series).0
    }

    /// Align events and report the ones excluded.
    ///
    /// Output preserves the order of `events`.
    pub fn align_with_report(
        &self,
        events: &[FoodEvent],
        series: &GlucoseSeries,
    ) -> (Vec<AlignedEvent>, AlignmentReport) {
        let mut aligned = Vec::with_capacity(events.len());
        let mut report = AlignmentReport::default();

        for event in events {
            match self.align_one(event, series) {
                Some(a) => aligned.push(a),
                None => {
                    tracing::debug!(
                        label = %event.label,
                        timestamp = %event.timestamp,
                        "No glucose reading at or before event, excluding"
                    );
                    report.excluded.push(ExcludedEvent {
                        event: event.clone(),
                        reason: ExclusionReason::NoBaselineAvailable,
                    });
                }
            }
        }

        report.aligned = aligned.len();
        if !report.excluded.is_empty() {
            tracing::info!(
                aligned = report.aligned,
                excluded = report.excluded_count(),
                "Events excluded for lack of a baseline"
            );
        }

        (aligned, report)
    }

    /// Align a single event; `None` when no baseline exists
    pub fn align_one(&self, event: &FoodEvent, series: &GlucoseSeries) -> Option<AlignedEvent> {
        let baseline = series.nearest_at_or_before(event.timestamp)?;
        let at = event.timestamp;

        let forward = series.range_after(at, at + self.spike_horizon);
        let display = series.range_after(at, at + self.display_horizon);

        Some(AlignedEvent {
            event: event.clone(),
            baseline_glucose: baseline.value,
            forward_window: to_window(at, forward),
            display_window: to_window(at, display),
        })
    }
}

fn to_window(at: DateTime<Utc>, readings: &[GlucoseReading]) -> Vec<WindowPoint> {
    readings
        .iter()
        .map(|r| WindowPoint {
            offset_minutes: offset_minutes(at, r.timestamp),
            value: r.value,
        })
        .collect()
}

fn offset_minutes(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 60_000.0
}
